//! Router statistics collection

/// Router statistics
///
/// Tracks traffic and line health for one router. Counters are updated by
/// the router while it handles events and can be read at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStatistics {
    /// Frames decoded from the line
    pub frames_received: u64,
    /// Frames handed to the physical layer
    pub frames_sent: u64,
    /// Frames discarded because no context was bound to their destination
    pub frames_dropped: u64,
    /// Frames rejected by the decoder
    pub crc_errors: u64,
    /// Failed open attempts
    pub open_failures: u64,
    /// Reopen attempts made after a failure or a lost line
    pub reopen_attempts: u64,
}

impl RouterStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Total number of frames received or sent
    pub fn total_frames(&self) -> u64 {
        self.frames_received + self.frames_sent
    }

    /// Fraction of inbound frames that were corrupt, as a percentage
    pub fn error_rate(&self) -> f64 {
        let total = self.frames_received + self.crc_errors;
        if total == 0 {
            0.0
        } else {
            (self.crc_errors as f64 / total as f64) * 100.0
        }
    }
}
