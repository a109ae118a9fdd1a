//! Physical layer lifecycle state

use crate::error::{DnpError, DnpResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a physical layer as seen by the router
///
/// # State Transitions
/// ```text
/// Closed  -> Opening  (start)
/// Stopped -> Opening  (restart)
/// Opening -> Open     (open completed)
/// Opening -> Waiting  (open failed)
/// Opening -> Closing  (stop)
/// Open    -> Waiting  (line dropped)
/// Open    -> Closing  (stop)
/// Waiting -> Opening  (reopen timer expired)
/// Waiting -> Stopped  (stop)
/// Closing -> Stopped  (close completed)
/// ```
///
/// `Stopped` is terminal for one stop cycle. It is the only state the port
/// release protocol keys on; further states may be added.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalState {
    /// Never started
    Closed,
    /// Open requested, waiting for completion
    Opening,
    /// Open failed or the line dropped, waiting to reopen
    Waiting,
    /// Open and reading
    Open,
    /// Close requested, waiting for completion
    Closing,
    /// Fully stopped after a requested stop
    Stopped,
}

impl PhysicalState {
    /// Check if the layer can carry frames
    pub fn is_open(&self) -> bool {
        matches!(self, PhysicalState::Open)
    }

    /// Check if this is the terminal state of a stop cycle
    pub fn is_stopped(&self) -> bool {
        matches!(self, PhysicalState::Stopped)
    }

    /// Check if the layer is idle (never started or fully stopped)
    pub fn is_idle(&self) -> bool {
        matches!(self, PhysicalState::Closed | PhysicalState::Stopped)
    }

    /// Validate state transition
    pub fn validate_transition(&self, new_state: PhysicalState) -> DnpResult<()> {
        use PhysicalState::*;

        let valid = matches!(
            (*self, new_state),
            (Closed, Opening)
                | (Stopped, Opening)
                | (Opening, Open)
                | (Opening, Waiting)
                | (Opening, Closing)
                | (Open, Waiting)
                | (Open, Closing)
                | (Waiting, Opening)
                | (Waiting, Stopped)
                | (Closing, Stopped)
        );

        if valid {
            Ok(())
        } else {
            Err(DnpError::InvalidState(format!(
                "Invalid physical state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalState::Closed => "Closed",
            PhysicalState::Opening => "Opening",
            PhysicalState::Waiting => "Waiting",
            PhysicalState::Open => "Open",
            PhysicalState::Closing => "Closing",
            PhysicalState::Stopped => "Stopped",
        }
    }
}

impl Default for PhysicalState {
    fn default() -> Self {
        PhysicalState::Closed
    }
}

impl fmt::Display for PhysicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
