//! Recording application layer for tests

use crate::app::AppLayer;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Recorded {
    online: bool,
    ups: usize,
    downs: usize,
    received: Vec<Bytes>,
    send_results: Vec<bool>,
    dropped: bool,
}

/// Test-side view of a [`MockAppLayer`]
///
/// Stays readable after the layer itself has been destroyed.
#[derive(Debug, Clone, Default)]
pub struct AppProbe {
    recorded: Arc<Mutex<Recorded>>,
}

impl AppProbe {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    pub fn num_ups(&self) -> usize {
        self.lock().ups
    }

    pub fn num_downs(&self) -> usize {
        self.lock().downs
    }

    /// Fragments received so far, oldest first
    pub fn received(&self) -> Vec<Bytes> {
        self.lock().received.clone()
    }

    pub fn send_results(&self) -> Vec<bool> {
        self.lock().send_results.clone()
    }

    /// Whether the layer has been destroyed
    pub fn is_dropped(&self) -> bool {
        self.lock().dropped
    }
}

/// Application layer that records everything it is told
#[derive(Debug)]
pub struct MockAppLayer {
    probe: AppProbe,
}

impl MockAppLayer {
    pub fn new() -> (Self, AppProbe) {
        let probe = AppProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl AppLayer for MockAppLayer {
    fn on_lower_layer_up(&mut self) {
        let mut recorded = self.probe.lock();
        recorded.online = true;
        recorded.ups += 1;
    }

    fn on_lower_layer_down(&mut self) {
        let mut recorded = self.probe.lock();
        recorded.online = false;
        recorded.downs += 1;
    }

    fn on_receive(&mut self, apdu: Bytes) {
        self.probe.lock().received.push(apdu);
    }

    fn on_send_result(&mut self, success: bool) {
        self.probe.lock().send_results.push(success);
    }
}

impl Drop for MockAppLayer {
    fn drop(&mut self) {
        self.probe.lock().dropped = true;
    }
}
