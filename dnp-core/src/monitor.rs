//! Lifecycle state monitor contract

use crate::state::PhysicalState;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives physical layer lifecycle state changes
pub trait PhysMonitor: Send {
    fn on_state_change(&mut self, state: PhysicalState);
}

impl<F> PhysMonitor for F
where
    F: FnMut(PhysicalState) + Send,
{
    fn on_state_change(&mut self, state: PhysicalState) {
        self(state)
    }
}

/// Monitor that records every state it is told about
///
/// Clones share the same history, so one clone can be handed to a port as
/// its observer while another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct StateRecorder {
    states: Arc<Mutex<Vec<PhysicalState>>>,
}

impl StateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All states recorded so far, oldest first
    pub fn states(&self) -> Vec<PhysicalState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of times `state` was recorded
    pub fn count(&self, state: PhysicalState) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| **s == state)
            .count()
    }

    /// Most recent state, if any
    pub fn last(&self) -> Option<PhysicalState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    pub fn clear(&self) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl PhysMonitor for StateRecorder {
    fn on_state_change(&mut self, state: PhysicalState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state);
    }
}
