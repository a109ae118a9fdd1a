//! One-shot timer sources
//!
//! Timers never call back into protocol objects directly. An expiry runs the
//! supplied callback, which is expected to post a work item onto the owner's
//! [`TaskScheduler`](crate::scheduler::TaskScheduler). Because a cancelled
//! timer may already have posted its expiry, owners compare the expired
//! [`TimerId`] against the timer they still hold and ignore stale ones.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Callback run when a timer expires, given the id of the expired timer
pub type TimerCallback = Box<dyn FnOnce(TimerId) + Send + 'static>;

/// Identifier of a started timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Source of one-shot delayed callbacks
pub trait TimerSource: Send + Sync {
    /// Start a timer that runs `callback` once `delay` has elapsed
    fn start(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a pending timer
    ///
    /// Returns `false` if the timer already expired or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

#[derive(Debug, Default)]
struct IdGenerator(AtomicU64);

impl IdGenerator {
    fn next(&self) -> TimerId {
        TimerId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Timer source backed by the tokio runtime
///
/// Must be used from within a tokio runtime context.
#[derive(Debug, Default)]
pub struct TokioTimerSource {
    ids: IdGenerator,
    pending: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
}

impl TokioTimerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither expired nor been cancelled
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TimerSource for TokioTimerSource {
    fn start(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = self.ids.next();
        let pending = self.pending.clone();
        // Hold the map lock across the spawn so the task cannot remove its
        // entry before it has been inserted.
        let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_pending = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .is_some();
            if still_pending {
                callback(id);
            }
        });
        guard.insert(id, task.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
        {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

struct MockTimer {
    id: TimerId,
    expires_at: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct MockTimerState {
    now: Duration,
    timers: BTreeMap<TimerId, MockTimer>,
}

/// Manually driven timer source for deterministic tests
///
/// Time only moves when [`advance`](Self::advance) is called. Clones share
/// the same clock and timer set.
#[derive(Clone, Default)]
pub struct MockTimerSource {
    ids: Arc<IdGenerator>,
    state: Arc<Mutex<MockTimerState>>,
}

impl fmt::Debug for MockTimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTimerSource")
            .field("pending", &self.pending())
            .finish()
    }
}

impl MockTimerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither expired nor been cancelled
    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    /// Time elapsed on the mock clock
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Advance the clock, firing every timer that expires on the way in
    /// expiry order. Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now + by;
        let mut fired = 0;
        loop {
            // Callbacks run without the lock held; they may start new timers.
            let next = {
                let mut state = self.lock();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, t)| t.expires_at <= target)
                    .min_by_key(|(id, t)| (t.expires_at, **id))
                    .map(|(id, _)| *id);
                match due {
                    Some(id) => {
                        let timer = state.timers.remove(&id);
                        if let Some(t) = &timer {
                            state.now = state.now.max(t.expires_at);
                        }
                        timer
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match next {
                Some(timer) => {
                    (timer.callback)(timer.id);
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    /// Fire the earliest pending timer regardless of its delay
    pub fn fire_next(&self) -> bool {
        let next = {
            let mut state = self.lock();
            let id = state
                .timers
                .iter()
                .min_by_key(|(id, t)| (t.expires_at, **id))
                .map(|(id, _)| *id);
            id.and_then(|id| state.timers.remove(&id)).map(|timer| {
                state.now = state.now.max(timer.expires_at);
                timer
            })
        };
        match next {
            Some(timer) => {
                (timer.callback)(timer.id);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockTimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerSource for MockTimerSource {
    fn start(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = self.ids.next();
        let mut state = self.lock();
        let expires_at = state.now + delay;
        state.timers.insert(
            id,
            MockTimer {
                id,
                expires_at,
                callback,
            },
        );
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.lock().timers.remove(&id).is_some()
    }
}
