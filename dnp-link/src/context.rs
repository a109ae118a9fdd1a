//! Router attachment contract for protocol sessions

use crate::error::{DnpError, DnpResult};
use crate::frame::LinkFrame;
use crate::router::RouterTask;
use dnp_core::{TaskPoster, TimerId, TimerSource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A protocol session's attachment point on the router
///
/// The router calls these methods from its owner's serialized context, one
/// at a time. Implementations must not block.
pub trait LinkContext: Send {
    /// Bind the context to the router before it is registered
    fn set_router(&mut self, router: RouterHandle);

    /// The physical layer is open and frames can flow
    fn on_lower_layer_up(&mut self);

    /// The physical layer went away or the context was removed
    ///
    /// Implementations must go offline and cancel every timer they hold.
    fn on_lower_layer_down(&mut self);

    /// A frame addressed to this context arrived
    fn on_frame(&mut self, frame: LinkFrame);

    /// Outcome of the last frame this context transmitted
    fn on_transmit_result(&mut self, success: bool);

    /// A timer started through the router handle expired
    fn on_timer(&mut self, _id: TimerId) {}
}

/// Handle through which a context reaches its router
///
/// Everything a handle does is posted onto the router's scheduler, so it is
/// safe to call from inside any [`LinkContext`] callback.
#[derive(Clone)]
pub struct RouterHandle {
    address: u16,
    generation: u64,
    tasks: TaskPoster<RouterTask>,
    timers: Arc<dyn TimerSource>,
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("address", &self.address)
            .field("generation", &self.generation)
            .finish()
    }
}

impl RouterHandle {
    pub(crate) fn new(
        address: u16,
        generation: u64,
        tasks: TaskPoster<RouterTask>,
        timers: Arc<dyn TimerSource>,
    ) -> Self {
        Self {
            address,
            generation,
            tasks,
            timers,
        }
    }

    /// Address the context is registered under
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Queue a frame for transmission
    ///
    /// The result arrives later through
    /// [`LinkContext::on_transmit_result`]. Frames still queued when the
    /// context is removed are never written.
    pub fn transmit(&self, frame: &LinkFrame) -> DnpResult<()> {
        let bytes = frame.encode()?;
        if self.tasks.post(RouterTask::Transmit {
            address: self.address,
            generation: self.generation,
            frame: bytes,
        }) {
            Ok(())
        } else {
            Err(DnpError::Closed(format!(
                "router for address {} is gone",
                self.address
            )))
        }
    }

    /// Start a timer whose expiry is delivered to [`LinkContext::on_timer`]
    pub fn start_timer(&self, delay: Duration) -> TimerId {
        let tasks = self.tasks.clone();
        let (address, generation) = (self.address, self.generation);
        self.timers.start(
            delay,
            Box::new(move |id: TimerId| {
                tasks.post(RouterTask::ContextTimer {
                    address,
                    generation,
                    id,
                });
            }),
        )
    }

    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }
}
