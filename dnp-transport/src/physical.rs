//! Non-blocking physical layer contract
//!
//! A [`PhysicalLayer`] never blocks the caller. Every operation is an
//! initiator; its completion is delivered later as a [`PhysicalEvent`]
//! through the sink bound with [`PhysicalLayer::bind`].
//!
//! # Completion contract
//! - `async_open` yields `Opened` or `OpenFailed`, unless a close cancels it
//!   first.
//! - `async_write` yields exactly one `WriteComplete` or `WriteFailed`, and
//!   is only legal while open with no other write in flight.
//! - While open, inbound bytes arrive as `Received`. A remote close or read
//!   error yields `Closed` without a preceding `async_close`.
//! - Every open cycle ends with exactly one terminal event: `OpenFailed` if
//!   the open failed, otherwise `Closed`. An `async_close` issued while the
//!   open is still in flight therefore yields either `OpenFailed` or
//!   `Closed`, never both.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Completion or notification from a physical layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalEvent {
    Opened,
    OpenFailed(String),
    WriteComplete,
    WriteFailed(String),
    Received(Bytes),
    Closed,
}

impl PhysicalEvent {
    /// Get human-readable event name
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalEvent::Opened => "Opened",
            PhysicalEvent::OpenFailed(_) => "OpenFailed",
            PhysicalEvent::WriteComplete => "WriteComplete",
            PhysicalEvent::WriteFailed(_) => "WriteFailed",
            PhysicalEvent::Received(_) => "Received",
            PhysicalEvent::Closed => "Closed",
        }
    }
}

/// Destination for physical layer events
#[derive(Clone)]
pub struct PhysicalEventSink {
    deliver: Arc<dyn Fn(PhysicalEvent) -> bool + Send + Sync>,
}

impl fmt::Debug for PhysicalEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalEventSink").finish()
    }
}

impl PhysicalEventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(PhysicalEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Deliver an event. Returns `false` once the receiver is gone.
    pub fn deliver(&self, event: PhysicalEvent) -> bool {
        (self.deliver)(event)
    }
}

/// Asynchronous, state-reporting communication channel
pub trait PhysicalLayer: Send {
    /// Install the event sink. Called once by the owner before any other operation.
    fn bind(&mut self, sink: PhysicalEventSink);

    fn async_open(&mut self);

    fn async_close(&mut self);

    fn async_write(&mut self, data: Bytes);

    /// Short description used in log messages
    fn describe(&self) -> String;
}
