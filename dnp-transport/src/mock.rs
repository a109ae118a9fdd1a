//! Scriptable physical layer for tests
//!
//! [`MockPhysicalLayer`] records what its owner asks of it, while the paired
//! [`MockPhysicalHandle`] lets a test play the role of the line: complete
//! opens, deliver inbound bytes, drop the connection and so on. In
//! auto-complete mode opens, closes and writes succeed on their own.

use crate::physical::{PhysicalEvent, PhysicalEventSink, PhysicalLayer};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockShared {
    sink: Option<PhysicalEventSink>,
    auto_complete: bool,
    open: bool,
    opening: bool,
    closing: bool,
    write_pending: bool,
    num_opens: usize,
    num_closes: usize,
    writes: Vec<Bytes>,
    dropped: bool,
}

fn lock(shared: &Mutex<MockShared>) -> MutexGuard<'_, MockShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock physical layer
#[derive(Debug)]
pub struct MockPhysicalLayer {
    shared: Arc<Mutex<MockShared>>,
}

/// Test-side view of a [`MockPhysicalLayer`]
#[derive(Debug, Clone)]
pub struct MockPhysicalHandle {
    shared: Arc<Mutex<MockShared>>,
}

impl MockPhysicalLayer {
    /// Create a manually driven mock and its handle
    pub fn new() -> (Self, MockPhysicalHandle) {
        let shared = Arc::new(Mutex::new(MockShared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            MockPhysicalHandle { shared },
        )
    }

    /// Create a mock whose opens, closes and writes complete immediately
    pub fn auto_complete() -> (Self, MockPhysicalHandle) {
        let (phys, handle) = Self::new();
        handle.set_auto_complete(true);
        (phys, handle)
    }

    fn emit(&self, event: PhysicalEvent) {
        let sink = lock(&self.shared).sink.clone();
        if let Some(sink) = sink {
            sink.deliver(event);
        }
    }
}

impl PhysicalLayer for MockPhysicalLayer {
    fn bind(&mut self, sink: PhysicalEventSink) {
        lock(&self.shared).sink = Some(sink);
    }

    fn async_open(&mut self) {
        let auto = {
            let mut shared = lock(&self.shared);
            shared.num_opens += 1;
            shared.opening = true;
            shared.auto_complete
        };
        if auto {
            lock(&self.shared).opening = false;
            lock(&self.shared).open = true;
            self.emit(PhysicalEvent::Opened);
        }
    }

    fn async_close(&mut self) {
        let auto = {
            let mut shared = lock(&self.shared);
            shared.num_closes += 1;
            shared.closing = true;
            shared.auto_complete
        };
        if auto {
            {
                let mut shared = lock(&self.shared);
                shared.closing = false;
                shared.open = false;
                shared.opening = false;
            }
            self.emit(PhysicalEvent::Closed);
        }
    }

    fn async_write(&mut self, data: Bytes) {
        let auto = {
            let mut shared = lock(&self.shared);
            shared.writes.push(data);
            shared.write_pending = true;
            shared.auto_complete
        };
        if auto {
            lock(&self.shared).write_pending = false;
            self.emit(PhysicalEvent::WriteComplete);
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

impl Drop for MockPhysicalLayer {
    fn drop(&mut self) {
        lock(&self.shared).dropped = true;
    }
}

impl MockPhysicalHandle {
    fn emit(&self, event: PhysicalEvent) -> bool {
        let sink = lock(&self.shared).sink.clone();
        match sink {
            Some(sink) => sink.deliver(event),
            None => false,
        }
    }

    pub fn set_auto_complete(&self, auto_complete: bool) {
        lock(&self.shared).auto_complete = auto_complete;
    }

    /// Complete a pending open successfully
    pub fn complete_open(&self) -> bool {
        {
            let mut shared = lock(&self.shared);
            shared.opening = false;
            shared.open = true;
        }
        self.emit(PhysicalEvent::Opened)
    }

    /// Fail a pending open
    pub fn fail_open(&self, reason: &str) -> bool {
        lock(&self.shared).opening = false;
        self.emit(PhysicalEvent::OpenFailed(reason.to_string()))
    }

    /// Complete a pending close
    pub fn complete_close(&self) -> bool {
        {
            let mut shared = lock(&self.shared);
            shared.closing = false;
            shared.open = false;
            shared.opening = false;
        }
        self.emit(PhysicalEvent::Closed)
    }

    /// Drop the line from the remote side
    pub fn remote_close(&self) -> bool {
        lock(&self.shared).open = false;
        self.emit(PhysicalEvent::Closed)
    }

    pub fn complete_write(&self) -> bool {
        lock(&self.shared).write_pending = false;
        self.emit(PhysicalEvent::WriteComplete)
    }

    pub fn fail_write(&self, reason: &str) -> bool {
        lock(&self.shared).write_pending = false;
        self.emit(PhysicalEvent::WriteFailed(reason.to_string()))
    }

    /// Deliver inbound bytes
    pub fn receive(&self, data: impl Into<Bytes>) -> bool {
        self.emit(PhysicalEvent::Received(data.into()))
    }

    pub fn num_opens(&self) -> usize {
        lock(&self.shared).num_opens
    }

    pub fn num_closes(&self) -> usize {
        lock(&self.shared).num_closes
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    pub fn is_opening(&self) -> bool {
        lock(&self.shared).opening
    }

    pub fn is_closing(&self) -> bool {
        lock(&self.shared).closing
    }

    pub fn is_write_pending(&self) -> bool {
        lock(&self.shared).write_pending
    }

    /// Every chunk written so far
    pub fn writes(&self) -> Vec<Bytes> {
        lock(&self.shared).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.shared).writes.clear();
    }

    /// Whether the owner has destroyed the layer
    pub fn is_dropped(&self) -> bool {
        lock(&self.shared).dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn bound() -> (MockPhysicalLayer, MockPhysicalHandle, mpsc::Receiver<PhysicalEvent>) {
        let (mut phys, handle) = MockPhysicalLayer::new();
        let (tx, rx) = mpsc::channel();
        phys.bind(PhysicalEventSink::new(move |e| tx.send(e).is_ok()));
        (phys, handle, rx)
    }

    #[test]
    fn test_manual_open_and_receive() {
        let (mut phys, handle, events) = bound();
        phys.async_open();
        assert!(handle.is_opening());
        assert!(events.try_recv().is_err());

        assert!(handle.complete_open());
        assert_eq!(events.try_recv().unwrap(), PhysicalEvent::Opened);
        assert!(handle.is_open());

        handle.receive(vec![1u8, 2, 3]);
        assert_eq!(
            events.try_recv().unwrap(),
            PhysicalEvent::Received(Bytes::from(vec![1u8, 2, 3]))
        );
    }

    #[test]
    fn test_auto_complete() {
        let (mut phys, handle, events) = bound();
        handle.set_auto_complete(true);

        phys.async_open();
        phys.async_write(Bytes::from_static(b"x"));
        phys.async_close();

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(
            got,
            vec![PhysicalEvent::Opened, PhysicalEvent::WriteComplete, PhysicalEvent::Closed]
        );
        assert_eq!(handle.num_opens(), 1);
        assert_eq!(handle.num_closes(), 1);
        assert_eq!(handle.writes(), vec![Bytes::from_static(b"x")]);
    }

    #[test]
    fn test_drop_is_observable() {
        let (phys, handle) = MockPhysicalLayer::new();
        assert!(!handle.is_dropped());
        drop(phys);
        assert!(handle.is_dropped());
    }
}
