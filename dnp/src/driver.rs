//! Async driver running a port on its own tokio task

use crate::port::Port;
use crate::task::{PortCommand, PortTask, ReleaseStatus};
use bytes::Bytes;
use dnp_core::{DnpError, DnpResult, Logger, TaskPoster};
use dnp_link::RouterStatistics;
use dnp_stack::ProtocolStack;
use std::fmt;
use tokio::sync::{oneshot, watch};

/// Cloneable handle to a port running under [`spawn_port`]
///
/// Every request is posted onto the port's scheduler, so it is serialized
/// with the port's I/O completions. Requests to a port that no longer exists
/// fail with [`DnpError::Closed`].
#[derive(Clone)]
pub struct PortHandle {
    name: String,
    tasks: TaskPoster<PortTask>,
    destroyed: watch::Receiver<bool>,
    logger: Logger,
}

impl fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("name", &self.name)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Move `port` onto a new tokio task
///
/// The task runs the port until it is destroyed, then drops it. If every
/// handle is dropped first, the port is released and the task keeps running
/// until the release completes.
pub fn spawn_port(mut port: Port) -> PortHandle {
    let name = port.name().to_string();
    let logger = port.logger().clone();
    let tasks = port.poster();
    let (done, destroyed) = watch::channel(false);

    let task_logger = logger.clone();
    tokio::spawn(async move {
        let mut orphaned = false;
        loop {
            tokio::select! {
                running = port.run_next() => {
                    if !running {
                        break;
                    }
                }
                _ = done.closed(), if !orphaned => {
                    orphaned = true;
                    task_logger.warn(format_args!("every handle dropped, releasing"));
                    if port.release() == ReleaseStatus::Destroyed {
                        break;
                    }
                }
            }
        }
        task_logger.info(format_args!("port task finished"));
        let _ = done.send(true);
    });

    PortHandle {
        name,
        tasks,
        destroyed,
        logger,
    }
}

impl PortHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    pub async fn associate(
        &self,
        name: impl Into<String>,
        address: u16,
        stack: ProtocolStack,
    ) -> DnpResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            PortCommand::Associate {
                name: name.into(),
                address,
                stack,
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn disassociate(&self, name: impl Into<String>) -> DnpResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            PortCommand::Disassociate {
                name: name.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn send(&self, name: impl Into<String>, apdu: impl Into<Bytes>) -> DnpResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            PortCommand::Send {
                name: name.into(),
                apdu: apdu.into(),
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn statistics(&self) -> DnpResult<RouterStatistics> {
        let (reply, rx) = oneshot::channel();
        self.request(PortCommand::Statistics { reply }, rx).await
    }

    /// Release the port; see [`Port::release`]
    pub async fn release(&self) -> DnpResult<ReleaseStatus> {
        let (reply, rx) = oneshot::channel();
        self.request(PortCommand::Release { reply }, rx).await
    }

    /// Wait until the port has been destroyed
    pub async fn wait_destroyed(&self) {
        let mut destroyed = self.destroyed.clone();
        // An error means the task is gone, which also means destroyed.
        let _ = destroyed.wait_for(|d| *d).await;
    }

    async fn request<T>(&self, command: PortCommand, rx: oneshot::Receiver<T>) -> DnpResult<T> {
        let kind = command.as_str();
        if !self.tasks.post(PortTask::Command(command)) {
            return Err(self.closed(kind));
        }
        rx.await.map_err(|_| self.closed(kind))
    }

    fn closed(&self, kind: &str) -> DnpError {
        self.logger
            .error(format_args!("{} sent to port that no longer exists", kind));
        DnpError::Closed(format!("port {} is closed", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnp_core::{PortConfig, StateRecorder, TokioTimerSource};
    use dnp_stack::{LinkConfig, MockAppLayer, StackConfig};
    use dnp_transport::{MockPhysicalHandle, MockPhysicalLayer};
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn(auto_complete: bool) -> (PortHandle, MockPhysicalHandle, StateRecorder) {
        let (phys, line) = if auto_complete {
            MockPhysicalLayer::auto_complete()
        } else {
            MockPhysicalLayer::new()
        };
        let observer = StateRecorder::new();
        let port = Port::new(
            PortConfig::new("driver"),
            &Logger::default(),
            Box::new(phys),
            Arc::new(TokioTimerSource::new()),
            Some(Box::new(observer.clone())),
        );
        (spawn_port(port), line, observer)
    }

    fn stack(address: u16) -> ProtocolStack {
        let (app, _) = MockAppLayer::new();
        ProtocolStack::new(
            StackConfig::new(LinkConfig::outstation(address, 1)),
            Box::new(app),
            Logger::default(),
        )
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let (handle, line, _) = spawn(true);
        handle.associate("feeder", 4, stack(4)).await.unwrap();
        assert!(handle
            .associate("feeder", 5, stack(5))
            .await
            .unwrap_err()
            .is_conflict());

        assert_eq!(line.num_opens(), 1);
        assert_eq!(handle.statistics().await.unwrap().frames_sent, 0);
        assert!(handle.disassociate("missing").await.unwrap_err().is_not_found());
        handle.disassociate("feeder").await.unwrap();
    }

    #[tokio::test]
    async fn test_release_then_commands_fail_closed() {
        let (handle, line, _) = spawn(true);
        assert_eq!(handle.release().await.unwrap(), ReleaseStatus::Destroyed);
        handle.wait_destroyed().await;
        assert!(handle.is_destroyed());
        assert!(line.is_dropped());

        let err = handle.statistics().await.unwrap_err();
        assert!(matches!(err, DnpError::Closed(_)));
    }

    #[tokio::test]
    async fn test_deferred_release_completes_on_stopped() {
        let (handle, line, observer) = spawn(false);
        handle.associate("feeder", 4, stack(4)).await.unwrap();
        line.complete_open();

        assert_eq!(handle.release().await.unwrap(), ReleaseStatus::Deferred);
        assert!(!handle.is_destroyed());
        line.complete_close();

        tokio::time::timeout(Duration::from_secs(5), handle.wait_destroyed())
            .await
            .unwrap();
        assert!(line.is_dropped());
        assert_eq!(observer.count(dnp_core::PhysicalState::Stopped), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_over_pipe() {
        use dnp_link::LinkFrame;
        use dnp_transport::{AsyncPhysicalLayer, IoTransport};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (local, mut remote) = tokio::io::duplex(1024);
        let phys = AsyncPhysicalLayer::new(IoTransport::new("pipe", local), Logger::default());
        let port = Port::new(
            PortConfig::new("pipe"),
            &Logger::default(),
            Box::new(phys),
            Arc::new(TokioTimerSource::new()),
            None,
        );
        let handle = spawn_port(port);

        let (app, probe) = MockAppLayer::new();
        let stack = ProtocolStack::new(
            StackConfig::new(LinkConfig::outstation(4, 1)),
            Box::new(app),
            Logger::default(),
        );
        handle.associate("feeder", 4, stack).await.unwrap();

        let request = LinkFrame::unconfirmed(true, 4, 1, vec![0xC0, 0xC3, 0x01])
            .encode()
            .unwrap();
        remote.write_all(&request).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while probe.received().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(probe.received()[0], Bytes::from_static(&[0xC3, 0x01]));

        handle.send("feeder", vec![0xC3, 0x81, 0x00, 0x00]).await.unwrap();
        let mut response = vec![0u8; dnp_link::frame_size(5)];
        remote.read_exact(&mut response).await.unwrap();
        let frame = LinkFrame::decode(&response).unwrap();
        assert_eq!(frame.destination(), 1);
        assert_eq!(&frame.user_data()[1..], &[0xC3, 0x81, 0x00, 0x00][..]);

        assert_eq!(handle.release().await.unwrap(), ReleaseStatus::Deferred);
        tokio::time::timeout(Duration::from_secs(5), handle.wait_destroyed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_every_handle_releases_port() {
        let (handle, line, observer) = spawn(true);
        handle.associate("feeder", 4, stack(4)).await.unwrap();
        assert_eq!(line.num_opens(), 1);
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !line.is_dropped() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(observer.last(), Some(dnp_core::PhysicalState::Stopped));
    }
}
