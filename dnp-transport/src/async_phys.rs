//! Physical layer driven by a tokio I/O task

use crate::error::DnpError;
use crate::physical::{PhysicalEvent, PhysicalEventSink, PhysicalLayer};
use crate::stream::PhysicalStream;
use bytes::Bytes;
use dnp_core::Logger;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Size of the buffer handed to each stream read
pub const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug)]
enum IoCommand {
    Write(Bytes),
    Close,
}

/// [`PhysicalLayer`] over any [`PhysicalStream`]
///
/// Each open cycle spawns one I/O task that owns the stream for the length
/// of the cycle: it opens the stream, reads continuously, performs queued
/// writes and finally closes the stream, reporting everything through the
/// bound sink. Must be used from within a tokio runtime.
pub struct AsyncPhysicalLayer<T> {
    stream: Arc<Mutex<T>>,
    description: String,
    sink: Option<PhysicalEventSink>,
    commands: Option<mpsc::UnboundedSender<IoCommand>>,
    logger: Logger,
}

impl<T> AsyncPhysicalLayer<T>
where
    T: PhysicalStream + 'static,
{
    pub fn new(stream: T, logger: Logger) -> Self {
        let description = stream.describe();
        Self {
            stream: Arc::new(Mutex::new(stream)),
            description,
            sink: None,
            commands: None,
            logger,
        }
    }

    fn deliver(&self, event: PhysicalEvent) {
        if let Some(sink) = &self.sink {
            sink.deliver(event);
        }
    }
}

impl<T> PhysicalLayer for AsyncPhysicalLayer<T>
where
    T: PhysicalStream + 'static,
{
    fn bind(&mut self, sink: PhysicalEventSink) {
        self.sink = Some(sink);
    }

    fn async_open(&mut self) {
        let Some(sink) = self.sink.clone() else {
            self.logger
                .error(format_args!("open on {} before bind", self.description));
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);
        self.logger
            .debug(format_args!("opening {}", self.description));
        tokio::spawn(run_cycle(self.stream.clone(), sink, rx, self.logger.clone()));
    }

    fn async_close(&mut self) {
        if let Some(commands) = self.commands.take() {
            // A failed send means the cycle already ended and reported it.
            let _ = commands.send(IoCommand::Close);
        }
    }

    fn async_write(&mut self, data: Bytes) {
        let sent = match &self.commands {
            Some(commands) => commands.send(IoCommand::Write(data)).is_ok(),
            None => false,
        };
        if !sent {
            self.deliver(PhysicalEvent::WriteFailed(format!(
                "{} is not open",
                self.description
            )));
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl<T> Drop for AsyncPhysicalLayer<T> {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(IoCommand::Close);
        }
    }
}

async fn run_cycle<T: PhysicalStream>(
    stream: Arc<Mutex<T>>,
    sink: PhysicalEventSink,
    mut commands: mpsc::UnboundedReceiver<IoCommand>,
    logger: Logger,
) {
    // Waits here until the previous cycle has released the stream.
    let mut stream = stream.lock().await;

    let opened = {
        let open = stream.open();
        tokio::pin!(open);
        loop {
            tokio::select! {
                result = &mut open => break Some(result),
                cmd = commands.recv() => match cmd {
                    Some(IoCommand::Write(_)) => {
                        sink.deliver(PhysicalEvent::WriteFailed("write before open".to_string()));
                    }
                    Some(IoCommand::Close) | None => break None,
                },
            }
        }
    };

    match opened {
        Some(Ok(())) => {
            logger.info(format_args!("opened {}", stream.describe()));
            if !sink.deliver(PhysicalEvent::Opened) {
                let _ = stream.close().await;
                return;
            }
        }
        Some(Err(e)) => {
            logger.warn(format_args!("open of {} failed: {}", stream.describe(), e));
            sink.deliver(PhysicalEvent::OpenFailed(e.to_string()));
            return;
        }
        None => {
            let _ = stream.close().await;
            sink.deliver(PhysicalEvent::Closed);
            return;
        }
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(IoCommand::Write(data)) => {
                    let result = match stream.write_all(&data).await {
                        Ok(()) => stream.flush().await,
                        Err(e) => Err(e),
                    };
                    let event = match result {
                        Ok(()) => PhysicalEvent::WriteComplete,
                        Err(e) => PhysicalEvent::WriteFailed(e.to_string()),
                    };
                    if !sink.deliver(event) {
                        break;
                    }
                }
                Some(IoCommand::Close) | None => break,
            },
            result = stream.read(&mut buf) => match result {
                Ok(0) => {
                    logger.info(format_args!("{} closed by remote", stream.describe()));
                    break;
                }
                Ok(n) => {
                    if !sink.deliver(PhysicalEvent::Received(Bytes::copy_from_slice(&buf[..n]))) {
                        break;
                    }
                }
                Err(DnpError::Timeout) => {}
                Err(e) => {
                    logger.warn(format_args!("read on {} failed: {}", stream.describe(), e));
                    break;
                }
            },
        }
    }

    let _ = stream.close().await;
    logger.debug(format_args!("closed {}", stream.describe()));
    sink.deliver(PhysicalEvent::Closed);
}
