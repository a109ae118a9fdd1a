//! Transport over an arbitrary already-connected async stream

use crate::error::{DnpError, DnpResult};
use crate::stream::{PhysicalStream, StreamAccessor};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Adapts any `AsyncRead + AsyncWrite` stream into a [`PhysicalStream`]
///
/// The stream is handed over at construction and can be opened exactly once;
/// after it has been closed every further `open` fails. Useful for
/// in-memory pipes and pre-established connections.
pub struct IoTransport<S> {
    name: String,
    pending: Option<S>,
    stream: Option<S>,
    timeout: Option<Duration>,
    closed: bool,
}

impl<S> fmt::Debug for IoTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoTransport")
            .field("name", &self.name)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(name: impl Into<String>, stream: S) -> Self {
        Self {
            name: name.into(),
            pending: Some(stream),
            stream: None,
            timeout: None,
            closed: true,
        }
    }

    fn stream_mut(&mut self) -> DnpResult<&mut S> {
        self.stream.as_mut().ok_or_else(|| {
            DnpError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Stream not connected",
            ))
        })
    }
}

#[async_trait]
impl<S> PhysicalStream for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn open(&mut self) -> DnpResult<()> {
        match self.pending.take() {
            Some(stream) => {
                self.stream = Some(stream);
                self.closed = false;
                Ok(())
            }
            None => Err(DnpError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("Stream {} can only be opened once", self.name),
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("io://{}", self.name)
    }
}

#[async_trait]
impl<S> StreamAccessor for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DnpResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> DnpResult<usize> {
        let timeout = self.timeout;
        let stream = self.stream_mut()?;
        let result = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| DnpError::Timeout)?,
            None => stream.read(buf).await,
        };
        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(DnpError::Connection(e))
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> DnpResult<usize> {
        let stream = self.stream_mut()?;
        stream.write(buf).await.map_err(DnpError::Connection)
    }

    async fn flush(&mut self) -> DnpResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await.map_err(DnpError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> DnpResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
