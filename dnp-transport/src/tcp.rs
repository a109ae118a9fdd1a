//! TCP client transport implementation

use crate::error::{DnpError, DnpResult};
use crate::stream::{PhysicalStream, StreamAccessor};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wrapper for TcpStream that implements Debug
struct DebugTcpStream(TcpStream);

impl fmt::Debug for DebugTcpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpStream").finish()
    }
}

impl Deref for DebugTcpStream {
    type Target = TcpStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugTcpStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// TCP client settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    /// Connect timeout
    pub connect_timeout: Option<Duration>,
    /// Read timeout, normally left unset when the stream is driven by a physical layer
    pub read_timeout: Option<Duration>,
    pub no_delay: bool,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            connect_timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            no_delay: true,
        }
    }

    /// Create TCP settings with connect timeout
    pub fn with_timeout(address: SocketAddr, timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(timeout),
            ..Self::new(address)
        }
    }
}

/// TCP client transport
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<DebugTcpStream>,
    settings: TcpSettings,
    closed: bool,
}

impl TcpTransport {
    /// Create a new TCP transport
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    /// Create TCP transport from address string
    pub fn from_address(address: &str) -> DnpResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| DnpError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::new(addr)))
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    fn stream_mut(&mut self) -> DnpResult<&mut DebugTcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            DnpError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "TCP stream not connected",
            ))
        })
    }
}

#[async_trait]
impl PhysicalStream for TcpTransport {
    async fn open(&mut self) -> DnpResult<()> {
        if !self.closed {
            return Err(DnpError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let stream = if let Some(timeout) = self.settings.connect_timeout {
            tokio::time::timeout(timeout, TcpStream::connect(self.settings.address))
                .await
                .map_err(|_| DnpError::Timeout)??
        } else {
            TcpStream::connect(self.settings.address).await?
        };
        stream.set_nodelay(self.settings.no_delay)?;

        self.stream = Some(DebugTcpStream(stream));
        self.closed = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.settings.address)
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> DnpResult<()> {
        self.settings.read_timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> DnpResult<usize> {
        let timeout = self.settings.read_timeout;
        let stream = self.stream_mut()?;

        let result = if let Some(timeout) = timeout {
            tokio::time::timeout(timeout, stream.read(buf))
                .await
                .map_err(|_| DnpError::Timeout)?
                .map_err(DnpError::Connection)
        } else {
            stream.read(buf).await.map_err(DnpError::Connection)
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
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
