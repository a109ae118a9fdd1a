//! Physical layer module for the DNP3 port/router stack
//!
//! This crate provides byte-stream transports for TCP and Serial
//! communication, the non-blocking [`PhysicalLayer`] contract the router
//! drives, a tokio-backed implementation of it and a scriptable mock.

pub mod async_phys;
pub mod error;
pub mod io;
pub mod mock;
pub mod physical;
pub mod serial;
pub mod stream;
pub mod tcp;

pub use async_phys::{AsyncPhysicalLayer, READ_BUFFER_SIZE};
pub use error::{DnpError, DnpResult};
pub use io::IoTransport;
pub use mock::{MockPhysicalHandle, MockPhysicalLayer};
pub use physical::{PhysicalEvent, PhysicalEventSink, PhysicalLayer};
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{PhysicalStream, StreamAccessor};
pub use tcp::{TcpSettings, TcpTransport};
