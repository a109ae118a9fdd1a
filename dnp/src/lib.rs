//! dnp_rs - DNP3 port/router stack
//!
//! A port owns one physical layer and a router shared by any number of
//! protocol stacks, each bound to its own local address. Stacks are
//! associated and disassociated at run time; the router runs while at least
//! one association exists and a released port frees its physical layer only
//! once the router has fully stopped.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `dnp-core`: error type, lifecycle state, monitor contract, timers,
//!   task scheduler and logging
//! - `dnp-transport`: physical layers (TCP, Serial, in-memory) and their
//!   non-blocking driver
//! - `dnp-link`: link framing and the shared router
//! - `dnp-stack`: per-association link, transport and application layers
//! - `dnp`: the port, its async driver and the port registry
//!
//! # Usage
//!
//! ```no_run
//! use dnp::{spawn_port, Port};
//! use dnp::types::{Logger, PortConfig, TokioTimerSource};
//! use dnp::stack::{LinkConfig, MockAppLayer, ProtocolStack, StackConfig};
//! use dnp::transport::{AsyncPhysicalLayer, TcpSettings, TcpTransport};
//! use std::sync::Arc;
//!
//! # async fn run() -> dnp::DnpResult<()> {
//! let logger = Logger::default();
//! let tcp = TcpTransport::new(TcpSettings::new("127.0.0.1:20000".parse().unwrap()));
//! let phys = AsyncPhysicalLayer::new(tcp, logger.sub_logger("tcp"));
//! let port = Port::new(
//!     PortConfig::new("tcp-1"),
//!     &logger,
//!     Box::new(phys),
//!     Arc::new(TokioTimerSource::new()),
//!     None,
//! );
//! let handle = spawn_port(port);
//!
//! let (app, _probe) = MockAppLayer::new();
//! let stack = ProtocolStack::new(
//!     StackConfig::new(LinkConfig::outstation(4, 1)),
//!     Box::new(app),
//!     logger.clone(),
//! );
//! handle.associate("west-feeder", 4, stack).await?;
//! handle.release().await?;
//! handle.wait_destroyed().await;
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod port;
pub mod registry;
pub mod task;

pub use driver::{spawn_port, PortHandle};
pub use port::{Port, PortState};
pub use registry::PortRegistry;
pub use task::{PortCommand, PortTask, ReleaseStatus};

// Re-export core types
pub use dnp_core::{DnpError, DnpResult, PhysicalState};

// Re-export the layer crates
pub mod types {
    pub use dnp_core::*;
}

pub mod transport {
    pub use dnp_transport::*;
}

pub mod link {
    pub use dnp_link::*;
}

pub mod stack {
    pub use dnp_stack::*;
}
