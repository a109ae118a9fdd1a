//! Per-association protocol stack for the DNP3 port/router stack
//!
//! A [`ProtocolStack`] bundles a link layer, the transport function and an
//! application layer behind one local address. It attaches to the shared
//! router as that address's [`LinkContext`](dnp_link::LinkContext).

pub mod app;
pub mod config;
pub mod link;
pub mod mock;
pub mod stack;
pub mod transport;

pub use app::AppLayer;
pub use config::{LinkConfig, StackConfig, DEFAULT_MAX_FRAGMENT_SIZE};
pub use link::LinkLayer;
pub use mock::{AppProbe, MockAppLayer};
pub use stack::ProtocolStack;
pub use transport::TransportLayer;
