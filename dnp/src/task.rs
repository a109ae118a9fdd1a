//! Work items processed by a port

use bytes::Bytes;
use dnp_core::{DnpResult, PhysicalState};
use dnp_link::{RouterStatistics, RouterTask};
use dnp_stack::ProtocolStack;
use tokio::sync::oneshot;

/// Outcome of [`Port::release`](crate::Port::release)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// The port was destroyed before the call returned
    Destroyed,
    /// The port will be destroyed once its router reports stopped
    Deferred,
}

/// Request sent to a port by a [`PortHandle`](crate::PortHandle)
pub enum PortCommand {
    Associate {
        name: String,
        address: u16,
        stack: ProtocolStack,
        reply: oneshot::Sender<DnpResult<()>>,
    },
    Disassociate {
        name: String,
        reply: oneshot::Sender<DnpResult<()>>,
    },
    Send {
        name: String,
        apdu: Bytes,
        reply: oneshot::Sender<DnpResult<()>>,
    },
    Statistics {
        reply: oneshot::Sender<RouterStatistics>,
    },
    Release {
        reply: oneshot::Sender<ReleaseStatus>,
    },
}

impl PortCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortCommand::Associate { .. } => "associate",
            PortCommand::Disassociate { .. } => "disassociate",
            PortCommand::Send { .. } => "send",
            PortCommand::Statistics { .. } => "statistics",
            PortCommand::Release { .. } => "release",
        }
    }
}

/// Everything a port's scheduler carries
pub enum PortTask {
    /// Work for the router
    Router(RouterTask),
    /// The router reported a lifecycle change
    StateChange(PhysicalState),
    /// Request from a handle
    Command(PortCommand),
}
