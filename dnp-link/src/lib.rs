//! Link framing and the shared router for the DNP3 port/router stack
//!
//! This crate provides the link frame codec with its CRC, a streaming frame
//! decoder, the [`Router`] that multiplexes protocol sessions over a single
//! physical layer, and the [`LinkContext`] contract sessions implement to
//! attach to it.

pub mod context;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod router;
pub mod statistics;

pub use context::{LinkContext, RouterHandle};
pub use decoder::FrameDecoder;
pub use error::{DnpError, DnpResult};
pub use frame::{frame_size, LinkFrame, LinkFunction, BROADCAST_MIN, MAX_USER_DATA};
pub use router::{Router, RouterTask};
pub use statistics::RouterStatistics;
