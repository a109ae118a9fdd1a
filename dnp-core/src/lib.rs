//! Core types and utilities for the DNP3 port/router stack
//!
//! This crate provides the error type, the physical lifecycle state, the
//! monitor contract, timer sources, the serialized task scheduler and the
//! logger handle used throughout the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod scheduler;
pub mod state;
pub mod timer;

pub use config::{PortConfig, DEFAULT_OPEN_RETRY};
pub use error::{DnpError, DnpResult};
pub use logging::{filter_level_to_mask, FilterLevel, Logger};
pub use monitor::{PhysMonitor, StateRecorder};
pub use scheduler::{TaskPoster, TaskScheduler};
pub use state::PhysicalState;
pub use timer::{MockTimerSource, TimerCallback, TimerId, TimerSource, TokioTimerSource};
