//! Error types re-exported from `dnp-core`

pub use dnp_core::error::{DnpError, DnpResult};
