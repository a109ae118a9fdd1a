//! Port configuration

use crate::logging::FilterLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay before reopening a physical layer after a failure
pub const DEFAULT_OPEN_RETRY: Duration = Duration::from_secs(5);

/// Port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Port name, used for diagnostics and log targets
    pub name: String,
    /// Delay before reopening the physical layer after an open failure or a drop
    pub open_retry: Duration,
    /// Log filter level for the port and its router
    pub filter: FilterLevel,
}

impl PortConfig {
    /// Create settings with default retry delay and filter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open_retry: DEFAULT_OPEN_RETRY,
            filter: FilterLevel::Info,
        }
    }

    pub fn with_open_retry(mut self, open_retry: Duration) -> Self {
        self.open_retry = open_retry;
        self
    }

    pub fn with_filter(mut self, filter: FilterLevel) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new("port")
    }
}
