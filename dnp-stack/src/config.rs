//! Stack configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default largest application fragment accepted or sent
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 2048;

/// Link layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Whether this end is the master station
    pub is_master: bool,
    /// Address the stack is registered under on the router
    pub local_address: u16,
    /// Address of the station at the other end
    pub remote_address: u16,
    /// Idle period after which a link status request is sent
    pub keep_alive: Option<Duration>,
}

impl LinkConfig {
    pub fn master(local_address: u16, remote_address: u16) -> Self {
        Self {
            is_master: true,
            local_address,
            remote_address,
            keep_alive: None,
        }
    }

    pub fn outstation(local_address: u16, remote_address: u16) -> Self {
        Self {
            is_master: false,
            ..Self::master(local_address, remote_address)
        }
    }

    pub fn with_keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = Some(period);
        self
    }
}

/// Protocol stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub link: LinkConfig,
    /// Largest APDU the transport layer segments or reassembles
    pub max_fragment_size: usize,
}

impl StackConfig {
    pub fn new(link: LinkConfig) -> Self {
        Self {
            link,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
        }
    }

    pub fn with_max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = size;
        self
    }
}
