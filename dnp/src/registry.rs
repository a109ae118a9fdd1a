//! Registry of running ports
//!
//! Released ports whose destruction is deferred are kept aside until they
//! report destroyed, so [`PortRegistry::shutdown`] can wait for every
//! physical layer to be closed and freed.

use crate::driver::{spawn_port, PortHandle};
use crate::port::Port;
use crate::task::ReleaseStatus;
use dnp_core::{DnpError, DnpResult, Logger};
use std::collections::HashMap;

/// Name-indexed collection of ports, each running on its own task
#[derive(Debug)]
pub struct PortRegistry {
    ports: HashMap<String, PortHandle>,
    releasing: Vec<PortHandle>,
    logger: Logger,
}

impl PortRegistry {
    pub fn new(logger: &Logger) -> Self {
        Self {
            ports: HashMap::new(),
            releasing: Vec::new(),
            logger: logger.sub_logger("registry"),
        }
    }

    /// Spawn `port` and register it under its name
    pub fn add_port(&mut self, port: Port) -> DnpResult<PortHandle> {
        let name = port.name().to_string();
        if self.ports.contains_key(&name) {
            return Err(DnpError::Conflict(format!("port {} already exists", name)));
        }
        let handle = spawn_port(port);
        self.ports.insert(name.clone(), handle.clone());
        self.logger.info(format_args!("port {} added", name));
        Ok(handle)
    }

    pub fn port(&self, name: &str) -> Option<&PortHandle> {
        self.ports.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.ports.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Number of released ports still waiting for their router to stop
    pub fn num_releasing(&mut self) -> usize {
        self.releasing.retain(|handle| !handle.is_destroyed());
        self.releasing.len()
    }

    /// Release the port called `name` and unregister it
    pub async fn release_port(&mut self, name: &str) -> DnpResult<ReleaseStatus> {
        let handle = self
            .ports
            .remove(name)
            .ok_or_else(|| DnpError::NotFound(format!("no port named {}", name)))?;
        let status = handle.release().await?;
        if status == ReleaseStatus::Deferred {
            self.logger
                .info(format_args!("port {} release deferred", name));
            self.releasing.push(handle);
        }
        Ok(status)
    }

    /// Release every port and wait until all of them are destroyed
    pub async fn shutdown(&mut self) {
        for name in self.names() {
            if let Err(e) = self.release_port(&name).await {
                self.logger
                    .error(format_args!("release of {} failed: {}", name, e));
            }
        }
        for handle in self.releasing.drain(..) {
            handle.wait_destroyed().await;
        }
        self.logger.info(format_args!("all ports destroyed"));
    }
}
