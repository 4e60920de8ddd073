//! A fleet member's view of the coordination layer
//!
//! Wires the three components onto one coordination session from a
//! [`Config`]. They share the session and nothing else.

use crate::common::{Config, Result, WorkerPool};
use crate::config_store::ConfigStore;
use crate::coordination::CoordinationClient;
use crate::ports::{OsPortProbe, PortAllocator, PortProbe};
use crate::registry::ServiceRegistry;
use std::sync::Arc;

pub struct Node {
    pub node_id: String,
    pub config_store: ConfigStore,
    pub registry: ServiceRegistry,
    pub ports: PortAllocator,
}

impl Node {
    /// Start all components with the OS-level port probe.
    /// Must be called from within a tokio runtime.
    pub fn start(client: Arc<dyn CoordinationClient>, config: &Config) -> Result<Self> {
        Self::start_with_probe(client, config, Arc::new(OsPortProbe))
    }

    pub fn start_with_probe(
        client: Arc<dyn CoordinationClient>,
        config: &Config,
        probe: Arc<dyn PortProbe>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!("Starting node: {}", config.node_id);
        tracing::info!("  Config root: {}", config.config_store.root_path);
        tracing::info!(
            "  Registry: {} under {}",
            config.registry.system_name,
            config.registry.base_path
        );
        tracing::info!(
            "  Ports: {}..={} on {}",
            config.ports.min_port,
            config.ports.max_port,
            config.ports.host
        );

        let pool = WorkerPool::new(config.runtime.worker_threads);
        let config_store = ConfigStore::start(client.clone(), &config.config_store, pool)?;
        let registry = ServiceRegistry::new(client.clone(), &config.registry)?;
        let ports = PortAllocator::new(client, &config.ports, probe)?;

        Ok(Self {
            node_id: config.node_id.clone(),
            config_store,
            registry,
            ports,
        })
    }

    /// Close every component; safe to call more than once
    pub fn shutdown(&self) {
        self.registry.close();
        self.ports.close();
        self.config_store.close();
        tracing::info!("Node {} shut down", self.node_id);
    }
}
