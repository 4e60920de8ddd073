//! Configuration for minicoord components
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `MINICOORD__<SECTION>__<FIELD>` environment variables.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default time a caller waits on an operation handle
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub config_store: ConfigStoreConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub ports: PortConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Config Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreConfig {
    /// Watched subtree holding one child node per key
    #[serde(default = "default_config_root")]
    pub root_path: String,
}

fn default_config_root() -> String {
    "/config".to_string()
}

impl Default for ConfigStoreConfig {
    fn default() -> Self {
        Self {
            root_path: default_config_root(),
        }
    }
}

/// Service Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Parent of the per-system registration namespaces
    #[serde(default = "default_registry_base")]
    pub base_path: String,

    /// System whose endpoints `get_all`/`get_random` enumerate
    #[serde(default = "default_system_name")]
    pub system_name: String,
}

fn default_registry_base() -> String {
    "/services".to_string()
}

fn default_system_name() -> String {
    "minicoord".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_path: default_registry_base(),
            system_name: default_system_name(),
        }
    }
}

/// Port Allocator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Host the OS probe binds against and reservations report
    #[serde(default = "default_port_host")]
    pub host: String,

    #[serde(default = "default_min_port")]
    pub min_port: u16,

    #[serde(default = "default_max_port")]
    pub max_port: u16,

    /// Shared versioned counter location
    #[serde(default = "default_counter_path")]
    pub counter_path: String,
}

fn default_port_host() -> String {
    "127.0.0.1".to_string()
}
fn default_min_port() -> u16 {
    5000
}
fn default_max_port() -> u16 {
    5999
}
fn default_counter_path() -> String {
    "/ports/counter".to_string()
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            host: default_port_host(),
            min_port: default_min_port(),
            max_port: default_max_port(),
            counter_path: default_counter_path(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum concurrently executing coordination operations
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Default await timeout for operation handles
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_worker_threads() -> usize {
    8
}
fn default_op_timeout_ms() -> u64 {
    DEFAULT_OP_TIMEOUT.as_millis() as u64
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            log_level: default_log_level(),
            config_store: ConfigStoreConfig::default(),
            registry: RegistryConfig::default(),
            ports: PortConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file plus environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("MINICOORD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.min_port == 0 {
            return Err(Error::InvalidConfig("ports.min_port must be >= 1".into()));
        }
        if self.ports.min_port > self.ports.max_port {
            return Err(Error::InvalidConfig(format!(
                "ports.min_port ({}) exceeds ports.max_port ({})",
                self.ports.min_port, self.ports.max_port
            )));
        }
        if self.runtime.worker_threads == 0 {
            return Err(Error::InvalidConfig(
                "runtime.worker_threads must be positive".into(),
            ));
        }
        if self.registry.system_name.is_empty() {
            return Err(Error::InvalidConfig(
                "registry.system_name cannot be empty".into(),
            ));
        }
        for (name, path) in [
            ("config_store.root_path", &self.config_store.root_path),
            ("registry.base_path", &self.registry.base_path),
            ("ports.counter_path", &self.ports.counter_path),
        ] {
            crate::coordination::validate_path(path)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", name, e)))?;
        }
        Ok(())
    }
}
