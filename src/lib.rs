//! # minicoord
//!
//! Leaderless coordination for a fleet of service processes:
//! - Dynamic configuration with a watch-backed local cache
//! - Service registration and discovery with session-bound lifetimes
//! - Collision-free port allocation via a shared compare-and-swap counter
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Coordination namespace              │
//! │  /config/<key>        watched subtree            │
//! │  /services/<system>/  ephemeral registrations    │
//! │  /ports/counter       versioned counter (CAS)    │
//! └──────┬───────────────────┬──────────────┬────────┘
//!        │ watch + writes    │ ephemerals   │ read + CAS
//! ┌──────▼──────┐   ┌────────▼───────┐   ┌──▼────────────┐
//! │ ConfigStore │   │ServiceRegistry │   │ PortAllocator │
//! │ + cache     │   │                │   │ + OS probe    │
//! └─────────────┘   └────────────────┘   └───────────────┘
//! ```
//!
//! The three components are independent; each only needs a
//! [`coordination::CoordinationClient`].
//!
//! ## Usage
//!
//! ```no_run
//! use minicoord::coordination::MemoryNamespace;
//! use minicoord::{Config, ConfigEntry, Node};
//! use std::sync::Arc;
//!
//! # async fn example() -> minicoord::Result<()> {
//! let namespace = MemoryNamespace::new();
//! let node = Node::start(Arc::new(namespace.connect()), &Config::default())?;
//!
//! node.config_store
//!     .set(ConfigEntry::new("feature.x", "on")?)
//!     .wait_default()
//!     .await?;
//! let reservation = node.ports.get_reservation()?;
//! println!("bind to {}", reservation);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config_store;
pub mod coordination;
pub mod node;
pub mod ports;
pub mod registry;

// Re-export commonly used types
pub use common::{
    Config, ConfigCollection, ConfigEntry, ConfigSnapshot, Error, ErrorKind, OpHandle,
    Reservation, Result, ServiceEndpoint, WorkerPool,
};
pub use config_store::ConfigStore;
pub use node::Node;
pub use ports::{PortAllocator, PortProbe};
pub use registry::ServiceRegistry;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
