//! Common utilities and types shared across minicoord

pub mod config;
pub mod error;
pub mod hash;
pub mod pool;
pub mod types;
pub mod utils;

pub use config::{
    Config, ConfigStoreConfig, PortConfig, RegistryConfig, RuntimeConfig, DEFAULT_OP_TIMEOUT,
};
pub use error::{Error, ErrorKind, Result};
pub use pool::{OpHandle, WorkerPool};
pub use types::{ConfigCollection, ConfigEntry, ConfigSnapshot, Reservation, ServiceEndpoint};
pub use utils::{decode_key, encode_key, parse_duration, validate_key};
