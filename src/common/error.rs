//! Error types for minicoord

use crate::coordination::CoordinationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure families surfaced to the layers above the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigFailure,
    RegistryFailure,
    PortExhaustion,
    PortProtocolFailure,
    Other,
}

#[derive(Error, Debug)]
pub enum Error {
    // === Component Errors ===
    #[error("Config operation failed for key '{key}': {source}")]
    Config {
        key: String,
        #[source]
        source: CoordinationError,
    },

    #[error("Registry operation failed for {context}: {source}")]
    Registry {
        context: String,
        #[source]
        source: CoordinationError,
    },

    #[error("No port available in range {min}..={max} after {attempts} attempts")]
    PortExhausted { min: u16, max: u16, attempts: u32 },

    #[error("Port counter failure on {host}: {source}")]
    PortProtocol {
        host: String,
        #[source]
        source: CoordinationError,
    },

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    // === Input Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Configuration source error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Execution Errors ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Worker pool error: {0}")]
    Worker(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::ConfigFailure,
            Error::Registry { .. } => ErrorKind::RegistryFailure,
            Error::PortExhausted { .. } => ErrorKind::PortExhaustion,
            Error::PortProtocol { .. } => ErrorKind::PortProtocolFailure,
            _ => ErrorKind::Other,
        }
    }

    /// Is this a retryable error?
    ///
    /// Port exhaustion is never retryable: the whole range was probed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Config { source, .. }
            | Error::Registry { source, .. }
            | Error::PortProtocol { source, .. }
            | Error::Coordination(source) => source.is_transient(),
            _ => false,
        }
    }

    /// The underlying coordination failure, if any.
    pub fn coordination_cause(&self) -> Option<&CoordinationError> {
        match self {
            Error::Config { source, .. }
            | Error::Registry { source, .. }
            | Error::PortProtocol { source, .. }
            | Error::Coordination(source) => Some(source),
            _ => None,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
