//! Coordination primitive contract
//!
//! The config store, service registry and port allocator are all clients of
//! a strongly-consistent hierarchical namespace offering:
//! - per-node data with create/update/delete
//! - watched subtrees with point-in-time child snapshots
//! - versioned counters with compare-and-swap
//! - session-scoped ephemeral registrations
//!
//! [`MemoryNamespace`] is the in-process implementation.

pub mod memory;
pub mod watch;

pub use memory::{MemoryNamespace, MemorySession};
pub use watch::{Watch, WatchEvent, WatchEventKind, WatchSignal};

use std::collections::BTreeMap;
use thiserror::Error;

pub type CoordResult<T> = std::result::Result<T, CoordinationError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("No node at {0}")]
    NoNode(String),

    #[error("Node already exists at {0}")]
    NodeExists(String),

    #[error("Node {0} has children")]
    NotEmpty(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Connection to coordination service lost")]
    ConnectionLoss,

    #[error("Session {0} is closed")]
    SessionClosed(u64),

    #[error("Corrupted data at {path}: {reason}")]
    Corrupted { path: String, reason: String },
}

impl CoordinationError {
    /// Could the same call succeed once the service is reachable again?
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordinationError::ConnectionLoss)
    }
}

/// A counter value together with the node version it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: i64,
    pub version: u64,
}

/// Client view of the coordination service.
///
/// Calls block until the service answers; the components decide whether to
/// run them inline or on a [`crate::common::WorkerPool`].
pub trait CoordinationClient: Send + Sync {
    fn path_exists(&self, path: &str) -> CoordResult<bool>;

    /// Create a node. With `parents`, missing ancestors are created empty.
    fn create_path(&self, path: &str, data: &[u8], parents: bool) -> CoordResult<()>;

    fn set_data(&self, path: &str, data: &[u8]) -> CoordResult<()>;

    fn get_data(&self, path: &str) -> CoordResult<Vec<u8>>;

    fn delete(&self, path: &str) -> CoordResult<()>;

    /// Subscribe to create/update/delete events for the direct children of `root`
    fn watch(&self, root: &str) -> CoordResult<Watch>;

    /// Snapshot of the direct children of `path`: name -> data
    fn current_children(&self, path: &str) -> CoordResult<BTreeMap<String, Vec<u8>>>;

    /// Create the counter at `path` with `initial` unless it already exists.
    /// Returns whether this call created it.
    fn ensure_counter(&self, path: &str, initial: i64) -> CoordResult<bool>;

    fn read_counter(&self, path: &str) -> CoordResult<VersionedValue>;

    /// Store `new_value` iff the counter is still at `expected_version`
    fn compare_and_swap(&self, path: &str, expected_version: u64, new_value: i64)
        -> CoordResult<bool>;

    /// Publish `payload` as `namespace/id`, removed when this session ends
    fn register_ephemeral(&self, namespace: &str, id: &str, payload: &[u8]) -> CoordResult<()>;

    fn unregister(&self, namespace: &str, id: &str) -> CoordResult<()>;

    fn list_instances(&self, namespace: &str) -> CoordResult<Vec<(String, Vec<u8>)>>;
}

/// Check that `path` is absolute, has no empty segments and no trailing slash
pub fn validate_path(path: &str) -> CoordResult<()> {
    let invalid = |reason: &str| CoordinationError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must be absolute"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid("trailing slash"));
    }
    if path[1..].split('/').any(|segment| segment.is_empty()) {
        return Err(invalid("empty segment"));
    }
    if path.chars().any(|c| c.is_control()) {
        return Err(invalid("control character"));
    }
    Ok(())
}

pub fn join_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of an absolute path; `None` for the root
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of an absolute path
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/config").is_ok());
        assert!(validate_path("/services/api/abc").is_ok());
        assert!(validate_path("config").is_err());
        assert!(validate_path("/config/").is_err());
        assert!(validate_path("/a//b").is_err());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("/", "config"), "/config");
        assert_eq!(join_path("/config", "a%2Fb"), "/config/a%2Fb");
        assert_eq!(parent_path("/config/key"), Some("/config"));
        assert_eq!(parent_path("/config"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(node_name("/config/key"), "key");
    }

    #[test]
    fn test_transient() {
        assert!(CoordinationError::ConnectionLoss.is_transient());
        assert!(!CoordinationError::SessionClosed(1).is_transient());
    }
}
