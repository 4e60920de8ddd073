//! In-process coordination namespace
//!
//! A single strongly-consistent tree shared by any number of sessions.
//! Every mutation happens under one write lock and is published to
//! watchers in the same order it was applied.

use super::watch::{Watch, WatchEvent, WatchEventKind};
use super::{
    join_path, parent_path, validate_path, CoordResult, CoordinationClient, CoordinationError,
    VersionedValue,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    version: u64,
    /// Session owning an ephemeral node
    owner: Option<u64>,
}

impl Node {
    fn persistent(data: Vec<u8>) -> Self {
        Self {
            data,
            version: 0,
            owner: None,
        }
    }
}

struct Shared {
    nodes: RwLock<BTreeMap<String, Node>>,
    events: broadcast::Sender<WatchEvent>,
    available: AtomicBool,
    next_session: AtomicU64,
}

impl Shared {
    fn publish(&self, kind: WatchEventKind, path: &str, data: Option<Vec<u8>>) {
        // No subscribers is not an error
        let _ = self.events.send(WatchEvent {
            kind,
            path: path.to_string(),
            data,
        });
    }

    /// Insert a node, creating missing ancestors first when `parents` is set
    fn create(
        &self,
        nodes: &mut BTreeMap<String, Node>,
        path: &str,
        node: Node,
        parents: bool,
    ) -> CoordResult<()> {
        if nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists(path.to_string()));
        }

        let mut missing = Vec::new();
        let mut cursor = parent_path(path);
        while let Some(ancestor) = cursor {
            if nodes.contains_key(ancestor) {
                break;
            }
            missing.push(ancestor.to_string());
            cursor = parent_path(ancestor);
        }
        if let Some(first) = missing.first() {
            if !parents {
                return Err(CoordinationError::NoNode(first.clone()));
            }
        }
        for ancestor in missing.into_iter().rev() {
            nodes.insert(ancestor.clone(), Node::persistent(Vec::new()));
            self.publish(WatchEventKind::Created, &ancestor, Some(Vec::new()));
        }

        let data = node.data.clone();
        nodes.insert(path.to_string(), node);
        self.publish(WatchEventKind::Created, path, Some(data));
        Ok(())
    }

    fn remove_owned_by(&self, session: u64) -> usize {
        let mut nodes = self.nodes.write();
        let owned: Vec<String> = nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &owned {
            nodes.remove(path);
            self.publish(WatchEventKind::Deleted, path, None);
        }
        owned.len()
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

/// Direct children of `path` as (name, node)
fn children<'a>(
    nodes: &'a BTreeMap<String, Node>,
    path: &str,
) -> impl Iterator<Item = (&'a str, &'a Node)> + 'a {
    let prefix = child_prefix(path);
    let skip = prefix.len();
    nodes
        .range(prefix.clone()..)
        .take_while(move |(p, _)| p.starts_with(prefix.as_str()))
        .filter_map(move |(p, node)| {
            let rest = &p[skip..];
            (!rest.is_empty() && !rest.contains('/')).then_some((rest, node))
        })
}

fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
    let prefix = child_prefix(path);
    nodes
        .range(prefix.clone()..)
        .take_while(|(p, _)| p.starts_with(&prefix))
        .any(|(p, _)| p.len() > prefix.len())
}

fn parse_counter(path: &str, data: &[u8]) -> CoordResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| CoordinationError::Corrupted {
            path: path.to_string(),
            reason: "counter is not a decimal integer".to_string(),
        })
}

/// Shared namespace; cheap to clone.
#[derive(Clone)]
pub struct MemoryNamespace {
    shared: Arc<Shared>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Namespace whose watchers fall back to a resync after `capacity` unread events
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::persistent(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                nodes: RwLock::new(nodes),
                events,
                available: AtomicBool::new(true),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client session
    pub fn connect(&self) -> MemorySession {
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Session {} connected", id);
        MemorySession {
            shared: self.shared.clone(),
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Simulate the service becoming unreachable (or reachable again)
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
        if available {
            tracing::info!("Coordination namespace reachable");
        } else {
            tracing::warn!("Coordination namespace unreachable");
        }
    }

    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().len()
    }
}

impl Default for MemoryNamespace {
    fn default() -> Self {
        Self::new()
    }
}

/// One client session. Ephemeral nodes it registered vanish when it closes,
/// expires or is dropped.
pub struct MemorySession {
    shared: Arc<Shared>,
    id: u64,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// End the session cleanly
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let removed = self.shared.remove_owned_by(self.id);
            tracing::debug!("Session {} closed, {} ephemeral nodes removed", self.id, removed);
        }
    }

    /// Simulate server-side session expiry (e.g. missed heartbeats)
    pub fn expire(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let removed = self.shared.remove_owned_by(self.id);
            tracing::warn!("Session {} expired, {} ephemeral nodes removed", self.id, removed);
        }
    }

    fn check(&self) -> CoordResult<()> {
        if self.is_closed() {
            return Err(CoordinationError::SessionClosed(self.id));
        }
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(CoordinationError::ConnectionLoss);
        }
        Ok(())
    }

    fn checked(&self, path: &str) -> CoordResult<()> {
        self.check()?;
        validate_path(path)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_instance_id(namespace: &str, id: &str) -> CoordResult<()> {
    if id.is_empty() || id.contains('/') {
        return Err(CoordinationError::InvalidPath {
            path: format!("{}/{}", namespace, id),
            reason: "instance id must be a single non-empty segment".to_string(),
        });
    }
    Ok(())
}

impl CoordinationClient for MemorySession {
    fn path_exists(&self, path: &str) -> CoordResult<bool> {
        self.checked(path)?;
        Ok(self.shared.nodes.read().contains_key(path))
    }

    fn create_path(&self, path: &str, data: &[u8], parents: bool) -> CoordResult<()> {
        self.checked(path)?;
        let mut nodes = self.shared.nodes.write();
        self.shared
            .create(&mut nodes, path, Node::persistent(data.to_vec()), parents)
    }

    fn set_data(&self, path: &str, data: &[u8]) -> CoordResult<()> {
        self.checked(path)?;
        let mut nodes = self.shared.nodes.write();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        node.data = data.to_vec();
        node.version += 1;
        self.shared
            .publish(WatchEventKind::Updated, path, Some(data.to_vec()));
        Ok(())
    }

    fn get_data(&self, path: &str) -> CoordResult<Vec<u8>> {
        self.checked(path)?;
        self.shared
            .nodes
            .read()
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    fn delete(&self, path: &str) -> CoordResult<()> {
        self.checked(path)?;
        if path == "/" {
            return Err(CoordinationError::InvalidPath {
                path: path.to_string(),
                reason: "cannot delete the root".to_string(),
            });
        }
        let mut nodes = self.shared.nodes.write();
        if !nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        if has_children(&nodes, path) {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }
        nodes.remove(path);
        self.shared.publish(WatchEventKind::Deleted, path, None);
        Ok(())
    }

    fn watch(&self, root: &str) -> CoordResult<Watch> {
        self.checked(root)?;
        Ok(Watch::new(root, self.shared.events.subscribe()))
    }

    fn current_children(&self, path: &str) -> CoordResult<BTreeMap<String, Vec<u8>>> {
        self.checked(path)?;
        let nodes = self.shared.nodes.read();
        if !nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        Ok(children(&nodes, path)
            .map(|(name, node)| (name.to_string(), node.data.clone()))
            .collect())
    }

    fn ensure_counter(&self, path: &str, initial: i64) -> CoordResult<bool> {
        self.checked(path)?;
        let mut nodes = self.shared.nodes.write();
        if nodes.contains_key(path) {
            return Ok(false);
        }
        let node = Node::persistent(initial.to_string().into_bytes());
        self.shared.create(&mut nodes, path, node, true)?;
        Ok(true)
    }

    fn read_counter(&self, path: &str) -> CoordResult<VersionedValue> {
        self.checked(path)?;
        let nodes = self.shared.nodes.read();
        let node = nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        Ok(VersionedValue {
            value: parse_counter(path, &node.data)?,
            version: node.version,
        })
    }

    fn compare_and_swap(
        &self,
        path: &str,
        expected_version: u64,
        new_value: i64,
    ) -> CoordResult<bool> {
        self.checked(path)?;
        let mut nodes = self.shared.nodes.write();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if node.version != expected_version {
            return Ok(false);
        }
        let data = new_value.to_string().into_bytes();
        node.data = data.clone();
        node.version += 1;
        self.shared.publish(WatchEventKind::Updated, path, Some(data));
        Ok(true)
    }

    fn register_ephemeral(&self, namespace: &str, id: &str, payload: &[u8]) -> CoordResult<()> {
        self.checked(namespace)?;
        validate_instance_id(namespace, id)?;
        let path = join_path(namespace, id);
        let mut nodes = self.shared.nodes.write();
        if let Some(node) = nodes.get_mut(&path) {
            node.data = payload.to_vec();
            node.version += 1;
            node.owner = Some(self.id);
            self.shared
                .publish(WatchEventKind::Updated, &path, Some(payload.to_vec()));
            return Ok(());
        }
        let node = Node {
            data: payload.to_vec(),
            version: 0,
            owner: Some(self.id),
        };
        self.shared.create(&mut nodes, &path, node, true)
    }

    /// Removing an id that is not registered is a no-op
    fn unregister(&self, namespace: &str, id: &str) -> CoordResult<()> {
        self.checked(namespace)?;
        validate_instance_id(namespace, id)?;
        let path = join_path(namespace, id);
        let mut nodes = self.shared.nodes.write();
        if nodes.remove(&path).is_some() {
            self.shared.publish(WatchEventKind::Deleted, &path, None);
        }
        Ok(())
    }

    fn list_instances(&self, namespace: &str) -> CoordResult<Vec<(String, Vec<u8>)>> {
        self.checked(namespace)?;
        let nodes = self.shared.nodes.read();
        Ok(children(&nodes, namespace)
            .map(|(name, node)| (name.to_string(), node.data.clone()))
            .collect())
    }
}
