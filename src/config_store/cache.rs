//! Watch-backed config cache
//!
//! One task owns all writes to the cache: it applies watch events in the
//! order the namespace published them and rebuilds from a child snapshot
//! whenever the watch reports lost events. Readers only ever touch the
//! concurrent map.

use crate::common::types::{ConfigEntry, ConfigSnapshot};
use crate::common::utils::decode_key;
use crate::coordination::{
    node_name, CoordResult, CoordinationClient, Watch, WatchEvent, WatchEventKind, WatchSignal,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Read side of the cache; cheap to clone
#[derive(Clone, Default)]
pub struct CacheView {
    entries: Arc<DashMap<String, ConfigEntry>>,
}

impl CacheView {
    pub fn get(&self, key: &str) -> Option<ConfigEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turn a child node into an entry; `None` means "not present"
fn decode_entry(name: &str, data: &[u8]) -> Option<ConfigEntry> {
    let key = match decode_key(name) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!("Skipping config node {}: {}", name, e);
            return None;
        }
    };
    let value = match String::from_utf8(data.to_vec()) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Skipping config key {}: value is not UTF-8", key);
            return None;
        }
    };
    match ConfigEntry::new(key, value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::debug!("Config node {} holds no usable entry: {}", name, e);
            None
        }
    }
}

/// Single writer for a [`CacheView`]
struct CacheWriter {
    view: CacheView,
}

impl CacheWriter {
    fn apply(&self, event: WatchEvent) {
        let name = node_name(&event.path);
        let key = match decode_key(name) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Ignoring event for {}: {}", event.path, e);
                return;
            }
        };

        match (event.kind, event.data) {
            (WatchEventKind::Created | WatchEventKind::Updated, Some(data)) => {
                match decode_entry(name, &data) {
                    Some(entry) => {
                        tracing::debug!("Cache apply {:?} {}", event.kind, entry);
                        self.view.entries.insert(key, entry);
                    }
                    None => {
                        self.view.entries.remove(&key);
                    }
                }
            }
            (_, _) => {
                tracing::debug!("Cache remove {}", key);
                self.view.entries.remove(&key);
            }
        }
    }

    fn rebuild(&self, children: BTreeMap<String, Vec<u8>>) {
        let fresh: BTreeMap<String, ConfigEntry> = children
            .iter()
            .filter_map(|(name, data)| decode_entry(name, data))
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        self.view
            .entries
            .retain(|key, _| fresh.contains_key(key.as_str()));
        for (key, entry) in fresh {
            self.view.entries.insert(key, entry);
        }
    }
}

/// Cache over the direct children of one root path.
pub struct ConfigCache {
    view: CacheView,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigCache {
    /// Subscribe, prime from a snapshot, then keep applying events in the
    /// background. Must be called from within a tokio runtime.
    pub fn start(client: Arc<dyn CoordinationClient>, root: &str) -> CoordResult<Self> {
        // Subscribe before the snapshot so no change falls between the two
        let watch = client.watch(root)?;
        let writer = CacheWriter {
            view: CacheView::default(),
        };
        writer.rebuild(client.current_children(root)?);
        let view = writer.view.clone();

        tracing::debug!("Config cache primed with {} entries", view.len());
        let task = tokio::spawn(run_writer(writer, watch, client, root.to_string()));

        Ok(Self {
            view,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn view(&self) -> CacheView {
        self.view.clone()
    }

    /// Stop applying updates; the view keeps its last contents
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ConfigCache {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_writer(
    writer: CacheWriter,
    mut watch: Watch,
    client: Arc<dyn CoordinationClient>,
    root: String,
) {
    while let Some(signal) = watch.next().await {
        match signal {
            WatchSignal::Event(event) => writer.apply(event),
            WatchSignal::Resync => {
                let client = client.clone();
                let path = root.clone();
                let snapshot =
                    tokio::task::spawn_blocking(move || client.current_children(&path)).await;
                match snapshot {
                    Ok(Ok(children)) => {
                        writer.rebuild(children);
                        tracing::info!("Config cache for {} resynced", root);
                    }
                    Ok(Err(e)) => tracing::warn!("Config cache resync for {} failed: {}", root, e),
                    Err(e) => tracing::warn!("Config cache resync for {} aborted: {}", root, e),
                }
            }
        }
    }
    tracing::debug!("Config cache watch on {} ended", root);
}
