//! Dynamic configuration store
//!
//! Each key lives as one child node of the store's root path, holding the
//! value as UTF-8. Reads are served from a watch-backed local cache; writes
//! go straight to the coordination service and reach the cache (of this and
//! every other process) through the watch.
//!
//! `set` and `unset` report the value the local cache held when the call
//! was made. The cache trails the service, so under concurrent writers that
//! "previous" value can be stale.

pub mod cache;

pub use cache::{CacheView, ConfigCache};

use crate::common::config::ConfigStoreConfig;
use crate::common::pool::{OpHandle, WorkerPool};
use crate::common::types::{ConfigEntry, ConfigSnapshot};
use crate::common::utils::{encode_key, validate_key};
use crate::coordination::{
    join_path, validate_path, CoordResult, CoordinationClient, CoordinationError,
};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ConfigStore {
    client: Arc<dyn CoordinationClient>,
    root: String,
    cache: ConfigCache,
    pool: WorkerPool,
}

impl ConfigStore {
    /// Ensure the root exists, start the cache, and return a ready store.
    /// Must be called from within a tokio runtime.
    pub fn start(
        client: Arc<dyn CoordinationClient>,
        config: &ConfigStoreConfig,
        pool: WorkerPool,
    ) -> Result<Self> {
        let root = config.root_path.clone();
        let wrap = |source: CoordinationError| Error::Config {
            key: root.clone(),
            source,
        };

        validate_path(&root).map_err(wrap)?;
        if !client.path_exists(&root).map_err(wrap)? {
            match client.create_path(&root, &[], true) {
                Ok(()) | Err(CoordinationError::NodeExists(_)) => {}
                Err(e) => return Err(wrap(e)),
            }
        }

        let cache = ConfigCache::start(client.clone(), &root).map_err(wrap)?;
        tracing::info!(
            "Config store started on {} ({} entries cached)",
            root,
            cache.view().len()
        );

        Ok(Self {
            client,
            root,
            cache,
            pool,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// All cached entries
    pub fn get_all(&self) -> OpHandle<ConfigSnapshot> {
        let view = self.cache.view();
        self.pool.submit(move || Ok(view.snapshot()))
    }

    /// All cached entries ordered by `(key, value)`
    pub fn snapshot_sorted(&self) -> OpHandle<BTreeSet<ConfigEntry>> {
        let view = self.cache.view();
        self.pool.submit(move || Ok(view.snapshot().to_sorted_set()))
    }

    pub fn get(&self, key: &str) -> OpHandle<Option<ConfigEntry>> {
        let view = self.cache.view();
        let key = key.to_string();
        self.pool.submit(move || Ok(view.get(&key)))
    }

    /// Create or overwrite `entry.key`; yields the previously cached entry
    pub fn set(&self, entry: ConfigEntry) -> OpHandle<Option<ConfigEntry>> {
        if let Err(e) = entry.validate() {
            return self.pool.submit(move || Err(e));
        }

        // Captured before the write is issued
        let previous = self.cache.view().get(&entry.key);
        let client = self.client.clone();
        let path = join_path(&self.root, &encode_key(&entry.key));

        self.pool.submit(move || {
            write_value(client.as_ref(), &path, entry.value.as_bytes()).map_err(|source| {
                Error::Config {
                    key: entry.key.clone(),
                    source,
                }
            })?;
            tracing::debug!("Config set {}", entry);
            Ok(previous)
        })
    }

    /// Delete `key` if present; yields the previously cached entry
    pub fn unset(&self, key: &str) -> OpHandle<Option<ConfigEntry>> {
        if let Err(e) = validate_key(key) {
            return self.pool.submit(move || Err(e));
        }

        let previous = self.cache.view().get(key);
        let client = self.client.clone();
        let path = join_path(&self.root, &encode_key(key));
        let key = key.to_string();

        self.pool.submit(move || {
            let deleted = delete_value(client.as_ref(), &path)
                .map_err(|source| Error::Config {
                    key: key.clone(),
                    source,
                })?;
            if deleted {
                tracing::debug!("Config unset {}", key);
            }
            Ok(previous)
        })
    }

    /// Stop following changes; later reads see the last cached state
    pub fn close(&self) {
        self.cache.stop();
        tracing::info!("Config store on {} closed", self.root);
    }
}

/// Create-or-update: create when absent, else unconditional overwrite
fn write_value(client: &dyn CoordinationClient, path: &str, data: &[u8]) -> CoordResult<()> {
    if client.path_exists(path)? {
        return client.set_data(path, data);
    }
    match client.create_path(path, data, true) {
        // Lost a create race; overwriting keeps last-write-wins
        Err(CoordinationError::NodeExists(_)) => client.set_data(path, data),
        other => other,
    }
}

/// Delete if present; never creates anything. Returns whether a node was removed.
fn delete_value(client: &dyn CoordinationClient, path: &str) -> CoordResult<bool> {
    if !client.path_exists(path)? {
        return Ok(false);
    }
    match client.delete(path) {
        Ok(()) => Ok(true),
        Err(CoordinationError::NoNode(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
