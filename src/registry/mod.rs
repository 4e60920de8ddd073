//! Service registry
//!
//! Endpoints are published as ephemeral registrations under
//! `<base_path>/<system name>`, so they disappear with the session that
//! registered them. Once closed, the registry answers every call with a
//! no-op or an empty result instead of an error.

use crate::common::config::RegistryConfig;
use crate::common::hash::short_id;
use crate::common::types::ServiceEndpoint;
use crate::common::utils::encode_key;
use crate::coordination::{join_path, validate_path, CoordinationClient};
use crate::{Error, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const INSTANCE_ID_LEN: usize = 16;

pub struct ServiceRegistry {
    client: Arc<dyn CoordinationClient>,
    base_path: String,
    system_name: String,
    closed: AtomicBool,
    /// Endpoints registered through this registry, withdrawn on close
    registered: Mutex<BTreeSet<ServiceEndpoint>>,
}

impl ServiceRegistry {
    pub fn new(client: Arc<dyn CoordinationClient>, config: &RegistryConfig) -> Result<Self> {
        validate_path(&config.base_path)
            .map_err(|e| Error::InvalidConfig(format!("registry.base_path: {}", e)))?;
        if config.system_name.is_empty() {
            return Err(Error::InvalidConfig(
                "registry.system_name cannot be empty".into(),
            ));
        }

        Ok(Self {
            client,
            base_path: config.base_path.clone(),
            system_name: config.system_name.clone(),
            closed: AtomicBool::new(false),
            registered: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Namespace holding the registrations of one system
    pub fn namespace(&self, system_name: &str) -> String {
        join_path(&self.base_path, &encode_key(system_name))
    }

    /// Registration id, derived from all five identity fields
    pub fn instance_id(endpoint: &ServiceEndpoint) -> String {
        let port = endpoint.port.to_string();
        let scheme = if endpoint.secure { "https" } else { "http" };
        short_id(
            &[
                endpoint.system_name.as_str(),
                endpoint.system_version.as_str(),
                endpoint.host.as_str(),
                port.as_str(),
                scheme,
            ],
            INSTANCE_ID_LEN,
        )
    }

    pub fn register(&self, endpoint: &ServiceEndpoint) -> Result<()> {
        if self.is_closed() {
            tracing::debug!("Registry closed, not registering {}", endpoint);
            return Ok(());
        }
        if endpoint.system_name.is_empty() || endpoint.host.is_empty() {
            return Err(Error::InvalidEntry(format!(
                "endpoint {} needs a system name and a host",
                endpoint.id()
            )));
        }

        let payload = serde_json::to_vec(endpoint)?;
        self.client
            .register_ephemeral(
                &self.namespace(&endpoint.system_name),
                &Self::instance_id(endpoint),
                &payload,
            )
            .map_err(|source| Error::Registry {
                context: format!("register {}", endpoint),
                source,
            })?;

        self.registered.lock().insert(endpoint.clone());
        tracing::info!("Registered {}", endpoint);
        Ok(())
    }

    pub fn unregister(&self, endpoint: &ServiceEndpoint) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.withdraw(endpoint)?;
        self.registered.lock().remove(endpoint);
        tracing::info!("Unregistered {}", endpoint);
        Ok(())
    }

    fn withdraw(&self, endpoint: &ServiceEndpoint) -> Result<()> {
        self.client
            .unregister(
                &self.namespace(&endpoint.system_name),
                &Self::instance_id(endpoint),
            )
            .map_err(|source| Error::Registry {
                context: format!("unregister {}", endpoint),
                source,
            })
    }

    /// Every endpoint currently registered for the configured system
    pub fn get_all(&self) -> Result<BTreeSet<ServiceEndpoint>> {
        if self.is_closed() {
            return Ok(BTreeSet::new());
        }

        let namespace = self.namespace(&self.system_name);
        let instances = self
            .client
            .list_instances(&namespace)
            .map_err(|source| Error::Registry {
                context: format!("list {}", namespace),
                source,
            })?;

        Ok(instances
            .into_iter()
            .filter_map(|(id, payload)| {
                match serde_json::from_slice::<ServiceEndpoint>(&payload) {
                    Ok(endpoint) => Some(endpoint),
                    Err(e) => {
                        tracing::warn!("Skipping registration {}/{}: {}", namespace, id, e);
                        None
                    }
                }
            })
            .collect())
    }

    /// One endpoint chosen uniformly at random
    pub fn get_random(&self) -> Result<Option<ServiceEndpoint>> {
        let endpoints: Vec<ServiceEndpoint> = self.get_all()?.into_iter().collect();
        Ok(endpoints.choose(&mut rand::thread_rng()).cloned())
    }

    /// Withdraw this registry's endpoints and refuse further work. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let registered = std::mem::take(&mut *self.registered.lock());
        for endpoint in &registered {
            if let Err(e) = self.withdraw(endpoint) {
                tracing::warn!("Failed to withdraw {} on close: {}", endpoint, e);
            }
        }
        tracing::info!(
            "Registry for {} closed ({} endpoints withdrawn)",
            self.system_name,
            registered.len()
        );
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        self.close();
    }
}
