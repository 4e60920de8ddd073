//! Shared data model: config entries, service endpoints, port reservations
//!
//! A `ServiceEndpoint` doubles as the JSON payload of its registration.

use crate::common::utils::{validate_key, validate_value};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single configuration value.
///
/// Field order matters: the derived ordering is by `(key, value)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

impl ConfigEntry {
    /// Create a validated entry (non-empty key and value)
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let entry = Self {
            key: key.into(),
            value: value.into(),
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn validate(&self) -> Result<()> {
        validate_key(&self.key)?;
        validate_value(&self.key, &self.value)
    }
}

impl fmt::Display for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Point-in-time view of the config set, keyed by config key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    entries: BTreeMap<String, ConfigEntry>,
}

impl ConfigSnapshot {
    pub fn get(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, ConfigEntry> {
        &self.entries
    }

    /// Entries ordered by `(key, value)`
    pub fn to_sorted_set(&self) -> BTreeSet<ConfigEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn into_collection(self) -> ConfigCollection {
        ConfigCollection {
            config: self.entries.into_values().collect(),
        }
    }
}

impl FromIterator<ConfigEntry> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = ConfigEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.key.clone(), e)).collect(),
        }
    }
}

/// Wire form of a config listing: `{"config": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigCollection {
    pub config: Vec<ConfigEntry>,
}

/// A registered service instance.
///
/// Identity is all five fields; two endpoints on the same address with
/// different versions are distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub system_name: String,
    pub system_version: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ServiceEndpoint {
    pub fn new(
        system_name: impl Into<String>,
        system_version: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        secure: bool,
    ) -> Self {
        Self {
            system_name: system_name.into(),
            system_version: system_version.into(),
            host: host.into(),
            port,
            secure,
        }
    }

    /// Display key `host:port` (not identity)
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn as_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({})",
            self.system_name,
            self.as_url(),
            self.system_version
        )
    }
}

/// Outcome of a successful port allocation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_entry_validation() {
        assert!(ConfigEntry::new("k", "v").is_ok());
        assert!(ConfigEntry::new("", "v").is_err());
        assert!(ConfigEntry::new("k", "").is_err());
    }

    #[test]
    fn test_config_entry_ordering() {
        let a = ConfigEntry::new("a", "2").unwrap();
        let b = ConfigEntry::new("a", "10").unwrap();
        let c = ConfigEntry::new("b", "0").unwrap();
        let mut v = vec![c.clone(), a.clone(), b.clone()];
        v.sort();
        assert_eq!(v, vec![b, a, c]);
    }

    #[test]
    fn test_config_entry_json() {
        let entry = ConfigEntry::new("db.url", "postgres://x").unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({"key": "db.url", "value": "postgres://x"}));
    }

    #[test]
    fn test_snapshot_views() {
        let snapshot: ConfigSnapshot = vec![
            ConfigEntry::new("b", "2").unwrap(),
            ConfigEntry::new("a", "1").unwrap(),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a").unwrap().value, "1");
        let keys: Vec<_> = snapshot.to_sorted_set().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let json = serde_json::to_string(&snapshot.into_collection()).unwrap();
        assert_eq!(
            json,
            r#"{"config":[{"key":"a","value":"1"},{"key":"b","value":"2"}]}"#
        );
    }

    #[test]
    fn test_endpoint_identity() {
        let v1 = ServiceEndpoint::new("api", "1.0", "10.0.0.1", 8080, false);
        let v2 = ServiceEndpoint::new("api", "2.0", "10.0.0.1", 8080, false);
        assert_ne!(v1, v2);
        assert_eq!(v1.id(), v2.id());
        assert_eq!(v1.as_url(), "http://10.0.0.1:8080/");

        let tls = ServiceEndpoint::new("api", "1.0", "10.0.0.1", 8443, true);
        assert_eq!(tls.as_url(), "https://10.0.0.1:8443/");
    }

    #[test]
    fn test_endpoint_json() {
        let ep = ServiceEndpoint::new("api", "1.0", "localhost", 9000, true);
        let json = serde_json::to_value(&ep).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "systemName": "api",
                "systemVersion": "1.0",
                "host": "localhost",
                "port": 9000,
                "secure": true
            })
        );
        let back: ServiceEndpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, ep);
    }
}
