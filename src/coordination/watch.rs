//! Subtree watches
//!
//! The namespace publishes every node change on one broadcast channel; a
//! [`Watch`] keeps only the events for direct children of its root.

use super::parent_path;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Updated,
    Deleted,
}

/// A single node change. `data` is absent for deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
    pub data: Option<Vec<u8>>,
}

/// What a watcher observes next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    Event(WatchEvent),
    /// Events were dropped; rebuild from a fresh child snapshot
    Resync,
}

pub struct Watch {
    root: String,
    rx: broadcast::Receiver<WatchEvent>,
}

impl Watch {
    pub fn new(root: impl Into<String>, rx: broadcast::Receiver<WatchEvent>) -> Self {
        Self {
            root: root.into(),
            rx,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Next signal for this subtree; `None` once the namespace is gone
    pub async fn next(&mut self) -> Option<WatchSignal> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if parent_path(&event.path) == Some(self.root.as_str()) {
                        return Some(WatchSignal::Event(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Watch on {} lagged by {} events", self.root, skipped);
                    return Some(WatchSignal::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
