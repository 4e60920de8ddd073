//! Bounded worker pool for blocking coordination calls
//!
//! Submitted closures wait for a pool permit, then run on tokio's blocking
//! thread pool. Callers get an [`OpHandle`] and choose how long to wait.

use crate::common::config::DEFAULT_OP_TIMEOUT;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `op` on the pool. Must be called from within a tokio runtime.
    pub fn submit<T, F>(&self, op: F) -> OpHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
            tokio::task::spawn_blocking(op)
                .await
                .map_err(|e| Error::Worker(e.to_string()))?
        });
        OpHandle { handle }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Pending result of a pooled operation.
///
/// Dropping the handle or timing out does not cancel the operation.
pub struct OpHandle<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T> OpHandle<T> {
    /// Await completion for at most `timeout`
    pub async fn wait(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(joined) => joined.map_err(|e| Error::Worker(e.to_string()))?,
            Err(_) => Err(Error::Timeout(format!(
                "operation did not complete within {:?}",
                timeout
            ))),
        }
    }

    /// Await completion with the default 10 second timeout
    pub async fn wait_default(self) -> Result<T> {
        self.wait(DEFAULT_OP_TIMEOUT).await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
