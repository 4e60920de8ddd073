//! Fleet-wide port allocation
//!
//! All allocators share one versioned counter holding the last port handed
//! out. Advancing it is a compare-and-swap, so two allocators can never win
//! the same counter version. A winner still has to pass the OS probe before
//! the port is returned.
//!
//! The attempt bound is the range size plus two: one full wrap-around plus
//! slack for lost CAS races. Ports are never released; values come back
//! only when the counter wraps.

use super::probe::PortProbe;
use crate::common::config::PortConfig;
use crate::common::types::Reservation;
use crate::coordination::{validate_path, CoordinationClient, CoordinationError};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct PortAllocator {
    client: Arc<dyn CoordinationClient>,
    probe: Arc<dyn PortProbe>,
    host: String,
    min_port: u16,
    max_port: u16,
    counter_path: String,
    counter_ready: AtomicBool,
    closed: AtomicBool,
}

impl PortAllocator {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        config: &PortConfig,
        probe: Arc<dyn PortProbe>,
    ) -> Result<Self> {
        if config.min_port == 0 || config.min_port > config.max_port {
            return Err(Error::InvalidConfig(format!(
                "invalid port range {}..={}",
                config.min_port, config.max_port
            )));
        }
        validate_path(&config.counter_path)
            .map_err(|e| Error::InvalidConfig(format!("ports.counter_path: {}", e)))?;

        Ok(Self {
            client,
            probe,
            host: config.host.clone(),
            min_port: config.min_port,
            max_port: config.max_port,
            counter_path: config.counter_path.clone(),
            counter_ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn range(&self) -> (u16, u16) {
        (self.min_port, self.max_port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Upper bound on counter advances per `get_reservation` call
    pub fn max_attempts(&self) -> u32 {
        u32::from(self.max_port - self.min_port) + 2
    }

    /// Next port after `current`, wrapping to `min_port`
    fn next_port(&self, current: i64) -> u16 {
        let next = current.saturating_add(1);
        if next > i64::from(self.max_port) || next < i64::from(self.min_port) {
            self.min_port
        } else {
            // within [min_port, max_port]
            next as u16
        }
    }

    fn protocol_error(&self, source: CoordinationError) -> Error {
        Error::PortProtocol {
            host: self.host.clone(),
            source,
        }
    }

    fn ensure_counter(&self) -> Result<()> {
        if self.counter_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let initial = i64::from(self.min_port) - 1;
        let created = self
            .client
            .ensure_counter(&self.counter_path, initial)
            .map_err(|e| self.protocol_error(e))?;
        if created {
            tracing::info!(
                "Initialized port counter {} at {}",
                self.counter_path,
                initial
            );
        }
        self.counter_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Claim the next free port in range. Runs to completion or exhaustion.
    pub fn get_reservation(&self) -> Result<Reservation> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed(format!("port allocator {}", self.counter_path)));
        }
        self.ensure_counter()?;

        let attempts = self.max_attempts();
        for attempt in 1..=attempts {
            let current = self
                .client
                .read_counter(&self.counter_path)
                .map_err(|e| self.protocol_error(e))?;
            let port = self.next_port(current.value);

            let won = self
                .client
                .compare_and_swap(&self.counter_path, current.version, i64::from(port))
                .map_err(|e| self.protocol_error(e))?;
            if !won {
                tracing::debug!(
                    "Attempt {}/{}: lost counter race at version {}",
                    attempt,
                    attempts,
                    current.version
                );
                continue;
            }
            if !self.probe.is_free(&self.host, port) {
                tracing::debug!(
                    "Attempt {}/{}: port {} is taken outside the fleet",
                    attempt,
                    attempts,
                    port
                );
                continue;
            }

            tracing::info!("Reserved port {}:{} (attempt {})", self.host, port, attempt);
            return Ok(Reservation {
                host: self.host.clone(),
                port,
            });
        }

        tracing::warn!(
            "No port available in {}..={} after {} attempts",
            self.min_port,
            self.max_port,
            attempts
        );
        Err(Error::PortExhausted {
            min: self.min_port,
            max: self.max_port,
            attempts,
        })
    }

    /// Release the counter handle. Best effort; never fails.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Port allocator for {} closed", self.counter_path);
        }
    }
}
