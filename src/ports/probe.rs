//! Port liveness probes
//!
//! The shared counter only knows about ports handed out through it; a probe
//! catches ports held by anything else on the machine.

use std::net::TcpListener;

pub trait PortProbe: Send + Sync {
    /// Can `port` on `host` be bound right now?
    fn is_free(&self, host: &str, port: u16) -> bool;
}

/// Binds the port and releases it immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct OsPortProbe;

impl PortProbe for OsPortProbe {
    fn is_free(&self, host: &str, port: u16) -> bool {
        match TcpListener::bind((host, port)) {
            Ok(listener) => {
                drop(listener);
                true
            }
            Err(e) => {
                tracing::debug!("Port {}:{} not bindable: {}", host, port, e);
                false
            }
        }
    }
}

/// Reports every port as free
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFree;

impl PortProbe for AlwaysFree {
    fn is_free(&self, _host: &str, _port: u16) -> bool {
        true
    }
}

impl<F> PortProbe for F
where
    F: Fn(&str, u16) -> bool + Send + Sync,
{
    fn is_free(&self, host: &str, port: u16) -> bool {
        self(host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_probe_detects_bound_port() {
        let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        assert!(!OsPortProbe.is_free("127.0.0.1", port));

        drop(held);
        assert!(OsPortProbe.is_free("127.0.0.1", port));
    }

    #[test]
    fn test_closure_probe() {
        let odd_only = |_: &str, port: u16| port % 2 == 1;
        assert!(odd_only.is_free("h", 5001));
        assert!(!odd_only.is_free("h", 5000));
        assert!(AlwaysFree.is_free("h", 1));
    }
}
