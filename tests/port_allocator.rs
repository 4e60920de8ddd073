//! Port allocation against the in-process namespace

use minicoord::common::PortConfig;
use minicoord::coordination::{
    CoordResult, CoordinationClient, CoordinationError, MemoryNamespace, MemorySession,
    VersionedValue, Watch,
};
use minicoord::ports::{AlwaysFree, OsPortProbe, PortProbe};
use minicoord::{Error, ErrorKind, PortAllocator, Reservation};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn port_config(min: u16, max: u16) -> PortConfig {
    PortConfig {
        host: "127.0.0.1".into(),
        min_port: min,
        max_port: max,
        counter_path: "/ports/counter".into(),
    }
}

fn allocator(ns: &MemoryNamespace, min: u16, max: u16) -> PortAllocator {
    PortAllocator::new(Arc::new(ns.connect()), &port_config(min, max), Arc::new(AlwaysFree))
        .unwrap()
}

fn port_of(result: minicoord::Result<Reservation>) -> u16 {
    result.unwrap().port
}

#[test]
fn test_ports_cycle_through_range() {
    let ns = MemoryNamespace::new();
    let alloc = allocator(&ns, 5000, 5002);

    let ports: Vec<u16> = (0..4).map(|_| port_of(alloc.get_reservation())).collect();
    assert_eq!(ports, vec![5000, 5001, 5002, 5000]);
}

#[test]
fn test_counter_survives_allocator_restart() {
    let ns = MemoryNamespace::new();
    {
        let first = allocator(&ns, 5000, 5002);
        assert_eq!(port_of(first.get_reservation()), 5000);
        first.close();
    }

    let second = allocator(&ns, 5000, 5002);
    assert_eq!(port_of(second.get_reservation()), 5001);
}

#[test]
fn test_single_port_range() {
    let ns = MemoryNamespace::new();
    let alloc = allocator(&ns, 6000, 6000);
    assert_eq!(port_of(alloc.get_reservation()), 6000);
    assert_eq!(port_of(alloc.get_reservation()), 6000);
}

#[test]
fn test_reservation_carries_host() {
    let ns = MemoryNamespace::new();
    let alloc = allocator(&ns, 5000, 5000);
    let reservation = alloc.get_reservation().unwrap();
    assert_eq!(reservation.host, "127.0.0.1");
    assert_eq!(reservation.to_string(), "127.0.0.1:5000");
}

#[test]
fn test_exhaustion_after_bounded_attempts() {
    let ns = MemoryNamespace::new();
    let probes = Arc::new(AtomicU32::new(0));
    let counted = probes.clone();
    let probe = move |_: &str, _: u16| {
        counted.fetch_add(1, Ordering::SeqCst);
        false
    };
    let alloc =
        PortAllocator::new(Arc::new(ns.connect()), &port_config(5000, 5002), Arc::new(probe))
            .unwrap();

    let err = alloc.get_reservation().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PortExhaustion);
    assert!(!err.is_retryable());
    assert!(matches!(
        err,
        Error::PortExhausted {
            min: 5000,
            max: 5002,
            attempts: 4
        }
    ));
    assert_eq!(probes.load(Ordering::SeqCst), 4);
}

#[test]
fn test_skips_ports_taken_outside_fleet() {
    let ns = MemoryNamespace::new();
    let probe = |_: &str, port: u16| port != 5001;
    let alloc =
        PortAllocator::new(Arc::new(ns.connect()), &port_config(5000, 5002), Arc::new(probe))
            .unwrap();

    assert_eq!(port_of(alloc.get_reservation()), 5000);
    assert_eq!(port_of(alloc.get_reservation()), 5002);
    assert_eq!(port_of(alloc.get_reservation()), 5000);
}

#[test]
fn test_counter_outside_range_restarts_at_min() {
    let ns = MemoryNamespace::new();
    ns.connect()
        .create_path("/ports/counter", b"9000", true)
        .unwrap();

    let alloc = allocator(&ns, 5000, 5002);
    assert_eq!(port_of(alloc.get_reservation()), 5000);
}

/// Client that lets a rival allocator win the counter between our read and our CAS
struct Interposer {
    inner: MemorySession,
    rival: PortAllocator,
    fired: AtomicBool,
    rival_ports: Mutex<Vec<u16>>,
}

impl CoordinationClient for Interposer {
    fn path_exists(&self, path: &str) -> CoordResult<bool> {
        self.inner.path_exists(path)
    }

    fn create_path(&self, path: &str, data: &[u8], parents: bool) -> CoordResult<()> {
        self.inner.create_path(path, data, parents)
    }

    fn set_data(&self, path: &str, data: &[u8]) -> CoordResult<()> {
        self.inner.set_data(path, data)
    }

    fn get_data(&self, path: &str) -> CoordResult<Vec<u8>> {
        self.inner.get_data(path)
    }

    fn delete(&self, path: &str) -> CoordResult<()> {
        self.inner.delete(path)
    }

    fn watch(&self, root: &str) -> CoordResult<Watch> {
        self.inner.watch(root)
    }

    fn current_children(&self, path: &str) -> CoordResult<BTreeMap<String, Vec<u8>>> {
        self.inner.current_children(path)
    }

    fn ensure_counter(&self, path: &str, initial: i64) -> CoordResult<bool> {
        self.inner.ensure_counter(path, initial)
    }

    fn read_counter(&self, path: &str) -> CoordResult<VersionedValue> {
        let value = self.inner.read_counter(path)?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            let reservation = self
                .rival
                .get_reservation()
                .map_err(|_| CoordinationError::ConnectionLoss)?;
            self.rival_ports.lock().push(reservation.port);
        }
        Ok(value)
    }

    fn compare_and_swap(
        &self,
        path: &str,
        expected_version: u64,
        new_value: i64,
    ) -> CoordResult<bool> {
        self.inner.compare_and_swap(path, expected_version, new_value)
    }

    fn register_ephemeral(&self, namespace: &str, id: &str, payload: &[u8]) -> CoordResult<()> {
        self.inner.register_ephemeral(namespace, id, payload)
    }

    fn unregister(&self, namespace: &str, id: &str) -> CoordResult<()> {
        self.inner.unregister(namespace, id)
    }

    fn list_instances(&self, namespace: &str) -> CoordResult<Vec<(String, Vec<u8>)>> {
        self.inner.list_instances(namespace)
    }
}

#[test]
fn test_lost_race_never_double_allocates() {
    let ns = MemoryNamespace::new();
    let interposer = Arc::new(Interposer {
        inner: ns.connect(),
        rival: allocator(&ns, 5000, 5002),
        fired: AtomicBool::new(false),
        rival_ports: Mutex::new(Vec::new()),
    });
    let alloc = PortAllocator::new(
        interposer.clone(),
        &port_config(5000, 5002),
        Arc::new(AlwaysFree),
    )
    .unwrap();

    let ours = port_of(alloc.get_reservation());
    let theirs = interposer.rival_ports.lock().clone();
    assert_eq!(theirs, vec![5000]);
    assert_eq!(ours, 5001);
}

#[test]
fn test_concurrent_allocators_get_distinct_ports() {
    let ns = MemoryNamespace::new();
    let threads = 8;
    let per_thread = 10;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let alloc = allocator(&ns, 5000, 5099);
            std::thread::spawn(move || {
                (0..per_thread)
                    .map(|_| port_of(alloc.get_reservation()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let distinct: BTreeSet<u16> = all.iter().copied().collect();
    assert_eq!(all.len(), threads * per_thread);
    assert_eq!(distinct.len(), all.len());
    assert!(distinct.iter().all(|p| (5000..=5099).contains(p)));
}

#[test]
fn test_outage_is_protocol_failure() {
    let ns = MemoryNamespace::new();
    let alloc = allocator(&ns, 5000, 5002);
    assert_eq!(port_of(alloc.get_reservation()), 5000);

    ns.set_available(false);
    let err = alloc.get_reservation().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PortProtocolFailure);
    assert!(err.is_retryable());
    assert!(matches!(err, Error::PortProtocol { ref host, .. } if host == "127.0.0.1"));

    ns.set_available(true);
    assert_eq!(port_of(alloc.get_reservation()), 5001);
}

#[test]
fn test_corrupted_counter_is_protocol_failure() {
    let ns = MemoryNamespace::new();
    ns.connect()
        .create_path("/ports/counter", b"not-a-number", true)
        .unwrap();

    let err = allocator(&ns, 5000, 5002).get_reservation().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PortProtocolFailure);
    assert!(!err.is_retryable());
}

#[test]
fn test_os_probe_rejects_bound_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(!OsPortProbe.is_free("127.0.0.1", port));

    let ns = MemoryNamespace::new();
    let alloc = PortAllocator::new(
        Arc::new(ns.connect()),
        &port_config(port, port),
        Arc::new(OsPortProbe),
    )
    .unwrap();
    assert!(matches!(
        alloc.get_reservation(),
        Err(Error::PortExhausted { attempts: 2, .. })
    ));

    drop(listener);
    assert_eq!(port_of(alloc.get_reservation()), port);
}
