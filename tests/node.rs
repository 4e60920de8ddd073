//! Several nodes sharing one namespace

use minicoord::coordination::MemoryNamespace;
use minicoord::ports::AlwaysFree;
use minicoord::{Config, ConfigEntry, Error, Node, ServiceEndpoint};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn node(ns: &MemoryNamespace, id: &str) -> Node {
    let mut config = Config::default();
    config.node_id = id.to_string();
    config.registry.system_name = "billing".to_string();
    config.ports.min_port = 7000;
    config.ports.max_port = 7009;
    Node::start_with_probe(Arc::new(ns.connect()), &config, Arc::new(AlwaysFree)).unwrap()
}

#[tokio::test]
async fn test_fleet_converges() {
    let ns = MemoryNamespace::new();
    let nodes: Vec<Node> = (0..3).map(|i| node(&ns, &format!("n{}", i))).collect();

    let mut ports = BTreeSet::new();
    for n in &nodes {
        let reservation = n.ports.get_reservation().unwrap();
        ports.insert(reservation.port);

        let endpoint =
            ServiceEndpoint::new("billing", "1.0", &reservation.host, reservation.port, false);
        n.registry.register(&endpoint).unwrap();
        n.config_store
            .set(ConfigEntry::new(format!("{}.url", n.node_id), endpoint.as_url()).unwrap())
            .wait_default()
            .await
            .unwrap();
    }
    assert_eq!(ports, BTreeSet::from([7000, 7001, 7002]));

    // Every node sees every registration and, once the watches catch up, every entry
    for n in &nodes {
        assert_eq!(n.registry.get_all().unwrap().len(), 3);

        let mut converged = false;
        for _ in 0..250 {
            if n.config_store.get_all().wait_default().await.unwrap().len() == 3 {
                converged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(converged, "{} did not see every entry", n.node_id);
    }

    nodes[0].shutdown();
    assert_eq!(nodes[1].registry.get_all().unwrap().len(), 2);
    assert!(nodes[0].registry.get_all().unwrap().is_empty());
    assert!(matches!(
        nodes[0].ports.get_reservation(),
        Err(Error::Closed(_))
    ));

    // shutdown twice is harmless
    nodes[0].shutdown();
}

#[tokio::test]
async fn test_invalid_config_refused() {
    let ns = MemoryNamespace::new();
    let mut config = Config::default();
    config.ports.min_port = 9000;
    config.ports.max_port = 8000;

    let result = Node::start(Arc::new(ns.connect()), &config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
