//! minicoord binary: run a local fleet or probe a port

use clap::{Parser, Subcommand};
use minicoord::common::parse_duration;
use minicoord::coordination::MemoryNamespace;
use minicoord::ports::{OsPortProbe, PortProbe};
use minicoord::{Config, ConfigEntry, Node, ServiceEndpoint};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minicoord")]
#[command(about = "Fleet coordination: config, service registry and port allocation")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start N instances on one in-process namespace and report what they agreed on
    Fleet {
        /// Number of instances
        #[arg(long, default_value = "3")]
        instances: usize,

        /// Version each instance registers with
        #[arg(long, default_value = "0.1.0")]
        version: String,

        /// Per-operation timeout (e.g. "500ms", "10s"); defaults to runtime.op_timeout_ms
        #[arg(long)]
        timeout: Option<String>,
    },

    /// Check whether a port can be bound right now
    Probe {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Fleet {
            instances,
            version,
            timeout,
        } => {
            let timeout = match timeout {
                Some(raw) => parse_duration(&raw)?,
                None => config.runtime.op_timeout(),
            };
            tracing::info!("minicoord {}", minicoord::BUILD_INFO);
            run_fleet(&config, instances, &version, timeout).await?;
        }
        Commands::Probe { host, port } => {
            let free = OsPortProbe.is_free(&host, port);
            println!("{}", json!({ "host": host, "port": port, "free": free }));
        }
    }

    Ok(())
}

async fn run_fleet(
    config: &Config,
    instances: usize,
    version: &str,
    timeout: Duration,
) -> anyhow::Result<()> {
    let namespace = MemoryNamespace::new();
    let mut nodes = Vec::with_capacity(instances);
    let mut reservations = Vec::with_capacity(instances);

    for i in 0..instances {
        let mut node_config = config.clone();
        node_config.node_id = format!("{}-{}", config.node_id, i);
        let node = Node::start(Arc::new(namespace.connect()), &node_config)?;

        let reservation = node.ports.get_reservation()?;
        let endpoint = ServiceEndpoint::new(
            &config.registry.system_name,
            version,
            &reservation.host,
            reservation.port,
            false,
        );
        node.registry.register(&endpoint)?;

        let entry = ConfigEntry::new(
            format!("instance/{}/url", node.node_id),
            endpoint.as_url(),
        )?;
        node.config_store.set(entry).wait(timeout).await?;

        reservations.push(reservation);
        nodes.push(node);
    }

    let Some(observer) = nodes.first() else {
        println!("{}", json!({ "instances": 0 }));
        return Ok(());
    };

    // Writes reach every cache through the watch; give them time to land
    let deadline = tokio::time::Instant::now() + timeout;
    let mut snapshot = observer.config_store.get_all().wait(timeout).await?;
    while snapshot.len() < instances && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
        snapshot = observer.config_store.get_all().wait(timeout).await?;
    }

    let endpoints = observer.registry.get_all()?;
    let summary = json!({
        "instances": instances,
        "reservations": reservations,
        "endpoints": endpoints,
        "picked": observer.registry.get_random()?,
        "config": snapshot.into_collection(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    for node in &nodes {
        node.shutdown();
    }
    Ok(())
}
