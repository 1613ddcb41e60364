use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use luminafly_core::{logging, Config, NodeConfig};
use luminafly_dispatch::ControlLoop;
use luminafly_store::seed::{seed_demo_fleet, DemoFleet};
use luminafly_store::{BaseFilter, EntityStore, InMemoryEntityStore, SeedableStore, SqliteEntityStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;
mod websocket;

use websocket::FeedServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = config::load(&args)?;

    if config.node.log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    let store = open_store(&config.node)?;
    let engine = Arc::new(ControlLoop::new(store, &config));

    let addr: SocketAddr = config
        .node
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.node.listen_addr))?;
    let shutdown = CancellationToken::new();
    let server = Arc::new(FeedServer::new(addr, Arc::clone(&engine)));
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    log_started(&config);
    engine.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown.cancel();
    engine.stop().await;
    server_task.await??;

    info!("LuminaFly node stopped");
    Ok(())
}

fn log_started(config: &Config) {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.node.listen_addr,
        seed = ?config.simulation.seed,
        allocation = ?config.dispatch.allocation,
        return_base = ?config.dispatch.return_base,
        "LuminaFly node starting"
    );
}

fn open_store(node: &NodeConfig) -> anyhow::Result<Arc<dyn EntityStore>> {
    match &node.database_path {
        Some(path) => {
            let store = SqliteEntityStore::open(path)
                .with_context(|| format!("opening database {}", path))?;
            seed_if_empty(&store, node)?;
            info!(path = %path, "Using SQLite store");
            Ok(Arc::new(store))
        }
        None => {
            let store = InMemoryEntityStore::new();
            seed_if_empty(&store, node)?;
            info!("Using in-memory store");
            Ok(Arc::new(store))
        }
    }
}

fn seed_if_empty<S: SeedableStore>(store: &S, node: &NodeConfig) -> anyhow::Result<()> {
    if !store.bases(&BaseFilter::all())?.is_empty() {
        info!("Store already populated, skipping seed");
        return Ok(());
    }
    let fleet = DemoFleet {
        installed_drones: node.installed_drones,
        reserve_drones: node.reserve_drones,
        ..DemoFleet::default()
    };
    seed_demo_fleet(store, &fleet)?;
    Ok(())
}
