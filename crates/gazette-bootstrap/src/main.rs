//! Bootstrap-advertiser node: a dedicated, always-reachable overlay peer
//! that only does discovery. It runs the DHT in server mode, accepts relay
//! traffic, advertises the network rendezvous, and exposes a small HTTP
//! surface so new peers can auto-discover the network without hardcoded
//! addresses. No article pipeline, no gossip handlers.

mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gazette_net::{load_or_generate_keypair, spawn_swarm, NetworkStats, SwarmConfig};
use gazette_shared::constants::{DEFAULT_BOOTSTRAP_HTTP_PORT, DEFAULT_P2P_PORT, DHT_PROTOCOL, RENDEZVOUS};

#[derive(Debug, Clone)]
struct BootstrapConfig {
    p2p_port: u16,
    http_port: u16,
    data_dir: PathBuf,
}

impl BootstrapConfig {
    fn from_env() -> Self {
        Self {
            p2p_port: env_port("BOOTSTRAP_P2P_PORT", DEFAULT_P2P_PORT),
            http_port: env_port("BOOTSTRAP_HTTP_PORT", DEFAULT_BOOTSTRAP_HTTP_PORT),
            data_dir: std::env::var("BOOTSTRAP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
        }
    }
}

fn env_port(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %value, "invalid port, using default");
            default
        }),
        Err(_) => default,
    }
}

fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".gazette").join("bootstrap"),
        Err(_) => PathBuf::from("./data/bootstrap"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("starting gazette bootstrap server v{}", env!("CARGO_PKG_VERSION"));

    let config = BootstrapConfig::from_env();
    info!(?config, "loaded configuration");

    std::fs::create_dir_all(&config.data_dir)?;
    let keypair = load_or_generate_keypair(&config.data_dir.join("node.key"))?;

    let stats = Arc::new(NetworkStats::new());
    let swarm_config = SwarmConfig {
        listen_port: config.p2p_port,
        relay_server: true,
        ..Default::default()
    };
    let (handle, mut notifications, peer_id) =
        spawn_swarm(keypair, swarm_config, stats.clone()).await?;

    info!(peer_id = %peer_id, p2p_port = config.p2p_port, "bootstrap overlay running");

    // A bootstrap node has no gossip or sync handlers, but the
    // notification channel must still be drained.
    tokio::spawn(async move { while notifications.recv().await.is_some() {} });

    // Give the listeners a moment to bind before advertising addresses.
    tokio::time::sleep(Duration::from_secs(1)).await;
    save_bootstrap_info(&config, &handle, &peer_id.to_string()).await;

    // Periodic stats logging.
    let stats_handle = handle.clone();
    let stats_counter = stats.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let connected = stats_handle.peers().await.map(|p| p.len()).unwrap_or(0);
            let snapshot = stats_counter.snapshot();
            info!(
                connected,
                discovered = snapshot.peers_discovered,
                total_served = snapshot.total_connections,
                "bootstrap stats"
            );
        }
    });

    // HTTP status surface.
    let state = http::AppState {
        handle: handle.clone(),
        stats,
        peer_id: peer_id.to_string(),
    };
    let router = http::build_router(state);
    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(port = config.http_port, "http surface listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c, shutting down");
    });

    // Serve until ctrl-c; then close the overlay within a bounded window.
    server.await?;
    let _ = tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await;

    info!("bootstrap server stopped");
    Ok(())
}

/// Persist self-advertised info for operators to share out-of-band.
async fn save_bootstrap_info(
    config: &BootstrapConfig,
    handle: &gazette_net::SwarmHandle,
    peer_id: &str,
) {
    let addresses: Vec<String> = handle
        .listen_addrs()
        .await
        .unwrap_or_default()
        .iter()
        .map(|addr| addr.to_string())
        .collect();

    let info = serde_json::json!({
        "peer_id": peer_id,
        "addresses": addresses,
        "rendezvous": RENDEZVOUS,
        "protocol": DHT_PROTOCOL,
        "version": env!("CARGO_PKG_VERSION"),
        "created_at": chrono::Utc::now().to_rfc3339(),
    });

    let path = config.data_dir.join("bootstrap-info.json");
    match serde_json::to_vec_pretty(&info) {
        Ok(data) => {
            if let Err(e) = std::fs::write(&path, data) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save bootstrap info");
            } else {
                info!(path = %path.display(), "bootstrap info saved");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to serialize bootstrap info"),
    }
}
