//! HTTP status surface of the bootstrap advertiser.
//!
//! Four read-only endpoints; `/bootstrap` is machine-consumed by the
//! auto-discovery of regular nodes, the rest serve monitoring.

use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gazette_net::{NetworkStats, SwarmHandle};
use gazette_shared::constants::{DHT_PROTOCOL, RENDEZVOUS};

pub const NETWORK_NAME: &str = "Gazette News Network";

#[derive(Clone)]
pub struct AppState {
    pub handle: SwarmHandle,
    pub stats: Arc<NetworkStats>,
    pub peer_id: String,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/peers", get(peers))
        .route("/bootstrap", get(bootstrap_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let peers = state.handle.peers().await.map(|p| p.len()).unwrap_or(0);
    Json(json!({
        "status": "healthy",
        "peers": peers,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "network": NETWORK_NAME,
        "peer_id": state.peer_id,
        "addresses": addresses(&state).await,
        "rendezvous": RENDEZVOUS,
        "stats": state.stats.snapshot(),
        "system": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
    }))
}

async fn peers(State(state): State<AppState>) -> Json<Value> {
    let connections = state.handle.connections().await.unwrap_or_default();
    Json(json!({
        "count": connections.len(),
        "peers": connections,
    }))
}

async fn bootstrap_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "peer_id": state.peer_id,
        "addresses": addresses(&state).await,
        "rendezvous": RENDEZVOUS,
        "protocol": DHT_PROTOCOL,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn addresses(state: &AppState) -> Vec<String> {
    state
        .handle
        .listen_addrs()
        .await
        .unwrap_or_default()
        .iter()
        .map(|addr| addr.to_string())
        .collect()
}
