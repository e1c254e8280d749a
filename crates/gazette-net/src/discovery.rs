//! Bootstrap auto-discovery.
//!
//! Nodes learn bootstrap peers three ways: the configured multiaddr list,
//! an on-disk cache of previously seen bootstrap servers, and polling the
//! HTTP `/bootstrap` surface that bootstrap-advertiser nodes expose. A
//! maintenance loop re-dials the known set whenever the connected peer
//! count falls below the floor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gazette_shared::constants::{
    BOOTSTRAP_CACHE_MAX_AGE_SECS, BOOTSTRAP_CHECK_INTERVAL_SECS, BOOTSTRAP_PROBE_TIMEOUT_SECS,
    FIND_PEERS_INTERVAL_SECS, MIN_DESIRED_PEERS,
};

use crate::swarm::SwarmHandle;

const CACHE_FILE: &str = "bootstrap_cache.json";

fn unix_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

/// A known bootstrap server, as served by `GET /bootstrap` and cached on
/// disk between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapInfo {
    pub peer_id: String,
    pub addresses: Vec<String>,
    #[serde(default)]
    pub rendezvous: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "unix_epoch")]
    pub last_seen: DateTime<Utc>,
}

/// Extract a `PeerId` from a multiaddr, if one is present.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}

/// Parse a list of multiaddr strings, logging and skipping malformed ones.
pub fn parse_multiaddrs(raw: &[String]) -> Vec<Multiaddr> {
    raw.iter()
        .filter_map(|s| match s.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(addr = %s, error = %e, "could not parse multiaddr");
                None
            }
        })
        .collect()
}

/// Load the bootstrap cache, dropping entries older than 24 hours.
pub fn load_cache(data_dir: &Path) -> HashMap<String, BootstrapInfo> {
    let path = data_dir.join(CACHE_FILE);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(_) => return HashMap::new(),
    };

    let cached: HashMap<String, BootstrapInfo> = match serde_json::from_slice(&data) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse bootstrap cache");
            return HashMap::new();
        }
    };

    let now = Utc::now();
    let fresh: HashMap<String, BootstrapInfo> = cached
        .into_iter()
        .filter(|(_, info)| {
            (now - info.last_seen).num_seconds() < BOOTSTRAP_CACHE_MAX_AGE_SECS
        })
        .collect();

    debug!(entries = fresh.len(), "loaded bootstrap cache");
    fresh
}

pub fn save_cache(data_dir: &Path, entries: &HashMap<String, BootstrapInfo>) {
    let path = data_dir.join(CACHE_FILE);
    let data = match serde_json::to_vec_pretty(entries) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "failed to serialize bootstrap cache");
            return;
        }
    };
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        warn!(error = %e, "failed to create data dir for bootstrap cache");
        return;
    }
    if let Err(e) = std::fs::write(&path, data) {
        warn!(path = %path.display(), error = %e, "failed to save bootstrap cache");
    }
}

/// Polls bootstrap HTTP surfaces and keeps the node connected to at least
/// a floor of peers.
pub struct AutoDiscovery {
    handle: SwarmHandle,
    data_dir: PathBuf,
    urls: Vec<String>,
    known: RwLock<HashMap<String, BootstrapInfo>>,
    client: reqwest::Client,
}

impl AutoDiscovery {
    pub fn new(handle: SwarmHandle, data_dir: PathBuf, extra_urls: Vec<String>) -> Self {
        let mut urls = extra_urls;
        if let Ok(custom) = std::env::var("BOOTSTRAP_URL") {
            if !custom.is_empty() {
                urls.insert(0, custom);
            }
        }
        urls.push("http://localhost:8081/bootstrap".to_string());
        urls.push("http://127.0.0.1:8081/bootstrap".to_string());
        urls.dedup();

        let known = load_cache(&data_dir);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(BOOTSTRAP_PROBE_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");

        Self {
            handle,
            data_dir,
            urls,
            known: RwLock::new(known),
            client,
        }
    }

    /// Seed a bootstrap peer from a configured multiaddr.
    pub async fn add_bootstrap_peer(&self, addr: &Multiaddr) {
        let Some(peer_id) = extract_peer_id(addr) else {
            warn!(addr = %addr, "bootstrap address carries no peer id");
            return;
        };
        let mut known = self.known.write().await;
        known.insert(
            peer_id.to_string(),
            BootstrapInfo {
                peer_id: peer_id.to_string(),
                addresses: vec![addr.to_string()],
                rendezvous: String::new(),
                protocol: String::new(),
                version: String::new(),
                last_seen: Utc::now(),
            },
        );
    }

    pub async fn known_count(&self) -> usize {
        self.known.read().await.len()
    }

    /// Discovery and maintenance loops; returns on shutdown, saving the
    /// cache on the way out.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("auto-discovery started");

        let mut discover_tick =
            tokio::time::interval(Duration::from_secs(BOOTSTRAP_CHECK_INTERVAL_SECS));
        let mut maintain_tick =
            tokio::time::interval(Duration::from_secs(FIND_PEERS_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = discover_tick.tick() => {
                    self.discover().await;
                    self.connect_known().await;
                }
                _ = maintain_tick.tick() => {
                    match self.handle.peers().await {
                        Ok(peers) if peers.len() < MIN_DESIRED_PEERS => {
                            debug!(
                                current = peers.len(),
                                floor = MIN_DESIRED_PEERS,
                                "low peer count, reconnecting to bootstrap set"
                            );
                            self.connect_known().await;
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let known = self.known.read().await;
        save_cache(&self.data_dir, &known);
        info!("auto-discovery stopped");
    }

    /// Poll every configured bootstrap URL for `/bootstrap` info.
    async fn discover(&self) {
        for url in &self.urls {
            match self.fetch_info(url).await {
                Ok(mut info) => {
                    info.last_seen = Utc::now();
                    let peer_id = info.peer_id.clone();
                    self.known.write().await.insert(peer_id.clone(), info);
                    debug!(url = %url, peer = %peer_id, "discovered bootstrap server");
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "bootstrap probe failed");
                }
            }
        }
    }

    async fn fetch_info(&self, url: &str) -> anyhow::Result<BootstrapInfo> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("unexpected status: {}", response.status());
        }
        Ok(response.json::<BootstrapInfo>().await?)
    }

    /// Dial every known bootstrap server that is not already connected.
    async fn connect_known(&self) {
        let entries: Vec<BootstrapInfo> = {
            let known = self.known.read().await;
            known.values().cloned().collect()
        };
        if entries.is_empty() {
            debug!("no bootstrap servers known yet");
            return;
        }

        let connected: Vec<PeerId> = self.handle.peers().await.unwrap_or_default();

        for info in entries {
            let Ok(peer_id) = info.peer_id.parse::<PeerId>() else {
                warn!(peer = %info.peer_id, "invalid peer id in bootstrap info");
                continue;
            };
            if connected.contains(&peer_id) {
                continue;
            }
            for raw in &info.addresses {
                let Ok(addr) = raw.parse::<Multiaddr>() else { continue };
                if self.handle.dial(addr).await.is_err() {
                    return; // swarm gone
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_peer_id_from_multiaddr() {
        let peer = PeerId::random();
        let addr: Multiaddr = format!("/ip4/127.0.0.1/udp/4001/quic-v1/p2p/{peer}")
            .parse()
            .unwrap();
        assert_eq!(extract_peer_id(&addr), Some(peer));

        let bare: Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        assert_eq!(extract_peer_id(&bare), None);
    }

    #[test]
    fn parse_skips_malformed() {
        let raw = vec![
            "/ip4/127.0.0.1/udp/4001/quic-v1".to_string(),
            "not-a-multiaddr".to_string(),
            "/ip4/10.0.0.1/tcp/4001".to_string(),
        ];
        assert_eq!(parse_multiaddrs(&raw).len(), 2);
    }

    #[test]
    fn cache_round_trip_discards_stale() {
        let dir = tempfile::tempdir().unwrap();

        let mut entries = HashMap::new();
        entries.insert(
            "fresh".to_string(),
            BootstrapInfo {
                peer_id: "fresh".into(),
                addresses: vec!["/ip4/1.2.3.4/tcp/4001".into()],
                rendezvous: String::new(),
                protocol: String::new(),
                version: String::new(),
                last_seen: Utc::now(),
            },
        );
        entries.insert(
            "stale".to_string(),
            BootstrapInfo {
                peer_id: "stale".into(),
                addresses: vec![],
                rendezvous: String::new(),
                protocol: String::new(),
                version: String::new(),
                last_seen: Utc::now() - chrono::Duration::hours(25),
            },
        );
        save_cache(dir.path(), &entries);

        let loaded = load_cache(dir.path());
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("fresh"));
    }

    #[test]
    fn missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cache(dir.path()).is_empty());
    }

    #[test]
    fn info_deserializes_without_last_seen() {
        let json = r#"{"peer_id":"12D3","addresses":["/ip4/1.2.3.4/tcp/4001"],
                       "rendezvous":"gazette-news-network","protocol":"/gazette","version":"0.1.0"}"#;
        let info: BootstrapInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.last_seen, unix_epoch());
    }
}
