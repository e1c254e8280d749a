use std::path::PathBuf;

use gazette_shared::constants::{DEFAULT_P2P_PORT, SYNC_INTERVAL_SECS};

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub p2p_enabled: bool,
    pub p2p_port: u16,
    /// Accept acting as a relay for peers that cannot be dialed directly.
    pub relay_server: bool,
    /// "sqlite" or "kv".
    pub store_mode: String,
    /// Multiaddr strings dialed on start.
    pub bootstrap_peers: Vec<String>,
    /// Bootstrap HTTP surfaces polled by auto-discovery.
    pub bootstrap_urls: Vec<String>,
    pub sync_interval_secs: u64,
    /// How often the feed publisher looks for due feeds.
    pub feed_check_interval_secs: u64,
    pub pin_articles: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            p2p_enabled: true,
            p2p_port: DEFAULT_P2P_PORT,
            relay_server: false,
            store_mode: "sqlite".to_string(),
            bootstrap_peers: Vec::new(),
            bootstrap_urls: Vec::new(),
            sync_interval_secs: SYNC_INTERVAL_SECS,
            feed_check_interval_secs: 60,
            pin_articles: true,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("GAZETTE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(val) = std::env::var("GAZETTE_P2P_ENABLED") {
            config.p2p_enabled = val != "false" && val != "0";
        }
        if let Ok(val) = std::env::var("GAZETTE_P2P_PORT") {
            match val.parse() {
                Ok(port) => config.p2p_port = port,
                Err(_) => tracing::warn!(value = %val, "invalid GAZETTE_P2P_PORT, using default"),
            }
        }
        if let Ok(val) = std::env::var("GAZETTE_RELAY_SERVER") {
            config.relay_server = val == "true" || val == "1";
        }
        if let Ok(mode) = std::env::var("GAZETTE_STORE_MODE") {
            config.store_mode = mode;
        }
        if let Ok(val) = std::env::var("GAZETTE_BOOTSTRAP_PEERS") {
            config.bootstrap_peers = split_list(&val);
        }
        if let Ok(val) = std::env::var("GAZETTE_BOOTSTRAP_URLS") {
            config.bootstrap_urls = split_list(&val);
        }
        if let Ok(val) = std::env::var("GAZETTE_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                config.sync_interval_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("GAZETTE_FEED_CHECK_SECS") {
            if let Ok(secs) = val.parse() {
                config.feed_check_interval_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("GAZETTE_PIN_ARTICLES") {
            config.pin_articles = val != "false" && val != "0";
        }

        config
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = NodeConfig::default();
        assert_eq!(config.p2p_port, DEFAULT_P2P_PORT);
        assert_eq!(config.store_mode, "sqlite");
        assert!(config.p2p_enabled);
    }

    #[test]
    fn split_list_trims_and_drops_empty() {
        let items = split_list(" /ip4/1.2.3.4/tcp/4001 , ,/ip4/5.6.7.8/tcp/4001");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], "/ip4/1.2.3.4/tcp/4001");
    }
}
