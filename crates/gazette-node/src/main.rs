use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gazette_net::{
    load_or_generate_keypair, parse_multiaddrs, spawn_swarm, AutoDiscovery, NetworkStats,
    SwarmConfig,
};
use gazette_store::{open_stores, BlobStore, FsDagStore, StoreMode};

use gazette_node::{
    ArticleService, Broadcaster, Dispatcher, FeedService, MemoryIndexer, NodeConfig, SyncLoop,
    UserService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gazette_node=debug")),
        )
        .init();

    info!("starting gazette node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    info!(?config, "loaded configuration");

    std::fs::create_dir_all(&config.data_dir)?;

    // Storage: repositories (backend chosen by config) and the local
    // content-addressed blob store.
    let mode: StoreMode = config.store_mode.parse()?;
    let stores = open_stores(mode, &config.data_dir)?;
    let dag = Arc::new(FsDagStore::open(config.data_dir.join("blobs")).await?);
    let blobs = BlobStore::new(dag, config.pin_articles);
    if !blobs.healthy().await {
        anyhow::bail!("blob store is not healthy");
    }

    // Node identity.
    let keypair = load_or_generate_keypair(&config.data_dir.join("node.key"))?;
    let local_peer_id = keypair.public().to_peer_id();

    let indexer = Arc::new(MemoryIndexer::new());
    let user_service = Arc::new(UserService::new(stores.users.clone()));
    let node_user = user_service.ensure_node_user(&local_peer_id.to_string())?;
    info!(user_id = %node_user.id, username = %node_user.username, "node author active");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut swarm_handle = None;

    if config.p2p_enabled {
        let stats = Arc::new(NetworkStats::new());
        let swarm_config = SwarmConfig {
            listen_port: config.p2p_port,
            relay_server: config.relay_server,
            bootstrap_addrs: parse_multiaddrs(&config.bootstrap_peers),
            ..Default::default()
        };
        let (handle, notifications, peer_id) =
            spawn_swarm(keypair.clone(), swarm_config, stats).await?;
        info!(peer_id = %peer_id, "overlay started");

        let broadcaster = Broadcaster::new(handle.clone(), keypair.clone());
        broadcaster.join_topics().await?;

        let pipeline = Arc::new(ArticleService::new(
            stores.articles.clone(),
            stores.users.clone(),
            blobs.clone(),
            indexer.clone(),
            Some(broadcaster.clone()),
            peer_id.to_string(),
        ));

        // Inbound dispatch: gossip messages and pull-sync requests.
        let dispatcher = Dispatcher::new(handle.clone(), pipeline.clone());
        tokio::spawn(dispatcher.run(notifications, shutdown_rx.clone()));

        // Pull-sync client loop.
        let sync_loop = SyncLoop::new(
            handle.clone(),
            pipeline.clone(),
            Duration::from_secs(config.sync_interval_secs),
        );
        tokio::spawn(sync_loop.run(shutdown_rx.clone()));

        // Bootstrap auto-discovery.
        let discovery = Arc::new(AutoDiscovery::new(
            handle.clone(),
            config.data_dir.clone(),
            config.bootstrap_urls.clone(),
        ));
        for addr in parse_multiaddrs(&config.bootstrap_peers) {
            discovery.add_bootstrap_peer(&addr).await;
        }
        let discovery_shutdown = shutdown_rx.clone();
        tokio::spawn(async move { discovery.run(discovery_shutdown).await });

        // Feed publisher.
        let feed_service = Arc::new(FeedService::new(
            stores.feeds.clone(),
            stores.articles.clone(),
            blobs.clone(),
            keypair.clone(),
            Some(broadcaster),
        ));
        tokio::spawn(feed_service.run_publisher(
            Duration::from_secs(config.feed_check_interval_secs),
            shutdown_rx.clone(),
        ));

        swarm_handle = Some(handle);
    } else {
        info!("p2p disabled, running standalone");

        let feed_service = Arc::new(FeedService::new(
            stores.feeds.clone(),
            stores.articles.clone(),
            blobs.clone(),
            keypair.clone(),
            None,
        ));
        tokio::spawn(feed_service.run_publisher(
            Duration::from_secs(config.feed_check_interval_secs),
            shutdown_rx.clone(),
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");

    // Signal every long-lived task and give the overlay a bounded window
    // to close cleanly.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = swarm_handle {
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "swarm shutdown failed");
        }
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    info!("gazette node stopped");
    Ok(())
}
