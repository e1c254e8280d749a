/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/gazette/1.0.0";

/// Kademlia DHT protocol name (namespaced so we never mix with the public DHT)
pub const DHT_PROTOCOL: &str = "/gazette/kad/1.0.0";

/// Rendezvous string peers advertise and look up to find each other
pub const RENDEZVOUS: &str = "gazette-news-network";

/// Pull-sync stream protocol
pub const SYNC_PROTOCOL: &str = "/gazette/sync/1.0.0";

/// GossipSub topics
pub const TOPIC_ARTICLES: &str = "gazette/articles/v1";
pub const TOPIC_FEEDS: &str = "gazette/feeds/v1";
pub const TOPIC_VOTES: &str = "gazette/votes/v1";
pub const TOPIC_MODERATION: &str = "gazette/moderation/v1";

/// Ed25519 key sizes in bytes
pub const PUBKEY_SIZE: usize = 32;
pub const SECRET_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

/// Keystore: AES-256-GCM with PBKDF2-HMAC-SHA256
pub const KEYSTORE_SALT_SIZE: usize = 16;
pub const KEYSTORE_NONCE_SIZE: usize = 12;
pub const KEYSTORE_KEY_SIZE: usize = 32;
pub const KEYSTORE_PBKDF2_ITERATIONS: u32 = 100_000;
/// Leading format byte of an encrypted private key. Anything else is
/// rejected at load time (kills the legacy plaintext-base64 key format).
pub const KEYSTORE_FORMAT_V1: u8 = 0x01;

/// Maximum gossip message size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Seen-message cache lifetime for gossip dedup, in seconds
pub const GOSSIPSUB_DUPLICATE_CACHE_SECS: u64 = 300;

/// Maximum articles returned by a single pull-sync response
pub const MAX_SYNC_ARTICLES: usize = 50;

/// Pull-sync client interval in seconds
pub const SYNC_INTERVAL_SECS: u64 = 30;

/// Per-peer pull-sync timeout in seconds
pub const SYNC_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Deadline for answering an inbound pull-sync request, in seconds
pub const SYNC_RESPOND_TIMEOUT_SECS: u64 = 10;

/// How far back the very first pull-sync reaches, in seconds (24h)
pub const SYNC_INITIAL_LOOKBACK_SECS: i64 = 24 * 60 * 60;

/// DHT advertise interval in seconds
pub const ADVERTISE_INTERVAL_SECS: u64 = 30;

/// DHT provider lookup interval in seconds
pub const FIND_PEERS_INTERVAL_SECS: u64 = 15;

/// Bootstrap HTTP discovery poll interval in seconds
pub const BOOTSTRAP_CHECK_INTERVAL_SECS: u64 = 30;

/// Bootstrap HTTP probe timeout in seconds
pub const BOOTSTRAP_PROBE_TIMEOUT_SECS: u64 = 10;

/// Bootstrap cache entries older than this are discarded on load (24h)
pub const BOOTSTRAP_CACHE_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Peer floor below which the node re-dials its known bootstrap set
pub const MIN_DESIRED_PEERS: usize = 3;

/// Connection-manager band and grace period
pub const MIN_CONNECTIONS: usize = 100;
pub const MAX_CONNECTIONS: usize = 600;
pub const CONN_GRACE_SECS: u64 = 60;

/// Default listen port for the overlay
pub const DEFAULT_P2P_PORT: u16 = 4001;

/// Bootstrap-advertiser defaults
pub const DEFAULT_BOOTSTRAP_HTTP_PORT: u16 = 8081;

/// Blob store operation timeouts in seconds
pub const BLOB_OP_TIMEOUT_SECS: u64 = 5;
pub const BLOB_CAT_TIMEOUT_SECS: u64 = 60;

/// Articles included in a published feed manifest, at most
pub const FEED_MANIFEST_MAX_ARTICLES: usize = 100;

/// Feed manifest schema version
pub const FEED_MANIFEST_VERSION: &str = "1.0";

/// Article validation limits
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 50;
pub const MAX_FEED_NAME_LEN: usize = 50;

/// Closed category set; the empty string is also accepted.
pub const ALLOWED_CATEGORIES: &[&str] = &[
    "news",
    "technology",
    "science",
    "politics",
    "business",
    "sports",
    "health",
    "entertainment",
    "opinion",
    "world",
    "local",
    "environment",
    "culture",
    "other",
];
