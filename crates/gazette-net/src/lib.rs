// P2P overlay for the Gazette network, built on libp2p with TCP and QUIC
// transports, Kademlia discovery and strict-signed GossipSub.

pub mod behaviour;
pub mod discovery;
pub mod envelope;
pub mod keys;
pub mod peers;
pub mod stats;
pub mod swarm;
pub mod sync;
pub mod transport;

pub use behaviour::{GazetteBehaviour, GazetteEvent};
pub use discovery::{extract_peer_id, parse_multiaddrs, AutoDiscovery, BootstrapInfo};
pub use envelope::{ArticleEnvelope, EnvelopeKind, FeedEnvelope, ModerationMessage, VoteMessage};
pub use keys::load_or_generate_keypair;
pub use peers::{ConnectionInfo, PeerTracker};
pub use stats::NetworkStats;
pub use swarm::{
    spawn_swarm, PeerConnection, SwarmCommand, SwarmConfig, SwarmHandle, SwarmNotification,
};
pub use sync::{SyncRequest, SyncResponse, MAX_SYNC};
