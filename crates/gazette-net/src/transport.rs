use libp2p::identity::Keypair;
use tracing::info;

/// Behaviour-level options chosen by the node role.
#[derive(Debug, Clone, Default)]
pub struct TransportOpts {
    /// Accept acting as a relay for peers that cannot be dialed directly.
    pub relay_server: bool,
}

pub fn build_swarm(
    keypair: Keypair,
    opts: TransportOpts,
) -> anyhow::Result<libp2p::Swarm<super::behaviour::GazetteBehaviour>> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::Duration;

    use libp2p::gossipsub::{self, MessageAuthenticity, MessageId, ValidationMode};
    use libp2p::kad::{self, store::MemoryStore};
    use libp2p::swarm::behaviour::toggle::Toggle;
    use libp2p::{
        dcutr, identify, noise, relay, request_response, tcp, upnp, StreamProtocol, SwarmBuilder,
    };

    use gazette_shared::constants::{
        DHT_PROTOCOL, GOSSIPSUB_DUPLICATE_CACHE_SECS, GOSSIPSUB_HEARTBEAT_SECS, MAX_MESSAGE_SIZE,
        PROTOCOL_VERSION, SYNC_REQUEST_TIMEOUT_SECS,
    };

    use crate::sync::{SyncCodec, SyncProtocol};

    let relay_server_enabled = opts.relay_server;

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            libp2p::yamux::Config::default,
        )?
        .with_quic()
        .with_relay_client(noise::Config::new, libp2p::yamux::Config::default)?
        .with_behaviour(|key, relay_client| -> std::result::Result<super::behaviour::GazetteBehaviour, Box<dyn std::error::Error + Send + Sync>> {
            let local_peer_id = key.public().to_peer_id();

            let message_id_fn = |message: &gossipsub::Message| {
                let mut hasher = DefaultHasher::new();
                message.data.hash(&mut hasher);
                if let Some(ref source) = message.source {
                    source.hash(&mut hasher);
                }
                MessageId::from(hasher.finish().to_string())
            };

            // Strict signing: the bus drops unsigned or mis-signed messages
            // before they reach any handler. Flood publish keeps latency
            // low on small networks; the duplicate cache bounds re-delivery.
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
                .validation_mode(ValidationMode::Strict)
                .flood_publish(true)
                .duplicate_cache_time(Duration::from_secs(GOSSIPSUB_DUPLICATE_CACHE_SECS))
                .max_transmit_size(MAX_MESSAGE_SIZE)
                .message_id_fn(message_id_fn)
                .build()
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                    format!("GossipSub config: {e}").into()
                })?;

            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                format!("GossipSub init: {e}").into()
            })?;

            let store = MemoryStore::new(local_peer_id);
            let mut kad_config = kad::Config::default();
            kad_config.set_protocol_names(vec![StreamProtocol::new(DHT_PROTOCOL)]);
            let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
            kademlia.set_mode(Some(kad::Mode::Server));

            let identify_config =
                identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                    .with_push_listen_addr_updates(true)
                    .with_interval(Duration::from_secs(60));
            let identify = identify::Behaviour::new(identify_config);

            let relay_server = Toggle::from(relay_server_enabled.then(|| {
                relay::Behaviour::new(local_peer_id, relay::Config::default())
            }));

            let dcutr = dcutr::Behaviour::new(local_peer_id);

            let sync = request_response::Behaviour::new(
                [(SyncProtocol, request_response::ProtocolSupport::Full)],
                request_response::Config::default()
                    .with_request_timeout(Duration::from_secs(SYNC_REQUEST_TIMEOUT_SECS)),
            );

            Ok(super::behaviour::GazetteBehaviour {
                gossipsub,
                kademlia,
                identify,
                relay_client,
                relay_server,
                dcutr,
                upnp: upnp::tokio::Behaviour::default(),
                sync,
            })
        })?
        .with_swarm_config(|cfg| {
            cfg.with_idle_connection_timeout(Duration::from_secs(60))
        })
        .build();

    info!(
        peer_id = %swarm.local_peer_id(),
        relay_server = relay_server_enabled,
        "built swarm with TCP + QUIC transports"
    );

    Ok(swarm)
}
