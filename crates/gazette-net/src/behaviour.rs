//! Composed libp2p `NetworkBehaviour` for Gazette nodes.
//!
//! Combines GossipSub (article/feed pub-sub), Kademlia (rendezvous
//! discovery), Identify, Relay client + DCUtR (NAT traversal), UPnP port
//! mapping, an optional Relay server (bootstrap role), and the pull-sync
//! request/response protocol.

use libp2p::{
    dcutr, gossipsub, identify,
    kad::{self, store::MemoryStore},
    relay, request_response,
    swarm::behaviour::toggle::Toggle,
    swarm::NetworkBehaviour,
    upnp,
};

use crate::sync::{SyncCodec, SyncRequest, SyncResponse};

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "GazetteEvent")]
pub struct GazetteBehaviour {
    /// Pub/sub for article, feed, vote and moderation topics
    pub gossipsub: gossipsub::Behaviour,
    /// DHT for rendezvous-based peer discovery
    pub kademlia: kad::Behaviour<MemoryStore>,
    /// Protocol identification and address exchange
    pub identify: identify::Behaviour,
    /// Circuit relay v2 client for NAT traversal
    pub relay_client: relay::client::Behaviour,
    /// Relay server, enabled on bootstrap-advertiser nodes
    pub relay_server: Toggle<relay::Behaviour>,
    /// Direct connection upgrade through relay
    pub dcutr: dcutr::Behaviour,
    /// NAT port-mapping attempts
    pub upnp: upnp::tokio::Behaviour,
    /// Pull-sync request/response streams
    pub sync: request_response::Behaviour<SyncCodec>,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum GazetteEvent {
    Gossipsub(gossipsub::Event),
    Kademlia(kad::Event),
    Identify(Box<identify::Event>),
    RelayClient(relay::client::Event),
    RelayServer(relay::Event),
    Dcutr(dcutr::Event),
    Upnp(upnp::Event),
    Sync(request_response::Event<SyncRequest, SyncResponse>),
}

impl From<gossipsub::Event> for GazetteEvent {
    fn from(event: gossipsub::Event) -> Self {
        GazetteEvent::Gossipsub(event)
    }
}

impl From<kad::Event> for GazetteEvent {
    fn from(event: kad::Event) -> Self {
        GazetteEvent::Kademlia(event)
    }
}

impl From<identify::Event> for GazetteEvent {
    fn from(event: identify::Event) -> Self {
        GazetteEvent::Identify(Box::new(event))
    }
}

impl From<relay::client::Event> for GazetteEvent {
    fn from(event: relay::client::Event) -> Self {
        GazetteEvent::RelayClient(event)
    }
}

impl From<relay::Event> for GazetteEvent {
    fn from(event: relay::Event) -> Self {
        GazetteEvent::RelayServer(event)
    }
}

impl From<dcutr::Event> for GazetteEvent {
    fn from(event: dcutr::Event) -> Self {
        GazetteEvent::Dcutr(event)
    }
}

impl From<upnp::Event> for GazetteEvent {
    fn from(event: upnp::Event) -> Self {
        GazetteEvent::Upnp(event)
    }
}

impl From<request_response::Event<SyncRequest, SyncResponse>> for GazetteEvent {
    fn from(event: request_response::Event<SyncRequest, SyncResponse>) -> Self {
        GazetteEvent::Sync(event)
    }
}
