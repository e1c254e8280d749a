//! Swarm orchestration: the libp2p event loop runs in a dedicated tokio
//! task, and the rest of the node talks to it through typed command and
//! notification channels.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad,
    multiaddr::Protocol,
    relay, request_response,
    swarm::SwarmEvent,
    Multiaddr, PeerId,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use gazette_shared::constants::{
    ADVERTISE_INTERVAL_SECS, CONN_GRACE_SECS, DEFAULT_P2P_PORT, FIND_PEERS_INTERVAL_SECS,
    MAX_CONNECTIONS, RENDEZVOUS,
};

use crate::behaviour::GazetteEvent;
use crate::peers::PeerTracker;
use crate::stats::NetworkStats;
use crate::sync::{SyncRequest, SyncResponse};
use crate::transport::{build_swarm, TransportOpts};

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial a remote peer at the given multiaddr.
    Dial(Multiaddr),
    /// Record a known address for a peer in the routing table.
    AddAddress { peer: PeerId, addr: Multiaddr },
    /// Join a GossipSub topic (idempotent).
    JoinTopic(String),
    /// Publish on a joined topic. Fails if the node never joined it.
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Snapshot of currently connected peers.
    GetPeers(oneshot::Sender<Vec<PeerId>>),
    /// Current listen/external addresses, fully qualified with /p2p.
    GetListenAddrs(oneshot::Sender<Vec<Multiaddr>>),
    /// Connection details for the HTTP status surface.
    GetConnections(oneshot::Sender<Vec<PeerConnection>>),
    /// Open a pull-sync stream to a peer and await its response.
    SyncRequest {
        peer: PeerId,
        request: SyncRequest,
        reply: oneshot::Sender<Result<SyncResponse, String>>,
    },
    /// Answer an inbound pull-sync request.
    SyncRespond {
        channel: request_response::ResponseChannel<SyncResponse>,
        response: SyncResponse,
    },
    /// Gracefully shut down the swarm task.
    Shutdown,
}

/// Notifications sent *from* the swarm task to the application.
#[derive(Debug)]
pub enum SwarmNotification {
    PeerConnected {
        peer_id: PeerId,
        address: Multiaddr,
    },
    PeerDisconnected {
        peer_id: PeerId,
    },
    /// A GossipSub message passed strict signature validation.
    Message {
        source: Option<PeerId>,
        topic: String,
        data: Vec<u8>,
    },
    /// An inbound pull-sync request awaiting a `SyncRespond` command.
    SyncRequestReceived {
        peer: PeerId,
        request: SyncRequest,
        channel: request_response::ResponseChannel<SyncResponse>,
    },
    RelayReservation {
        relay_peer: PeerId,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerConnection {
    pub peer_id: String,
    pub addresses: Vec<String>,
}

pub struct SwarmConfig {
    pub listen_port: u16,
    /// Run the relay server behaviour (bootstrap role).
    pub relay_server: bool,
    pub rendezvous: String,
    /// Multiaddrs dialed on startup.
    pub bootstrap_addrs: Vec<Multiaddr>,
    pub max_connections: usize,
    pub conn_grace: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_P2P_PORT,
            relay_server: false,
            rendezvous: RENDEZVOUS.to_string(),
            bootstrap_addrs: Vec::new(),
            max_connections: MAX_CONNECTIONS,
            conn_grace: Duration::from_secs(CONN_GRACE_SECS),
        }
    }
}

/// Cloneable handle over the swarm command channel.
#[derive(Clone)]
pub struct SwarmHandle {
    tx: mpsc::Sender<SwarmCommand>,
}

impl SwarmHandle {
    pub async fn dial(&self, addr: Multiaddr) -> anyhow::Result<()> {
        self.send(SwarmCommand::Dial(addr)).await
    }

    pub async fn add_address(&self, peer: PeerId, addr: Multiaddr) -> anyhow::Result<()> {
        self.send(SwarmCommand::AddAddress { peer, addr }).await
    }

    pub async fn join_topic(&self, topic: &str) -> anyhow::Result<()> {
        self.send(SwarmCommand::JoinTopic(topic.to_string())).await
    }

    /// Publish bytes on a topic; errors if the topic was never joined or
    /// the mesh rejected the message.
    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::Publish {
            topic: topic.to_string(),
            data,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| anyhow::anyhow!("swarm task gone"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    pub async fn peers(&self) -> anyhow::Result<Vec<PeerId>> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::GetPeers(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn listen_addrs(&self) -> anyhow::Result<Vec<Multiaddr>> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::GetListenAddrs(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn connections(&self) -> anyhow::Result<Vec<PeerConnection>> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::GetConnections(reply)).await?;
        Ok(rx.await?)
    }

    /// Issue a pull-sync request; resolves when the peer responds, the
    /// request times out, or the stream fails.
    pub async fn sync_request(
        &self,
        peer: PeerId,
        request: SyncRequest,
    ) -> anyhow::Result<SyncResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(SwarmCommand::SyncRequest {
            peer,
            request,
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| anyhow::anyhow!("swarm task gone"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    pub async fn sync_respond(
        &self,
        channel: request_response::ResponseChannel<SyncResponse>,
        response: SyncResponse,
    ) -> anyhow::Result<()> {
        self.send(SwarmCommand::SyncRespond { channel, response }).await
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(SwarmCommand::Shutdown).await
    }

    async fn send(&self, cmd: SwarmCommand) -> anyhow::Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("swarm command channel closed"))
    }
}

/// Spawn the libp2p swarm in a background tokio task.
///
/// Returns the command handle, the notification receiver and the local
/// `PeerId`.
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
    stats: Arc<NetworkStats>,
) -> anyhow::Result<(SwarmHandle, mpsc::Receiver<SwarmNotification>, PeerId)> {
    let mut swarm = build_swarm(
        keypair,
        TransportOpts {
            relay_server: config.relay_server,
        },
    )?;
    let local_peer_id = *swarm.local_peer_id();

    // TCP and QUIC listeners on IPv4 and IPv6.
    for addr in [
        format!("/ip4/0.0.0.0/tcp/{}", config.listen_port),
        format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port),
        format!("/ip6/::/tcp/{}", config.listen_port),
        format!("/ip6/::/udp/{}/quic-v1", config.listen_port),
    ] {
        let addr: Multiaddr = addr.parse().expect("static multiaddr");
        if let Err(e) = swarm.listen_on(addr.clone()) {
            warn!(addr = %addr, error = %e, "failed to listen");
        }
    }

    info!(peer_id = %local_peer_id, port = config.listen_port, "swarm listening");

    // Dial the configured bootstrap set in parallel (dials are async; we
    // only enqueue them here) and seed the routing table.
    for addr in &config.bootstrap_addrs {
        if let Some(peer_id) = crate::discovery::extract_peer_id(addr) {
            swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer_id, addr.clone());
        }
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(addr = %addr, error = %e, "failed to dial bootstrap peer");
        } else {
            debug!(addr = %addr, "dialing bootstrap peer");
        }
    }
    if !config.bootstrap_addrs.is_empty() {
        if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
            warn!(error = %e, "kademlia bootstrap failed to start");
        }
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwarmCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SwarmNotification>(256);

    let rendezvous_key = kad::RecordKey::new(&config.rendezvous);
    let max_connections = config.max_connections;
    let conn_grace = config.conn_grace;

    tokio::spawn(async move {
        let mut tracker = PeerTracker::new();
        let mut joined_topics: HashSet<String> = HashSet::new();
        let mut pending_syncs: HashMap<
            request_response::OutboundRequestId,
            oneshot::Sender<Result<SyncResponse, String>>,
        > = HashMap::new();

        let mut advertise_tick =
            tokio::time::interval(Duration::from_secs(ADVERTISE_INTERVAL_SECS));
        let mut find_tick = tokio::time::interval(Duration::from_secs(FIND_PEERS_INTERVAL_SECS));

        loop {
            tokio::select! {
                // --- Periodic rendezvous advertisement ---
                _ = advertise_tick.tick() => {
                    if let Err(e) = swarm
                        .behaviour_mut()
                        .kademlia
                        .start_providing(rendezvous_key.clone())
                    {
                        debug!(error = %e, "rendezvous advertise failed");
                    }

                    let known: usize = swarm
                        .behaviour_mut()
                        .kademlia
                        .kbuckets()
                        .map(|bucket| bucket.num_entries())
                        .sum();
                    stats.set_peers_discovered(known as u64);

                    // Enforce the connection band: evict least-recently-seen
                    // peers that are past their grace period.
                    for peer in tracker.eviction_candidates(max_connections, conn_grace) {
                        debug!(peer = %peer, "evicting peer, over connection limit");
                        let _ = swarm.disconnect_peer_id(peer);
                    }
                }

                // --- Periodic rendezvous lookup ---
                _ = find_tick.tick() => {
                    swarm
                        .behaviour_mut()
                        .kademlia
                        .get_providers(rendezvous_key.clone());
                }

                // --- Incoming commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial(addr)) => {
                            if let Some(peer_id) = crate::discovery::extract_peer_id(&addr) {
                                if tracker.is_connected(&peer_id) {
                                    continue;
                                }
                                swarm
                                    .behaviour_mut()
                                    .kademlia
                                    .add_address(&peer_id, addr.clone());
                            }
                            if let Err(e) = swarm.dial(addr.clone()) {
                                debug!(addr = %addr, error = %e, "dial failed");
                            }
                        }
                        Some(SwarmCommand::AddAddress { peer, addr }) => {
                            swarm.behaviour_mut().kademlia.add_address(&peer, addr);
                        }
                        Some(SwarmCommand::JoinTopic(topic)) => {
                            let ident = gossipsub::IdentTopic::new(&topic);
                            match swarm.behaviour_mut().gossipsub.subscribe(&ident) {
                                Ok(_) => {
                                    joined_topics.insert(topic.clone());
                                    info!(topic = %topic, "joined topic");
                                }
                                Err(e) => error!(topic = %topic, error = %e, "subscribe failed"),
                            }
                        }
                        Some(SwarmCommand::Publish { topic, data, reply }) => {
                            let result = if !joined_topics.contains(&topic) {
                                Err(format!("not joined to topic: {topic}"))
                            } else {
                                let ident = gossipsub::IdentTopic::new(&topic);
                                match swarm.behaviour_mut().gossipsub.publish(ident, data) {
                                    Ok(_) => Ok(()),
                                    // Re-publishing identical bytes is fine.
                                    Err(gossipsub::PublishError::Duplicate) => Ok(()),
                                    Err(e) => Err(format!("publish failed: {e}")),
                                }
                            };
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::GetPeers(reply)) => {
                            let _ = reply.send(tracker.connected_peers());
                        }
                        Some(SwarmCommand::GetListenAddrs(reply)) => {
                            let mut addrs: Vec<Multiaddr> = swarm
                                .listeners()
                                .chain(swarm.external_addresses())
                                .cloned()
                                .map(|addr| addr.with(Protocol::P2p(local_peer_id)))
                                .collect();
                            addrs.dedup();
                            let _ = reply.send(addrs);
                        }
                        Some(SwarmCommand::GetConnections(reply)) => {
                            let conns = tracker
                                .all_connections()
                                .into_iter()
                                .map(|info| PeerConnection {
                                    peer_id: info.peer_id.to_string(),
                                    addresses: vec![info.address.to_string()],
                                })
                                .collect();
                            let _ = reply.send(conns);
                        }
                        Some(SwarmCommand::SyncRequest { peer, request, reply }) => {
                            let request_id = swarm
                                .behaviour_mut()
                                .sync
                                .send_request(&peer, request);
                            pending_syncs.insert(request_id, reply);
                        }
                        Some(SwarmCommand::SyncRespond { channel, response }) => {
                            if swarm
                                .behaviour_mut()
                                .sync
                                .send_response(channel, response)
                                .is_err()
                            {
                                debug!("sync response channel already closed");
                            }
                        }
                        Some(SwarmCommand::Shutdown) => {
                            info!("swarm shutdown requested");
                            break;
                        }
                        None => {
                            info!("command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                // --- Swarm events ---
                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(GazetteEvent::Gossipsub(
                            gossipsub::Event::Message {
                                propagation_source,
                                message_id: _,
                                message,
                            },
                        )) => {
                            tracker.touch(&propagation_source);
                            // Never deliver our own republished messages
                            // back up to handlers.
                            if message.source == Some(local_peer_id) {
                                continue;
                            }
                            let topic = message.topic.to_string();
                            debug!(
                                topic = %topic,
                                source = ?message.source,
                                len = message.data.len(),
                                "gossip message received"
                            );
                            let _ = notif_tx
                                .send(SwarmNotification::Message {
                                    source: message.source,
                                    topic,
                                    data: message.data,
                                })
                                .await;
                        }

                        SwarmEvent::Behaviour(GazetteEvent::Kademlia(
                            kad::Event::OutboundQueryProgressed { result, .. },
                        )) => {
                            if let kad::QueryResult::GetProviders(Ok(
                                kad::GetProvidersOk::FoundProviders { providers, .. },
                            )) = result
                            {
                                for peer in providers {
                                    if peer == local_peer_id || tracker.is_connected(&peer) {
                                        continue;
                                    }
                                    debug!(peer = %peer, "dialing discovered provider");
                                    if let Err(e) = swarm.dial(peer) {
                                        debug!(peer = %peer, error = %e, "provider dial failed");
                                    }
                                }
                            }
                        }

                        SwarmEvent::Behaviour(GazetteEvent::Identify(event)) => {
                            if let identify::Event::Received { peer_id, info, .. } = *event {
                                tracker.touch(&peer_id);
                                debug!(
                                    peer = %peer_id,
                                    protocol = %info.protocol_version,
                                    "identify: received info"
                                );
                                for addr in &info.listen_addrs {
                                    swarm
                                        .behaviour_mut()
                                        .kademlia
                                        .add_address(&peer_id, addr.clone());
                                }
                            }
                        }

                        SwarmEvent::Behaviour(GazetteEvent::RelayClient(
                            relay::client::Event::ReservationReqAccepted {
                                relay_peer_id, ..
                            },
                        )) => {
                            info!(relay = %relay_peer_id, "relay reservation accepted");
                            let _ = notif_tx
                                .send(SwarmNotification::RelayReservation {
                                    relay_peer: relay_peer_id,
                                })
                                .await;
                        }

                        SwarmEvent::Behaviour(GazetteEvent::Sync(event)) => {
                            handle_sync_event(
                                event,
                                &mut tracker,
                                &mut pending_syncs,
                                &notif_tx,
                            )
                            .await;
                        }

                        SwarmEvent::Behaviour(GazetteEvent::Upnp(event)) => {
                            debug!(event = ?event, "upnp event");
                        }

                        SwarmEvent::Behaviour(GazetteEvent::Dcutr(event)) => {
                            debug!(event = ?event, "dcutr event");
                        }

                        SwarmEvent::Behaviour(GazetteEvent::RelayServer(event)) => {
                            debug!(event = ?event, "relay server event");
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                            let addr = endpoint.get_remote_address().clone();
                            let relayed =
                                addr.iter().any(|p| matches!(p, Protocol::P2pCircuit));
                            tracker.on_connected(peer_id, addr.clone(), relayed);
                            stats.connection_opened();

                            info!(peer = %peer_id, addr = %addr, relayed, "peer connected");
                            let _ = notif_tx
                                .send(SwarmNotification::PeerConnected {
                                    peer_id,
                                    address: addr,
                                })
                                .await;
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            if num_established == 0 {
                                tracker.on_disconnected(&peer_id);
                                stats.connection_closed();
                                info!(peer = %peer_id, "peer disconnected");
                                let _ = notif_tx
                                    .send(SwarmNotification::PeerDisconnected { peer_id })
                                    .await;
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "listening on new address");
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            debug!(peer = ?peer_id, error = %error, "outgoing connection error");
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            debug!(error = %error, "incoming connection error");
                        }

                        _ => {}
                    }
                }
            }
        }

        info!("swarm event loop terminated");
    });

    Ok((SwarmHandle { tx: cmd_tx }, notif_rx, local_peer_id))
}

async fn handle_sync_event(
    event: request_response::Event<SyncRequest, SyncResponse>,
    tracker: &mut PeerTracker,
    pending: &mut HashMap<
        request_response::OutboundRequestId,
        oneshot::Sender<Result<SyncResponse, String>>,
    >,
    notif_tx: &mpsc::Sender<SwarmNotification>,
) {
    match event {
        request_response::Event::Message { peer, message, .. } => match message {
            request_response::Message::Request { request, channel, .. } => {
                tracker.touch(&peer);
                debug!(peer = %peer, since = request.since, "inbound sync request");
                let _ = notif_tx
                    .send(SwarmNotification::SyncRequestReceived {
                        peer,
                        request,
                        channel,
                    })
                    .await;
            }
            request_response::Message::Response { request_id, response } => {
                tracker.touch(&peer);
                if let Some(reply) = pending.remove(&request_id) {
                    let _ = reply.send(Ok(response));
                }
            }
        },
        request_response::Event::OutboundFailure { peer, request_id, error, .. } => {
            debug!(peer = %peer, error = %error, "sync request failed");
            if let Some(reply) = pending.remove(&request_id) {
                let _ = reply.send(Err(error.to_string()));
            }
        }
        request_response::Event::InboundFailure { peer, error, .. } => {
            // EOF mid-stream is a normal cancel from the requester.
            debug!(peer = %peer, error = %error, "inbound sync stream ended");
        }
        request_response::Event::ResponseSent { peer, .. } => {
            debug!(peer = %peer, "sync response sent");
        }
    }
}
