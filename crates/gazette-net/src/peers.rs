use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::{Multiaddr, PeerId};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_id: PeerId,
    pub address: Multiaddr,
    pub relayed: bool,
    pub connected_at: Instant,
    pub last_seen: Instant,
}

/// Tracks live connections for the swarm task: who is connected, through
/// what address, and which peers are eviction candidates when the node is
/// over its connection band.
#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    peers: HashMap<PeerId, ConnectionInfo>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected(&mut self, peer_id: PeerId, address: Multiaddr, relayed: bool) {
        let now = Instant::now();
        debug!(peer = %peer_id, addr = %address, relayed, "tracking peer connection");
        self.peers.insert(
            peer_id,
            ConnectionInfo {
                peer_id,
                address,
                relayed,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    pub fn on_disconnected(&mut self, peer_id: &PeerId) {
        if self.peers.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "removed peer from tracker");
        }
    }

    /// Record activity from a peer (gossip message, sync request, identify).
    pub fn touch(&mut self, peer_id: &PeerId) {
        if let Some(info) = self.peers.get_mut(peer_id) {
            info.last_seen = Instant::now();
        }
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn all_connections(&self) -> Vec<ConnectionInfo> {
        self.peers.values().cloned().collect()
    }

    /// Peers to disconnect to get back inside `max` connections: the
    /// least-recently-seen peers whose connection is out of its grace
    /// period. Recently established connections are never evicted.
    pub fn eviction_candidates(&self, max: usize, grace: Duration) -> Vec<PeerId> {
        if self.peers.len() <= max {
            return Vec::new();
        }
        let now = Instant::now();
        let mut evictable: Vec<&ConnectionInfo> = self
            .peers
            .values()
            .filter(|info| now.duration_since(info.connected_at) >= grace)
            .collect();
        evictable.sort_by_key(|info| info.last_seen);

        let excess = self.peers.len() - max;
        evictable
            .into_iter()
            .take(excess)
            .map(|info| info.peer_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Multiaddr {
        "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn connect_disconnect() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();

        assert!(!tracker.is_connected(&peer));
        tracker.on_connected(peer, addr(), false);
        assert!(tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 1);

        tracker.on_disconnected(&peer);
        assert!(!tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 0);
    }

    #[test]
    fn no_eviction_within_band() {
        let mut tracker = PeerTracker::new();
        for _ in 0..5 {
            tracker.on_connected(PeerId::random(), addr(), false);
        }
        assert!(tracker.eviction_candidates(5, Duration::ZERO).is_empty());
        assert!(tracker.eviction_candidates(10, Duration::ZERO).is_empty());
    }

    #[test]
    fn evicts_least_recently_seen_first() {
        let mut tracker = PeerTracker::new();
        let stale = PeerId::random();
        let busy = PeerId::random();
        tracker.on_connected(stale, addr(), false);
        tracker.on_connected(busy, addr(), false);
        tracker.on_connected(PeerId::random(), addr(), false);
        tracker.touch(&busy);

        let victims = tracker.eviction_candidates(2, Duration::ZERO);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0], stale);
    }

    #[test]
    fn grace_period_protects_new_connections() {
        let mut tracker = PeerTracker::new();
        for _ in 0..3 {
            tracker.on_connected(PeerId::random(), addr(), false);
        }
        // Everything was connected "just now", so a one-minute grace
        // period shields every candidate.
        assert!(tracker
            .eviction_candidates(1, Duration::from_secs(60))
            .is_empty());
    }
}
