//! Connection statistics, scoped to the component that owns them.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub struct NetworkStats {
    started_at: DateTime<Utc>,
    started_instant: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicI64,
    peers_discovered: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub start_time: DateTime<Utc>,
    pub uptime_secs: u64,
    pub total_connections: u64,
    pub active_connections: i64,
    pub peers_discovered: u64,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started_instant: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            peers_discovered: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Clamp at zero: close events can race a restart of the counter.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some((n - 1).max(0))
            });
    }

    pub fn set_peers_discovered(&self, count: u64) {
        self.peers_discovered.store(count, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            start_time: self.started_at,
            uptime_secs: self.started_instant.elapsed().as_secs(),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            peers_discovered: self.peers_discovered.load(Ordering::Relaxed),
        }
    }
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self::new()
    }
}
