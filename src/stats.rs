//! Traffic counters for one network session
//!
//! Counters are plain atomics updated from link readers, writers, the
//! dialer and the listener; `snapshot` copies them into a serializable value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by every task of a network session
#[derive(Debug, Default)]
pub struct NetworkStats {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    broadcasts: AtomicU64,
    dropped_slow_peer: AtomicU64,
    handshakes_rejected: AtomicU64,
    links_established: AtomicU64,
    links_closed: AtomicU64,
    dial_failures: AtomicU64,
}

/// Point-in-time copy of [`NetworkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Payloads taken from the outgoing channel
    pub broadcasts: u64,
    /// Payloads skipped for a peer whose outbound queue was full
    pub dropped_slow_peer: u64,
    pub handshakes_rejected: u64,
    pub links_established: u64,
    pub links_closed: u64,
    pub dial_failures: u64,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_slow_peer.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_handshake(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_link_established(&self) {
        self.links_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_link_closed(&self) {
        self.links_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_slow_peer: self.dropped_slow_peer.load(Ordering::Relaxed),
            handshakes_rejected: self.handshakes_rejected.load(Ordering::Relaxed),
            links_established: self.links_established.load(Ordering::Relaxed),
            links_closed: self.links_closed.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = NetworkStats::new();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_received(7);
        stats.record_dropped();
        stats.record_link_established();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.bytes_sent, 15);
        assert_eq!(snap.frames_received, 1);
        assert_eq!(snap.bytes_received, 7);
        assert_eq!(snap.dropped_slow_peer, 1);
        assert_eq!(snap.links_established, 1);
        assert_eq!(snap.links_closed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = NetworkStats::new();
        stats.record_rejected_handshake();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"handshakes_rejected\":1"));
    }
}
