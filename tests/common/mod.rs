//! Common test utilities and fixtures
//!
//! Localhost clusters with short timeouts, plus config fixtures.

#![allow(dead_code)]

use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use tmsn::network::{start_network_with_config, NetworkConfig, NetworkHandle, PeerDescriptor};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Ask the OS for a port that is free right now
pub fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Tunables for fast localhost tests
pub fn test_config() -> NetworkConfig {
    NetworkConfig {
        bind_host: "127.0.0.1".to_string(),
        connect_timeout: Duration::from_secs(1),
        handshake_timeout: Duration::from_secs(1),
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(300),
        drain_timeout: Duration::from_millis(200),
        ..NetworkConfig::default()
    }
}

/// One identity per port, all on 127.0.0.1
pub fn cluster(ids: &[&str]) -> Vec<(PeerDescriptor, u16)> {
    ids.iter()
        .map(|id| {
            let port = free_port();
            (PeerDescriptor::new(*id, format!("127.0.0.1:{}", port)), port)
        })
        .collect()
}

pub fn descriptors(cluster: &[(PeerDescriptor, u16)]) -> Vec<PeerDescriptor> {
    cluster.iter().map(|(d, _)| d.clone()).collect()
}

/// A running node together with the application ends of its channels
pub struct TestNode {
    pub handle: NetworkHandle,
    pub incoming: mpsc::Receiver<Bytes>,
    pub outgoing: mpsc::Sender<Bytes>,
}

impl TestNode {
    pub async fn start(id: &str, peers: &[PeerDescriptor], port: u16) -> Self {
        Self::start_with(id, peers, port, false, test_config()).await
    }

    pub async fn start_with(
        id: &str,
        peers: &[PeerDescriptor],
        port: u16,
        late_joiners: bool,
        config: NetworkConfig,
    ) -> Self {
        let (incoming_tx, incoming) = mpsc::channel(1024);
        let (outgoing, outgoing_rx) = mpsc::channel(1024);
        let handle = start_network_with_config(id, peers, port, late_joiners, incoming_tx, outgoing_rx, config)
            .await
            .expect("node should start");
        Self { handle, incoming, outgoing }
    }

    pub async fn broadcast(&self, payload: &'static [u8]) {
        self.outgoing
            .send(Bytes::from_static(payload))
            .await
            .expect("outgoing channel open");
    }

    pub async fn recv(&mut self, within: Duration) -> Option<Bytes> {
        tokio::time::timeout(within, self.incoming.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn wait_for_links(&self, n: usize) -> bool {
        self.handle.wait_for_links(n, Duration::from_secs(10)).await
    }
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually<F: Fn() -> bool>(within: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
