//! Broadcast coordinator: wires listener, dialers and the registry together
//!
//! `start_network` binds the listening port (failing synchronously if it
//! cannot), then runs the accept loop, one dial loop per subscribed peer and a
//! fan-out loop that copies every outgoing payload to each live link.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::stats::{NetworkStats, StatsSnapshot};

use super::config::NetworkConfig;
use super::dialer::dial_loop;
use super::link::{run_link, LinkContext, LinkDirection, PeerLink};
use super::listener::accept_loop;
use super::registry::LinkRegistry;
use super::subscription::{PeerDescriptor, PeerId, Subscription};

// ─────────────────────────────────────────────────────────────────
// Session state shared by every task
// ─────────────────────────────────────────────────────────────────

pub(crate) struct Session {
    pub local_id: PeerId,
    pub subscription: Subscription,
    pub config: NetworkConfig,
    pub listen_port: u16,
    pub listen_for_late_joiners: bool,
    pub registry: Arc<LinkRegistry>,
    pub stats: Arc<NetworkStats>,
    pub link_ctx: LinkContext,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
}

impl Session {
    /// Register a freshly handshaken connection and start its tasks.
    ///
    /// The link enters the registry before its tasks run, so an immediate
    /// failure can always find and remove it.
    pub fn attach(
        &self,
        identity: PeerId,
        remote_addr: SocketAddr,
        direction: LinkDirection,
        stream: TcpStream,
    ) -> Arc<PeerLink> {
        let (link, outbound_rx) = PeerLink::new(
            identity,
            remote_addr,
            direction,
            self.config.outbound_queue_capacity,
            &self.shutdown,
        );
        self.registry.register(Arc::clone(&link));
        self.tracker.spawn(run_link(
            Arc::clone(&link),
            outbound_rx,
            stream,
            self.link_ctx.clone(),
        ));
        link
    }
}

// ─────────────────────────────────────────────────────────────────
// Entry points
// ─────────────────────────────────────────────────────────────────

/// Start a network session with default tunables.
///
/// Payloads received from any peer are pushed into `incoming`; every payload
/// read from `outgoing` is broadcast to all live links. Fails only if the
/// listening port cannot be bound.
pub async fn start_network(
    local_id: &str,
    subscription: &[PeerDescriptor],
    port: u16,
    listen_for_late_joiners: bool,
    incoming: mpsc::Sender<Bytes>,
    outgoing: mpsc::Receiver<Bytes>,
) -> Result<NetworkHandle> {
    start_network_with_config(
        local_id,
        subscription,
        port,
        listen_for_late_joiners,
        incoming,
        outgoing,
        NetworkConfig::default(),
    )
    .await
}

/// Start a network session with explicit tunables
pub async fn start_network_with_config(
    local_id: &str,
    subscription: &[PeerDescriptor],
    port: u16,
    listen_for_late_joiners: bool,
    incoming: mpsc::Sender<Bytes>,
    outgoing: mpsc::Receiver<Bytes>,
    config: NetworkConfig,
) -> Result<NetworkHandle> {
    let subscription = Subscription::new(local_id, subscription)?;
    if config.max_frame_size == 0 {
        return Err(Error::config_field_invalid("network.max_frame_size", "must be > 0"));
    }

    let bind_addr = format!("{}:{}", config.bind_host, port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| Error::Bind {
        addr: bind_addr.clone(),
        source: e,
    })?;
    let local_addr = listener.local_addr()?;
    // Bare-host peers share the port we actually listen on
    let listen_port = local_addr.port();

    info!(
        node = %local_id,
        addr = %local_addr,
        peers = subscription.len(),
        late_joiners = listen_for_late_joiners,
        "Network listening"
    );

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let registry = Arc::new(LinkRegistry::new());
    let stats = Arc::new(NetworkStats::new());

    let link_ctx = LinkContext {
        registry: Arc::clone(&registry),
        stats: Arc::clone(&stats),
        incoming: config.direction.receives().then_some(incoming),
        max_frame_size: config.max_frame_size,
        drain_timeout: config.drain_timeout,
    };

    let peers: Vec<PeerDescriptor> = subscription.peers().to_vec();
    let session = Arc::new(Session {
        local_id: local_id.to_string(),
        subscription,
        config,
        listen_port,
        listen_for_late_joiners,
        registry: Arc::clone(&registry),
        stats: Arc::clone(&stats),
        link_ctx,
        shutdown: shutdown.clone(),
        tracker: tracker.clone(),
    });

    tracker.spawn(accept_loop(Arc::clone(&session), listener));

    // Listen-role peers get a loop too; it only dials if they never dial in
    for peer in peers {
        tracker.spawn(dial_loop(Arc::clone(&session), peer));
    }

    if session.config.direction.sends() {
        tracker.spawn(fan_out_loop(Arc::clone(&session), outgoing));
    } else {
        debug!("Receive-only session, outgoing channel is not drained");
        // Hold the receiver so application sends neither fail nor get delivered
        let idle = shutdown.clone();
        tracker.spawn(async move {
            let _outgoing = outgoing;
            idle.cancelled().await;
        });
    }

    Ok(NetworkHandle {
        local_id: local_id.to_string(),
        local_addr,
        registry,
        stats,
        shutdown,
        tracker,
        session: Some(session),
    })
}

/// Copies each outgoing payload to a snapshot of the live links.
///
/// A peer whose queue is full misses that payload; the others are not held up.
async fn fan_out_loop(session: Arc<Session>, mut outgoing: mpsc::Receiver<Bytes>) {
    loop {
        let payload = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            payload = outgoing.recv() => match payload {
                Some(payload) => payload,
                None => {
                    debug!("Outgoing channel closed, fan-out stopped");
                    break;
                }
            },
        };

        session.stats.record_broadcast();
        let links = session.registry.snapshot();
        let mut reached = 0usize;

        for link in &links {
            match link.send(payload.clone()) {
                Ok(()) => reached += 1,
                Err(Error::LinkQueueFull { peer }) => {
                    session.stats.record_dropped();
                    warn!(peer = %peer, size = payload.len(), "Outbound queue full, dropping payload for slow peer");
                }
                Err(e) => debug!(peer = %link.identity(), error = %e, "Skipping link"),
            }
        }

        debug!(size = payload.len(), peers = reached, links = links.len(), "Broadcast");
    }
}

// ─────────────────────────────────────────────────────────────────
// Network handle
// ─────────────────────────────────────────────────────────────────

/// Control surface of a running session.
///
/// Dropping the handle without calling [`NetworkHandle::shutdown`] still
/// signals every task to stop, but does not wait for them.
pub struct NetworkHandle {
    local_id: PeerId,
    local_addr: SocketAddr,
    registry: Arc<LinkRegistry>,
    stats: Arc<NetworkStats>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    session: Option<Arc<Session>>,
}

impl NetworkHandle {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Address the listener is bound to (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identities with a registered link, sorted
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.registry.identities()
    }

    pub fn link_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Token that is cancelled when the session shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait until at least `n` links are registered.
    ///
    /// Returns `false` if `timeout` elapses or the session shuts down first.
    pub async fn wait_for_links(&self, n: usize, timeout: Duration) -> bool {
        let poll = async {
            loop {
                if self.registry.len() >= n {
                    return true;
                }
                tokio::select! {
                    _ = self.shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(Duration::from_millis(20)) => {}
                }
            }
        };
        tokio::time::timeout(timeout, poll).await.unwrap_or(false)
    }

    /// Stop every task, close all links and wait for them to finish.
    ///
    /// Afterwards the incoming channel is closed: the application's receiver
    /// drains what was delivered and then yields `None`.
    pub async fn shutdown(mut self) {
        info!(node = %self.local_id, "Shutting down network");
        self.shutdown.cancel();
        self.registry.close_all();
        self.session.take();

        self.tracker.close();
        self.tracker.wait().await;
        info!(node = %self.local_id, "Network stopped");
    }
}

impl Drop for NetworkHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_with_empty_subscription() {
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (_out_tx, out_rx) = mpsc::channel(4);

        let handle = start_network("solo", &[], 0, false, in_tx, out_rx).await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        assert_eq!(handle.link_count(), 0);
        assert!(handle.connected_peers().is_empty());

        handle.shutdown().await;
        assert!(in_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_links_times_out() {
        let (in_tx, _in_rx) = mpsc::channel(4);
        let (_out_tx, out_rx) = mpsc::channel(4);
        let handle = start_network("solo", &[], 0, false, in_tx, out_rx).await.unwrap();

        assert!(handle.wait_for_links(0, Duration::from_millis(10)).await);
        assert!(!handle.wait_for_links(1, Duration::from_millis(50)).await);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_subscription_fails_before_bind() {
        let (in_tx, _in_rx) = mpsc::channel(4);
        let (_out_tx, out_rx) = mpsc::channel(4);
        let peers = vec![PeerDescriptor::new("", "127.0.0.1:1")];
        let err = start_network("x", &peers, 0, false, in_tx, out_rx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[tokio::test]
    async fn test_fan_out_counts_broadcasts_without_links() {
        let (in_tx, _in_rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(4);
        let handle = start_network("solo", &[], 0, false, in_tx, out_rx).await.unwrap();

        out_tx.send(Bytes::from_static(b"nobody")).await.unwrap();
        let mut broadcasts = 0;
        for _ in 0..50 {
            broadcasts = handle.stats().broadcasts;
            if broadcasts == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broadcasts, 1);
        handle.shutdown().await;
    }
}
