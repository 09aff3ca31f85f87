//! Peer link: one live socket to one peer identity
//!
//! A link owns a bounded outbound queue drained by its writer, and a reader
//! that forwards every decoded payload into the shared incoming channel.
//! Any read/write error, EOF or decode error closes the link; once both
//! halves have stopped it removes itself from the registry.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::stats::NetworkStats;

use super::frame::{read_frame, write_frame};
use super::registry::LinkRegistry;
use super::subscription::PeerId;

/// Process-unique link number, used to tell a replaced link from its successor
pub type LinkId = u64;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Which side opened the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkDirection::Inbound => write!(f, "inbound"),
            LinkDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Link lifecycle: `Connecting → Established → Draining → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Established,
    Draining,
    Closed,
}

/// Handle to one peer connection
pub struct PeerLink {
    id: LinkId,
    identity: PeerId,
    remote_addr: SocketAddr,
    direction: LinkDirection,
    created_at: Instant,
    state: Mutex<LinkState>,
    outbound: mpsc::Sender<Bytes>,
    /// Stops the reader and starts draining the writer
    cancel: CancellationToken,
    /// Fires once both halves have stopped
    closed: CancellationToken,
}

impl PeerLink {
    /// Create a link in the `Connecting` state.
    ///
    /// Returns the shared handle and the receiving end of its outbound
    /// queue, which the writer consumes once the link is spawned. The link's
    /// cancellation is a child of `parent`, so session shutdown reaches it.
    pub fn new(
        identity: impl Into<PeerId>,
        remote_addr: SocketAddr,
        direction: LinkDirection,
        queue_capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (outbound, outbound_rx) = mpsc::channel(queue_capacity.max(1));
        let link = Arc::new(Self {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            identity: identity.into(),
            remote_addr,
            direction,
            created_at: Instant::now(),
            state: Mutex::new(LinkState::Connecting),
            outbound,
            cancel: parent.child_token(),
            closed: CancellationToken::new(),
        });
        (link, outbound_rx)
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Time since the link was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// True while the link accepts payloads
    pub fn is_live(&self) -> bool {
        matches!(self.state(), LinkState::Connecting | LinkState::Established)
            && !self.cancel.is_cancelled()
    }

    /// Enqueue a payload for the writer without waiting.
    ///
    /// Fails with `LinkQueueFull` when the peer is not keeping up and with
    /// `LinkClosed` once the link is draining or gone.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        if !self.is_live() {
            return Err(Error::LinkClosed {
                peer: self.identity.clone(),
            });
        }
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::LinkQueueFull {
                peer: self.identity.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => Error::LinkClosed {
                peer: self.identity.clone(),
            },
        })
    }

    /// Begin closing: the reader stops and the writer flushes what it can
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, LinkState::Connecting | LinkState::Established) {
                *state = LinkState::Draining;
            }
        }
        self.cancel.cancel();
    }

    /// Wait until both halves of the link have stopped
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn set_state(&self, next: LinkState) {
        *self.state.lock() = next;
    }
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("remote_addr", &self.remote_addr)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Link tasks
// ─────────────────────────────────────────────────────────────────

/// Everything a running link needs besides its socket
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub registry: Arc<LinkRegistry>,
    pub stats: Arc<NetworkStats>,
    /// `None` when inbound payloads are discarded (send-only sessions)
    pub incoming: Option<mpsc::Sender<Bytes>>,
    pub max_frame_size: u32,
    pub drain_timeout: Duration,
}

/// Drive an established link until it fails or is closed.
///
/// The link must already be in the registry. On exit the link is `Closed`,
/// removed from the registry unless a newer link replaced it, and its
/// `closed()` waiters are released.
pub(crate) async fn run_link(
    link: Arc<PeerLink>,
    outbound_rx: mpsc::Receiver<Bytes>,
    stream: TcpStream,
    ctx: LinkContext,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %link.identity, error = %e, "Failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();

    link.set_state(LinkState::Established);
    ctx.stats.record_link_established();
    info!(
        peer = %link.identity,
        addr = %link.remote_addr,
        direction = %link.direction,
        link_id = link.id,
        "Link established"
    );

    tokio::join!(
        read_loop(&link, read_half, &ctx),
        write_loop(&link, write_half, outbound_rx, &ctx),
    );

    link.set_state(LinkState::Closed);
    let removed = ctx.registry.remove_if(&link.identity, link.id);
    ctx.stats.record_link_closed();
    info!(
        peer = %link.identity,
        link_id = link.id,
        removed,
        "Link closed"
    );
    link.closed.cancel();
}

/// Reads frames and forwards payloads until EOF, error or cancellation
async fn read_loop(link: &PeerLink, mut reader: OwnedReadHalf, ctx: &LinkContext) {
    let mut delivering = ctx.incoming.is_some();

    loop {
        let frame = tokio::select! {
            _ = link.cancel.cancelled() => break,
            frame = read_frame(&mut reader, ctx.max_frame_size) => frame,
        };

        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(peer = %link.identity, "Peer closed the connection");
                break;
            }
            Err(e) => {
                debug!(peer = %link.identity, error = %e, "Peer read error");
                break;
            }
        };
        ctx.stats.record_received(payload.len());

        if !delivering {
            continue;
        }
        if let Some(incoming) = &ctx.incoming {
            tokio::select! {
                _ = link.cancel.cancelled() => break,
                sent = incoming.send(payload) => {
                    if sent.is_err() {
                        debug!(peer = %link.identity, "Incoming channel closed, discarding payloads");
                        delivering = false;
                    }
                }
            }
        }
    }

    link.close();
}

/// Writes queued payloads; on close, flushes what is queued within the drain timeout.
///
/// A write blocked on a peer that stopped reading still observes cancellation:
/// the frame in flight gets the drain window to finish, then the link is dropped.
async fn write_loop(
    link: &PeerLink,
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    ctx: &LinkContext,
) {
    let mut drain_deadline = None;

    loop {
        let next = tokio::select! {
            biased;
            payload = outbound_rx.recv() => payload,
            _ = link.cancel.cancelled() => break,
        };
        let Some(payload) = next else { break };

        let write = write_frame(&mut writer, &payload, ctx.max_frame_size);
        tokio::pin!(write);
        let written = tokio::select! {
            written = &mut write => written,
            _ = link.cancel.cancelled() => {
                // Finish the frame in flight so the drain starts on a frame boundary
                let deadline = tokio::time::Instant::now() + ctx.drain_timeout;
                drain_deadline = Some(deadline);
                match tokio::time::timeout_at(deadline, &mut write).await {
                    Ok(written) => written,
                    Err(_) => {
                        debug!(peer = %link.identity, "Peer stalled mid-frame, dropping link");
                        link.close();
                        return;
                    }
                }
            }
        };

        if let Err(e) = written {
            debug!(peer = %link.identity, error = %e, "Peer write error");
            link.close();
            return;
        }
        ctx.stats.record_sent(payload.len());

        if drain_deadline.is_some() {
            break;
        }
    }

    outbound_rx.close();
    let deadline = drain_deadline.unwrap_or_else(|| tokio::time::Instant::now() + ctx.drain_timeout);
    let drain = async {
        while let Some(payload) = outbound_rx.recv().await {
            if write_frame(&mut writer, &payload, ctx.max_frame_size).await.is_err() {
                break;
            }
            ctx.stats.record_sent(payload.len());
        }
        let _ = writer.shutdown().await;
    };
    if tokio::time::timeout_at(deadline, drain).await.is_err() {
        debug!(peer = %link.identity, "Drain timed out, dropping queued frames");
    }
    link.close();
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
