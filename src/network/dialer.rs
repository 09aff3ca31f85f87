//! Dialer: keeps one outbound link alive per subscribed peer
//!
//! One task per subscribed peer. For peers this node dials, failed attempts
//! back off exponentially with a bounded interval and are retried until
//! shutdown. The backoff only resets once a link has stayed up for a full
//! `max_backoff` interval.
//!
//! For peers expected to dial in, the task stays idle while they do. A peer
//! that does not list this node never dials it (a late joiner), so after a
//! grace period without an inbound link this side dials instead. Should both
//! ends connect at once, the registry keeps the newest link.

use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::config::NetworkConfig;
use super::coordinator::Session;
use super::handshake::{exchange_identity, verify_dialed};
use super::link::{LinkDirection, PeerLink};
use super::subscription::{dial_role, DialRole, PeerDescriptor};

/// How long the listening side of a pair waits for an inbound link before
/// dialing itself: two full backoff intervals of the dialing side plus a
/// connect attempt
pub(crate) fn dial_in_grace(config: &NetworkConfig) -> Duration {
    config.max_backoff * 2 + config.connect_timeout
}

/// Link upkeep for one subscribed peer; exits when the session shuts down
pub(crate) async fn dial_loop(session: Arc<Session>, peer: PeerDescriptor) {
    let address = peer.dial_address(session.listen_port);
    let max_interval = session.config.max_backoff;
    let role = dial_role(&session.local_id, &peer.identity);
    let grace = dial_in_grace(&session.config);

    let mut backoff = ExponentialBackoff {
        initial_interval: session.config.initial_backoff,
        max_interval,
        max_elapsed_time: None, // Retry forever
        ..Default::default()
    };

    debug!(peer = %peer.identity, addr = %address, role = ?role, "Dialer started");

    while !session.shutdown.is_cancelled() {
        // A live link (ours or one the peer opened) means there is nothing to do
        if let Some(link) = session.registry.get(&peer.identity) {
            if !link.is_closed() {
                tokio::select! {
                    _ = session.shutdown.cancelled() => break,
                    _ = link.closed() => {}
                }

                // Links that die young (e.g. the peer drops us right after the
                // handshake) keep backing off instead of redialing in a tight loop.
                if link.age() >= max_interval {
                    backoff.reset();
                    debug!(peer = %peer.identity, "Link lost, redialing");
                } else {
                    let delay = backoff.next_backoff().unwrap_or(max_interval);
                    debug!(
                        peer = %peer.identity,
                        retry_in_ms = delay.as_millis() as u64,
                        "Short-lived link lost, backing off"
                    );
                    tokio::select! {
                        _ = session.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                continue;
            }
        }

        if role == DialRole::Listen {
            tokio::select! {
                _ = session.shutdown.cancelled() => break,
                _ = tokio::time::sleep(grace) => {}
            }
            if session.registry.get(&peer.identity).is_some_and(|link| !link.is_closed()) {
                continue;
            }
            debug!(peer = %peer.identity, "Peer has not dialed in, dialing it instead");
        }

        let attempt = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            attempt = connect_once(&session, &peer, &address) => attempt,
        };

        match attempt {
            Ok(link) => {
                debug!(peer = %peer.identity, link_id = link.id(), "Dial succeeded");
            }
            Err(e) => {
                session.stats.record_dial_failure();
                let delay = backoff.next_backoff().unwrap_or(max_interval);
                debug!(
                    peer = %peer.identity,
                    addr = %address,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Dial attempt failed"
                );

                tokio::select! {
                    _ = session.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!(peer = %peer.identity, "Dialer stopped");
}

/// One connect + handshake attempt
async fn connect_once(session: &Session, peer: &PeerDescriptor, address: &str) -> Result<Arc<PeerLink>> {
    let timeout = session.config.connect_timeout;
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| Error::ConnectTimeout {
            addr: address.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| Error::from_connect(address, e))?;

    let remote_addr = stream.peer_addr()?;

    let announced = exchange_identity(
        &mut stream,
        &session.local_id,
        session.config.handshake_timeout,
        address,
    )
    .await?;
    verify_dialed(&peer.identity, &announced)?;

    info!(peer = %peer.identity, addr = %remote_addr, "Peer handshake complete (outbound)");
    Ok(session.attach(announced, remote_addr, LinkDirection::Outbound, stream))
}
