//! Listener: accepts inbound connections until shutdown
//!
//! Each accepted socket gets its own task for the handshake, so one slow
//! or hostile peer never stalls the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::coordinator::Session;
use super::handshake::{admit_inbound, exchange_identity};
use super::link::LinkDirection;

/// Accept loop; exits when the session shuts down
pub(crate) async fn accept_loop(session: Arc<Session>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!(peer_addr = %peer_addr, "Incoming peer connection");
                let s = Arc::clone(&session);
                session.tracker.spawn(async move {
                    if let Err(e) = handle_inbound(&s, stream, peer_addr).await {
                        match &e {
                            Error::HandshakeRejected { .. } => {
                                s.stats.record_rejected_handshake();
                                warn!(peer_addr = %peer_addr, error = %e, "Rejected inbound handshake");
                            }
                            _ => debug!(peer_addr = %peer_addr, error = %e, "Inbound connection failed"),
                        }
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
                tokio::select! {
                    _ = session.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }
        }
    }

    info!("Listener stopped");
}

/// Exchange identities with an inbound peer and register its link
async fn handle_inbound(session: &Session, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
    let peer_label = peer_addr.to_string();
    let identity = tokio::select! {
        _ = session.shutdown.cancelled() => return Ok(()),
        identity = exchange_identity(
            &mut stream,
            &session.local_id,
            session.config.handshake_timeout,
            &peer_label,
        ) => identity?,
    };

    admit_inbound(&session.subscription, &identity, session.listen_for_late_joiners)?;
    if !session.subscription.contains(&identity) {
        info!(peer = %identity, peer_addr = %peer_addr, "Accepted late joiner");
    }

    session.attach(identity, peer_addr, LinkDirection::Inbound, stream);
    Ok(())
}
