//! Identity handshake
//!
//! Immediately after connect each side sends its identity (UTF-8) as one
//! length-prefixed frame, then reads the other side's. Both sides write
//! before reading, so neither waits on the other.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

use super::frame::{read_frame, write_frame};
use super::subscription::{PeerId, Subscription};

/// Longest identity accepted during the handshake
pub const MAX_IDENTITY_LEN: u32 = 1024;

/// Send `local_id` and read the peer's identity, bounded by `timeout`.
///
/// `addr` is only used for error reporting.
pub async fn exchange_identity<S>(
    stream: &mut S,
    local_id: &str,
    timeout: Duration,
    addr: &str,
) -> Result<PeerId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        write_frame(stream, local_id.as_bytes(), MAX_IDENTITY_LEN).await?;
        match read_frame(stream, MAX_IDENTITY_LEN).await? {
            Some(raw) => parse_identity(&raw),
            None => Err(Error::handshake_rejected(
                None,
                "connection closed before the peer sent its identity",
            )),
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::HandshakeTimeout {
            addr: addr.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
}

fn parse_identity(raw: &[u8]) -> Result<PeerId> {
    let identity = std::str::from_utf8(raw)
        .map_err(|_| Error::handshake_rejected(None, "identity is not valid UTF-8"))?;
    if identity.is_empty() {
        return Err(Error::handshake_rejected(None, "empty identity"));
    }
    Ok(identity.to_string())
}

/// Dialer side: the answering peer must be the one we meant to reach
pub fn verify_dialed(expected: &str, announced: &str) -> Result<()> {
    if expected != announced {
        return Err(Error::handshake_rejected(
            Some(announced.to_string()),
            format!("expected peer '{}'", expected),
        ));
    }
    Ok(())
}

/// Listener side: decide whether an announced identity may join
pub fn admit_inbound(
    subscription: &Subscription,
    announced: &str,
    listen_for_late_joiners: bool,
) -> Result<()> {
    if announced == subscription.local_id() {
        return Err(Error::handshake_rejected(
            Some(announced.to_string()),
            "peer announced our own identity",
        ));
    }
    if !subscription.contains(announced) && !listen_for_late_joiners {
        return Err(Error::handshake_rejected(
            Some(announced.to_string()),
            "identity is not in the subscription list",
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
