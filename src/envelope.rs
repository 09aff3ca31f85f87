//! Attributed payloads on top of the opaque byte channels
//!
//! The network never looks inside payloads, so sender attribution is an
//! application concern. `Envelope` is a ready-made JSON encoding of
//! `(sender, sequence, sent time, body)` for applications that want it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::PeerId;

/// A payload tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Identity of the node that produced the payload
    pub sender: PeerId,

    /// Per-sender sequence number, starting at 0
    pub seq: u64,

    /// Milliseconds since the Unix epoch at encode time
    pub sent_at_ms: u64,

    pub body: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl<T> Envelope<T> {
    /// Time between encoding and now, if the clocks allow it
    pub fn age(&self) -> Option<Duration> {
        let now = unix_millis();
        now.checked_sub(self.sent_at_ms).map(Duration::from_millis)
    }
}

/// Stamps outgoing bodies with the local identity and a rising sequence
#[derive(Debug)]
pub struct EnvelopeEncoder {
    sender: PeerId,
    next_seq: AtomicU64,
}

impl EnvelopeEncoder {
    pub fn new(sender: impl Into<PeerId>) -> Self {
        Self {
            sender: sender.into(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Wrap `body`, consuming the next sequence number
    pub fn wrap<T>(&self, body: T) -> Envelope<T> {
        Envelope {
            sender: self.sender.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            sent_at_ms: unix_millis(),
            body,
        }
    }

    /// Wrap and serialize in one step
    pub fn encode<T: Serialize>(&self, body: T) -> Result<Bytes> {
        self.wrap(body).to_bytes()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_increases_per_encoder() {
        let encoder = EnvelopeEncoder::new("node-a");
        let first = encoder.wrap("x");
        let second = encoder.wrap("y");
        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(second.sender, "node-a");
    }

    #[test]
    fn test_decode_encoded_body() {
        let encoder = EnvelopeEncoder::new("node-a");
        let raw = encoder.encode(vec![1u32, 2, 3]).unwrap();
        let env: Envelope<Vec<u32>> = Envelope::from_bytes(&raw).unwrap();
        assert_eq!(env.body, vec![1, 2, 3]);
        assert_eq!(env.sender, "node-a");
        assert!(env.age().is_some());
    }

    #[test]
    fn test_garbage_is_json_error() {
        let err = Envelope::<String>::from_bytes(b"not json").unwrap_err();
        assert!(matches!(err, crate::error::Error::Json(_)));
    }
}
