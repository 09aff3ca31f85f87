//! Subscription list and dial-role policy
//!
//! The subscription is the static set of peers a node must be linked to.
//! Who dials whom is a pure function of the two identities, so both ends
//! agree without a negotiation round-trip.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque name of a worker, unique within one cluster
pub type PeerId = String;

/// One entry of the subscription list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Identity the peer announces during the handshake
    pub identity: PeerId,

    /// `host:port`, `[v6]:port`, or a bare host (IPv4, IPv6 or name) that
    /// then uses the local listening port
    pub address: String,
}

impl PeerDescriptor {
    pub fn new(identity: impl Into<PeerId>, address: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            address: address.into(),
        }
    }

    /// Address to dial, appending `default_port` when the entry has none
    pub fn dial_address(&self, default_port: u16) -> String {
        if has_port(&self.address) {
            self.address.clone()
        } else if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.address, default_port)
        } else {
            format!("{}:{}", self.address, default_port)
        }
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.address)
    }
}

fn has_port(address: &str) -> bool {
    // Bracketed IPv6 ("[::1]:9000") or host:port with exactly one colon.
    if let Some(rest) = address.strip_prefix('[') {
        return rest.contains("]:");
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Which side opens the TCP connection for a pair of identities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialRole {
    /// The local node dials the peer
    Dial,
    /// The local node waits for the peer to dial in
    Listen,
}

/// The lexicographically smaller identity dials, the larger one listens
pub fn dial_role(local: &str, remote: &str) -> DialRole {
    if local < remote {
        DialRole::Dial
    } else {
        DialRole::Listen
    }
}

/// Validated, immutable subscription list for one network session
#[derive(Debug, Clone)]
pub struct Subscription {
    local_id: PeerId,
    peers: Vec<PeerDescriptor>,
}

impl Subscription {
    /// Build a subscription, dropping the local node's own entry.
    ///
    /// Clusters commonly hand every node the same full list, so an entry
    /// matching `local_id` is expected and silently skipped.
    pub fn new(local_id: &str, peers: &[PeerDescriptor]) -> Result<Self> {
        if local_id.is_empty() {
            return Err(Error::config_field_invalid("node.id", "local identity cannot be empty"));
        }

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(peers.len());
        for peer in peers {
            if peer.identity.is_empty() {
                return Err(Error::config_field_invalid(
                    "peers.identity",
                    format!("peer with address '{}' has an empty identity", peer.address),
                ));
            }
            if peer.address.is_empty() {
                return Err(Error::config_field_invalid(
                    "peers.address",
                    format!("peer '{}' has an empty address", peer.identity),
                ));
            }
            if !seen.insert(peer.identity.as_str()) {
                return Err(Error::config_field_invalid(
                    "peers.identity",
                    format!("duplicate peer identity '{}'", peer.identity),
                ));
            }
            if peer.identity != local_id {
                kept.push(peer.clone());
            }
        }

        Ok(Self {
            local_id: local_id.to_string(),
            peers: kept,
        })
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Remote peers in subscription order
    pub fn peers(&self) -> &[PeerDescriptor] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.peers.iter().any(|p| p.identity == identity)
    }

    /// Peers this node is responsible for dialing
    pub fn dial_targets(&self) -> impl Iterator<Item = &PeerDescriptor> {
        self.peers
            .iter()
            .filter(move |p| dial_role(&self.local_id, &p.identity) == DialRole::Dial)
    }

    /// Peers expected to dial this node
    pub fn expected_inbound(&self) -> impl Iterator<Item = &PeerDescriptor> {
        self.peers
            .iter()
            .filter(move |p| dial_role(&self.local_id, &p.identity) == DialRole::Listen)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
