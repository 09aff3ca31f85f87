//! Link registry: the live peer links of one session, keyed by identity
//!
//! The only shared mutable structure of a session. Critical sections only
//! touch the map; closing an evicted link happens after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::link::{LinkId, PeerLink};
use super::subscription::PeerId;

/// Thread-safe map of peer identity to its single live link
pub struct LinkRegistry {
    links: RwLock<HashMap<PeerId, Arc<PeerLink>>>,
}

impl LinkRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a link, closing and returning any link it replaces
    pub fn register(&self, link: Arc<PeerLink>) -> Option<Arc<PeerLink>> {
        let previous = self
            .links
            .write()
            .insert(link.identity().to_string(), Arc::clone(&link));

        if let Some(old) = &previous {
            info!(
                peer = %link.identity(),
                old_link = old.id(),
                new_link = link.id(),
                "Replacing existing link"
            );
            old.close();
        }
        previous
    }

    /// Remove and close the link for `identity`, if any. Idempotent.
    pub fn unregister(&self, identity: &str) -> Option<Arc<PeerLink>> {
        let removed = self.links.write().remove(identity);
        if let Some(link) = &removed {
            link.close();
        }
        removed
    }

    /// Remove the entry for `identity` only if it is still the link `id`.
    ///
    /// Used by a terminating link so it never evicts the link that replaced it.
    pub fn remove_if(&self, identity: &str, id: LinkId) -> bool {
        let mut links = self.links.write();
        match links.get(identity) {
            Some(current) if current.id() == id => {
                links.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Get the link registered for `identity`
    pub fn get(&self, identity: &str) -> Option<Arc<PeerLink>> {
        self.links.read().get(identity).cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.links.read().contains_key(identity)
    }

    /// Point-in-time copy of the registered links, ordered by identity
    pub fn snapshot(&self) -> Vec<Arc<PeerLink>> {
        let mut links: Vec<_> = self.links.read().values().cloned().collect();
        links.sort_by(|a, b| a.identity().cmp(b.identity()));
        links
    }

    /// Identities with a registered link, sorted
    pub fn identities(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.links.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    /// Close every link and empty the registry
    pub fn close_all(&self) {
        let drained: Vec<_> = self.links.write().drain().map(|(_, link)| link).collect();
        for link in drained {
            link.close();
        }
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
