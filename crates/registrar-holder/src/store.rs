//! Ordered multi-source store.
//!
//! [`SourceStore`] holds every copy of one entity, at most one per logical
//! feed, in two structures kept in sync:
//!
//! - **Copies** -- an [`IndexMap`] from exact [`SourceIdentity`] to payload,
//!   in write order. Removals go through it so that a superseded
//!   incarnation can never remove its successor's copy.
//! - **Logical index** -- [`SourceKey`] to the identity currently stored
//!   for that feed. Writes go through it so that a reconnecting feed
//!   replaces its previous copy.
//!
//! Re-writing a feed moves its copy to the newest position.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use registrar_types::{Payload, SourceIdentity, SourceKey};

/// Write-ordered store of entity copies, at most one per logical feed.
#[derive(Debug, Clone)]
pub struct SourceStore<P: Payload> {
    /// Exact identity to payload; iteration order is write order.
    copies: IndexMap<SourceIdentity, P>,
    /// Logical key to the exact identity stored for it.
    logical: BTreeMap<SourceKey, SourceIdentity>,
}

impl<P: Payload> Default for SourceStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> SourceStore<P> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            copies: IndexMap::new(),
            logical: BTreeMap::new(),
        }
    }

    /// Store `data` as the newest copy for `source`'s logical feed.
    ///
    /// Any copy already stored under the same logical key is evicted first,
    /// whatever its incarnation id.
    pub fn put(&mut self, source: SourceIdentity, data: P) {
        if let Some(previous) = self.logical.insert(source.key(), source.clone()) {
            self.copies.shift_remove(&previous);
        }
        self.copies.insert(source, data);
    }

    /// Copy stored for `source`'s logical feed, whatever its incarnation.
    pub fn get_matching(&self, source: &SourceIdentity) -> Option<&P> {
        self.logical
            .get(&source.key())
            .and_then(|stored| self.copies.get(stored))
    }

    /// Copy stored under exactly `source`.
    pub fn get_exact(&self, source: &SourceIdentity) -> Option<&P> {
        self.copies.get(source)
    }

    /// Remove the copy stored under exactly `source`.
    ///
    /// A no-op returning `None` if the logical feed is absent or is now
    /// stored under a different incarnation id.
    pub fn remove(&mut self, source: &SourceIdentity) -> Option<P> {
        let data = self.copies.shift_remove(source)?;
        self.logical.remove(&source.key());
        Some(data)
    }

    /// Earliest-written surviving copy.
    pub fn oldest(&self) -> Option<(&SourceIdentity, &P)> {
        self.copies.first()
    }

    /// Number of stored copies.
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    /// Whether no copy is stored.
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// Identities of all stored copies, in write order.
    pub fn sources(&self) -> Vec<SourceIdentity> {
        self.copies.keys().cloned().collect()
    }

    /// Whether the logical index and the copies agree.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.copies.len() == self.logical.len()
            && self.logical.iter().all(|(key, source)| {
                source.key() == *key && self.copies.contains_key(source)
            })
    }
}
