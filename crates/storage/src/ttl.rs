//! TTL index for expiration cleanup
//!
//! Maps expiry instant → set of keys so expired keys can be found without
//! scanning the whole keyspace. Reads still check expiry lazily; the index
//! only drives bulk purges.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// TTL index: expiry instant → keys
#[derive(Debug, Default)]
pub struct TtlIndex {
    index: BTreeMap<Instant, HashSet<String>>,
}

impl TtlIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key` as expiring at `at`
    pub fn insert(&mut self, at: Instant, key: String) {
        self.index.entry(at).or_default().insert(key);
    }

    /// Stop tracking `key` at `at`
    ///
    /// Called when a key is deleted, persisted or given a new expiry.
    pub fn remove(&mut self, at: Instant, key: &str) {
        if let Some(keys) = self.index.get_mut(&at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&at);
            }
        }
    }

    /// Remove and return every key that expired at or before `now`
    pub fn drain_expired(&mut self, now: Instant) -> Vec<String> {
        let later = self.index.split_off(&now);
        let expired = std::mem::replace(&mut self.index, later);
        let mut keys: Vec<String> = expired.into_values().flatten().collect();
        // split_off keeps `now` itself on the right side
        if let Some(at_now) = self.index.remove(&now) {
            keys.extend(at_now);
        }
        keys
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total number of tracked keys
    pub fn len(&self) -> usize {
        self.index.values().map(HashSet::len).sum()
    }
}
