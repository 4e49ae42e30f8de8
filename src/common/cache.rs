//! Small TTL cache used by the fetcher, feature computer and enricher
//!
//! Freshness, not footprint, is the binding constraint for all of the
//! pipeline's caches, so eviction is strictly by TTL on access.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// HashMap-backed cache where entries expire after a fixed TTL
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Get a live entry, dropping it if the TTL has lapsed
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns the number of live entries left
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        self.entries.len()
    }

    /// Clone out every live entry, purging expired ones first
    pub fn live_entries(&mut self) -> Vec<(K, V)> {
        self.purge_expired();
        self.entries
            .iter()
            .map(|(k, (_, v))| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
