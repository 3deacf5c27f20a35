//! Exact-match cache tier
//!
//! Bounded map from the full request-signature digest to a cached answer.
//! Eviction removes the single oldest-timestamp entry when the cap is
//! exceeded. A hit bumps `usage_count` but does not refresh the timestamp,
//! so this is deliberately not strict LRU.

use std::collections::HashMap;

use tracing::debug;

use super::entry::CachedResponse;

pub struct ExactCache {
    entries: HashMap<String, CachedResponse>,
    max_entries: usize,
}

impl ExactCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    /// Look up by key. Expired entries are purged and count as misses.
    pub fn get(&mut self, key: &str) -> Option<CachedResponse> {
        match self.entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                debug!("exact tier entry expired: {}", key);
                self.entries.remove(key);
                None
            }
            Some(entry) => {
                entry.mark_used();
                Some(entry.clone())
            }
            None => None,
        }
    }

    /// Insert an entry, evicting the oldest one if the cap is exceeded.
    /// Re-inserting an existing key replaces the previous response.
    pub fn insert(&mut self, key: String, entry: CachedResponse) {
        self.entries.insert(key, entry);

        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(k, _)| k.clone());

            match oldest {
                Some(key) => {
                    debug!("exact tier evicting oldest entry: {}", key);
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop all expired entries, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired());
        before - self.entries.len()
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
