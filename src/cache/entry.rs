//! Cached response entries with TTL support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached chat response with its sources and bookkeeping metadata
///
/// Immutable once stored except for `usage_count`, which is incremented on
/// every hit. Each cache tier owns its own copy; entries are never shared
/// mutably across tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// The generated answer text
    pub response: String,

    /// Source documents the answer cites
    pub sources: Vec<String>,

    /// When the entry was stored
    pub timestamp: DateTime<Utc>,

    /// When the entry expires (TTL with jitter applied at store time)
    pub expires_at: DateTime<Utc>,

    /// Exact-tier key the entry was stored under
    pub query_key: String,

    /// TF-IDF vector in the semantic tier's fitted space, if indexed there
    pub embedding: Option<Vec<f32>>,

    /// Number of cache hits served from this entry
    pub usage_count: u64,

    /// Fingerprint of the conversation context at store time
    pub context_digest: String,
}

impl CachedResponse {
    /// Create a new entry expiring after `ttl`
    pub fn new(
        response: String,
        sources: Vec<String>,
        query_key: String,
        context_digest: String,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(3600));

        Self {
            response,
            sources,
            timestamp: now,
            expires_at,
            query_key,
            embedding: None,
            usage_count: 0,
            context_digest,
        }
    }

    /// Check if the entry has outlived its TTL
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Record a hit against this entry
    pub fn mark_used(&mut self) {
        self.usage_count += 1;
    }

    /// Age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn entry(ttl: Duration) -> CachedResponse {
        CachedResponse::new(
            "a long enough answer".to_string(),
            vec!["doc.md".to_string()],
            "key123".to_string(),
            "ctx456".to_string(),
            ttl,
        )
    }

    #[test]
    fn test_entry_creation() {
        let e = entry(Duration::from_secs(3600));
        assert!(!e.is_expired());
        assert_eq!(e.usage_count, 0);
        assert!(e.embedding.is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let e = entry(Duration::from_millis(20));
        assert!(!e.is_expired());
        sleep(Duration::from_millis(40));
        assert!(e.is_expired());
    }

    #[test]
    fn test_mark_used() {
        let mut e = entry(Duration::from_secs(60));
        e.mark_used();
        e.mark_used();
        assert_eq!(e.usage_count, 2);
    }

    #[test]
    fn test_age() {
        let e = entry(Duration::from_secs(60));
        sleep(Duration::from_millis(10));
        assert!(e.age() >= Duration::from_millis(10));
    }
}
