//! Multi-level response cache orchestration
//!
//! Composes the exact, popular and semantic tiers behind one
//! `lookup`/`store` contract and tracks hit/miss statistics. Caching is a
//! best-effort accelerator: any internal tier failure is logged and treated
//! as a miss, never surfaced to the request path.

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

use super::entry::CachedResponse;
use super::exact::ExactCache;
use super::key::{context_digest, exact_key, normalize_query};
use super::popular::PopularCache;
use super::semantic::SemanticCache;
use super::types::{CacheCounters, CacheStats, CacheTier};

/// A query/response pair used to preload the cache at startup
#[derive(Debug, Clone)]
pub struct SeedResponse {
    pub query: String,
    pub response: String,
    pub sources: Vec<String>,
}

struct CacheTiers {
    exact: ExactCache,
    semantic: SemanticCache,
    popular: PopularCache,
    counters: CacheCounters,
}

/// The three cache tiers behind a single contract
///
/// Constructed once at process start and handed to the request pipeline;
/// exclusively owns all tier contents.
pub struct ResponseCache {
    config: CacheConfig,
    inner: RwLock<CacheTiers>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "initializing response cache (exact cap {}, semantic cap {}, threshold {})",
            config.max_exact_entries, config.max_semantic_entries, config.similarity_threshold
        );

        let tiers = CacheTiers {
            exact: ExactCache::new(config.max_exact_entries),
            semantic: SemanticCache::new(
                config.similarity_threshold,
                config.max_semantic_entries,
            ),
            popular: PopularCache::new(config.popular_keywords.clone()),
            counters: CacheCounters::default(),
        };

        Self {
            config,
            inner: RwLock::new(tiers),
        }
    }

    /// Multi-level lookup: exact key, then popular keywords, then semantic
    /// similarity. First hit wins; the winning entry's usage count and the
    /// corresponding hit counter are incremented. No side effects beyond
    /// statistics on the read path.
    pub async fn lookup(
        &self,
        query: &str,
        context: &str,
        user_id: &str,
        model: &str,
    ) -> Option<CachedResponse> {
        let normalized = normalize_query(query);
        let key = exact_key(&normalized, &context_digest(context), user_id, model);

        let mut tiers = self.inner.write().await;
        tiers.counters.total_requests += 1;

        if let Some(entry) = tiers.exact.get(&key) {
            debug!("cache hit ({}) for key {}", CacheTier::Exact, key);
            tiers.counters.exact_hits += 1;
            return Some(entry);
        }

        if let Some(entry) = tiers.popular.find(&normalized) {
            debug!("cache hit ({})", CacheTier::Popular);
            // Popular hits count toward the exact counter
            tiers.counters.exact_hits += 1;
            return Some(entry);
        }

        match tiers.semantic.find_similar(&normalized) {
            Ok(Some(entry)) => {
                debug!("cache hit ({})", CacheTier::Semantic);
                tiers.counters.semantic_hits += 1;
                return Some(entry);
            }
            Ok(None) => {}
            Err(e) => {
                // Best-effort tier: swallow and treat as a miss
                warn!("semantic cache lookup failed, treating as miss: {}", e);
            }
        }

        tiers.counters.misses += 1;
        None
    }

    /// Store a fresh response in all applicable tiers. Degenerate answers
    /// below the minimum length are not cached.
    pub async fn store(
        &self,
        query: &str,
        context: &str,
        user_id: &str,
        model: &str,
        response: &str,
        sources: Vec<String>,
    ) {
        if response.chars().count() < self.config.min_response_len {
            debug!("response below minimum cacheable length, skipping store");
            return;
        }

        let normalized = normalize_query(query);
        let ctx_digest = context_digest(context);
        let key = exact_key(&normalized, &ctx_digest, user_id, model);

        let entry = CachedResponse::new(
            response.to_string(),
            sources,
            key.clone(),
            ctx_digest,
            self.config.ttl_with_jitter(),
        );

        let mut tiers = self.inner.write().await;
        tiers.exact.insert(key, entry.clone());
        tiers.semantic.insert(&normalized, entry.clone());
        tiers.popular.maybe_insert(&normalized, &entry);
    }

    /// Preload known query/response pairs, e.g. at startup
    pub async fn warm_up(&self, seeds: &[SeedResponse]) {
        for seed in seeds {
            self.store(&seed.query, "", "", "", &seed.response, seed.sources.clone())
                .await;
        }
        info!("cache warm-up complete: {} seed responses", seeds.len());
    }

    /// Remove expired entries across all tiers, returning how many were
    /// dropped. Called by the background sweeper; lookups also purge lazily.
    pub async fn cleanup_expired(&self) -> usize {
        let mut tiers = self.inner.write().await;
        let removed = tiers.exact.purge_expired()
            + tiers.semantic.purge_expired()
            + tiers.popular.purge_expired();

        if removed > 0 {
            debug!("cache cleanup removed {} expired entries", removed);
        }
        removed
    }

    /// Snapshot of counters and tier sizes
    pub async fn stats(&self) -> CacheStats {
        let tiers = self.inner.read().await;
        CacheStats::from_counters(
            &tiers.counters,
            tiers.exact.len(),
            tiers.semantic.len(),
            tiers.popular.len(),
        )
    }

    /// Clear all tiers and reset counters
    pub async fn clear(&self) {
        let mut tiers = self.inner.write().await;
        tiers.exact.clear();
        tiers.semantic.clear();
        tiers.popular.clear();
        tiers.counters = CacheCounters::default();
        info!("response cache cleared");
    }
}

/// Background task purging expired entries on a fixed interval
pub async fn start_cleanup_sweeper(cache: std::sync::Arc<ResponseCache>, interval: std::time::Duration) {
    info!("starting cache cleanup sweeper (interval: {:?})", interval);
    loop {
        tokio::time::sleep(interval).await;
        cache.cleanup_expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache_with(ttl: Duration) -> ResponseCache {
        ResponseCache::new(
            CacheConfig::builder()
                .default_ttl(ttl)
                .ttl_jitter(0.0)
                .max_exact_entries(100)
                .max_semantic_entries(100)
                .build(),
        )
    }

    #[tokio::test]
    async fn test_store_then_exact_hit() {
        let cache = cache_with(Duration::from_secs(60));

        cache
            .store("What is X?", "ctx", "u1", "m1", "X is a thing worth knowing", vec![])
            .await;

        let hit = cache.lookup("what is x?", "ctx", "u1", "m1").await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().usage_count, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_miss_counts() {
        let cache = cache_with(Duration::from_secs(60));
        assert!(cache.lookup("nothing here", "ctx", "u1", "m1").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test]
    async fn test_short_response_not_cached() {
        let cache = cache_with(Duration::from_secs(60));
        cache.store("query?", "ctx", "u1", "m1", "ok", vec![]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.exact_size, 0);
        assert_eq!(stats.semantic_size, 0);
    }

    #[tokio::test]
    async fn test_store_twice_returns_latest() {
        let cache = cache_with(Duration::from_secs(60));
        cache
            .store("q", "ctx", "u1", "m1", "first answer version", vec![])
            .await;
        cache
            .store("q", "ctx", "u1", "m1", "second answer version", vec![])
            .await;

        let hit = cache.lookup("q", "ctx", "u1", "m1").await.unwrap();
        assert_eq!(hit.response, "second answer version");
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_miss_and_purged() {
        let cache = cache_with(Duration::from_millis(30));
        cache
            .store("q", "ctx", "u1", "m1", "an answer that expires", vec![])
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.lookup("q", "ctx", "u1", "m1").await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.exact_size, 0);
        assert_eq!(stats.semantic_size, 0);
    }

    #[tokio::test]
    async fn test_warm_up_visible_to_lookup() {
        let cache = cache_with(Duration::from_secs(60));
        cache
            .warm_up(&[SeedResponse {
                query: "что такое золотая виза?".to_string(),
                response: "Долгосрочная резидентская виза сроком до 10 лет".to_string(),
                sources: vec!["golden_visa_overview.md".to_string()],
            }])
            .await;

        let hit = cache
            .lookup("что такое золотая виза?", "", "", "")
            .await
            .expect("warmed entry should hit");
        assert!(hit.response.contains("10 лет"));
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let cache = cache_with(Duration::from_secs(60));
        cache
            .store("q", "ctx", "u1", "m1", "some cached answer", vec![])
            .await;
        cache.lookup("q", "ctx", "u1", "m1").await;

        cache.clear().await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries(), 0);
        assert_eq!(stats.total_requests, 0);
    }
}
