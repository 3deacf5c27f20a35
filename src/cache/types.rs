//! Core type definitions for the response cache

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache tier in the multi-level lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// Tier 1: exact request-signature match
    Exact,

    /// Tier 2: curated high-frequency topic match
    Popular,

    /// Tier 3: vector-similarity match between queries
    Semantic,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Exact => write!(f, "exact"),
            CacheTier::Popular => write!(f, "popular"),
            CacheTier::Semantic => write!(f, "semantic"),
        }
    }
}

/// Running hit/miss counters for the cache
///
/// Popular-tier hits are counted as exact hits: both are string matches that
/// skip similarity search, and the split was never useful in practice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheCounters {
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
}

/// Point-in-time snapshot of cache statistics, including tier sizes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    pub exact_size: usize,
    pub semantic_size: usize,
    pub popular_size: usize,
}

impl CacheStats {
    pub(crate) fn from_counters(
        counters: &CacheCounters,
        exact_size: usize,
        semantic_size: usize,
        popular_size: usize,
    ) -> Self {
        let hits = counters.exact_hits + counters.semantic_hits;
        let hit_rate_percent = if counters.total_requests == 0 {
            0.0
        } else {
            (hits as f64 / counters.total_requests as f64) * 100.0
        };

        Self {
            exact_hits: counters.exact_hits,
            semantic_hits: counters.semantic_hits,
            misses: counters.misses,
            total_requests: counters.total_requests,
            hit_rate_percent: (hit_rate_percent * 100.0).round() / 100.0,
            exact_size,
            semantic_size,
            popular_size,
        }
    }

    /// Total entries across all tiers
    pub fn total_entries(&self) -> usize {
        self.exact_size + self.semantic_size + self.popular_size
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ exact_hits: {}, semantic_hits: {}, misses: {}, hit_rate: {:.2}%, sizes: {}/{}/{} }}",
            self.exact_hits,
            self.semantic_hits,
            self.misses,
            self.hit_rate_percent,
            self.exact_size,
            self.semantic_size,
            self.popular_size
        )
    }
}
