//! # Multi-Level Response Cache
//!
//! Caching layer that sits between the request pipeline and the external
//! retrieval/model collaborators, so repeated questions never pay for slow
//! upstream calls twice.
//!
//! ## Architecture
//!
//! Three tiers, checked in order on every lookup:
//! - Tier 1: exact match on a digest of the full request signature
//! - Tier 2: curated popular-topic keywords (configurable list)
//! - Tier 3: TF-IDF cosine similarity between queries
//!
//! All tiers apply the same TTL (with jitter); expired entries are lazily
//! purged on lookup and periodically by the cleanup sweep. Tier failures
//! degrade to cache misses, never to request failures.
//!
//! ## Example
//!
//! ```rust
//! use rag_gateway::cache::ResponseCache;
//! use rag_gateway::config::CacheConfig;
//!
//! # async fn example() {
//! let cache = ResponseCache::new(CacheConfig::default());
//!
//! cache
//!     .store("what is a golden visa?", "", "u1", "gpt-4.1-mini",
//!            "A long-term residence visa...", vec!["visa.md".to_string()])
//!     .await;
//!
//! if let Some(hit) = cache.lookup("what is a golden visa?", "", "u1", "gpt-4.1-mini").await {
//!     println!("cached: {}", hit.response);
//! }
//! # }
//! ```

pub mod entry;
pub mod exact;
pub mod key;
pub mod orchestrator;
pub mod popular;
pub mod semantic;
pub mod types;

pub use entry::CachedResponse;
pub use exact::ExactCache;
pub use key::{context_digest, exact_key, normalize_query};
pub use orchestrator::{start_cleanup_sweeper, ResponseCache, SeedResponse};
pub use popular::PopularCache;
pub use semantic::SemanticCache;
pub use types::{CacheStats, CacheTier};
