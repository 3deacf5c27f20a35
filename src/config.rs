//! Configuration for the gateway core
//!
//! Every knob the pipeline depends on lives here: cache TTLs and bounds,
//! the semantic similarity threshold, conversation history limits, the
//! rate-limit window, and the adaptive retrieval timeout tiers. Nothing is
//! hardcoded in the components themselves; tests and deployments override
//! through builders or environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Configuration for the multi-level response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cache entries across all tiers
    pub default_ttl: Duration,

    /// Maximum number of entries in the exact-match tier
    pub max_exact_entries: usize,

    /// Maximum number of entries in the semantic tier
    /// When exceeded, the oldest half is dropped to amortize eviction cost
    pub max_semantic_entries: usize,

    /// Cosine similarity threshold for semantic matches (0.0 - 1.0)
    pub similarity_threshold: f32,

    /// Responses shorter than this are never cached
    /// Guards against poisoning the cache with empty or degenerate answers
    pub min_response_len: usize,

    /// TTL jitter factor (0.0 - 1.0), spreads expiry to avoid stampedes
    pub ttl_jitter: f64,

    /// Keywords that route a stored response into the popular tier
    pub popular_keywords: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 1 hour TTL
            default_ttl: Duration::from_secs(3600),
            max_exact_entries: 1000,
            max_semantic_entries: 500,
            similarity_threshold: 0.85,
            min_response_len: 10,
            // 12.5% jitter
            ttl_jitter: 0.125,
            popular_keywords: default_popular_keywords(),
        }
    }
}

fn default_popular_keywords() -> Vec<String> {
    [
        "золотая виза",
        "golden visa",
        "инвестиционная виза",
        "бизнес лицензия",
        "фриз зона",
        "dubai",
        "дубай",
        "residence",
        "резидентство",
        "инвестиции",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_exact_entries == 0 {
            return Err(GatewayError::Config(
                "max_exact_entries must be greater than 0".to_string(),
            ));
        }

        if self.max_semantic_entries == 0 {
            return Err(GatewayError::Config(
                "max_semantic_entries must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(GatewayError::Config(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(GatewayError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    max_exact_entries: Option<usize>,
    max_semantic_entries: Option<usize>,
    similarity_threshold: Option<f32>,
    min_response_len: Option<usize>,
    ttl_jitter: Option<f64>,
    popular_keywords: Option<Vec<String>>,
}

impl CacheConfigBuilder {
    /// Set the TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the exact tier entry cap
    pub fn max_exact_entries(mut self, max: usize) -> Self {
        self.max_exact_entries = Some(max);
        self
    }

    /// Set the semantic tier entry cap
    pub fn max_semantic_entries(mut self, max: usize) -> Self {
        self.max_semantic_entries = Some(max);
        self
    }

    /// Set the cosine similarity threshold for semantic matches
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Set the minimum response length eligible for caching
    pub fn min_response_len(mut self, len: usize) -> Self {
        self.min_response_len = Some(len);
        self
    }

    /// Set the TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Replace the popular-tier keyword list
    pub fn popular_keywords(mut self, keywords: Vec<String>) -> Self {
        self.popular_keywords = Some(keywords);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            max_exact_entries: self.max_exact_entries.unwrap_or(defaults.max_exact_entries),
            max_semantic_entries: self
                .max_semantic_entries
                .unwrap_or(defaults.max_semantic_entries),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            min_response_len: self.min_response_len.unwrap_or(defaults.min_response_len),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            popular_keywords: self.popular_keywords.unwrap_or(defaults.popular_keywords),
        }
    }
}

/// Configuration for the conversation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Number of messages used when building prompt history
    pub max_history: usize,

    /// Histories above this message count are formatted off the request path
    pub offload_threshold: usize,

    /// Conversations idle longer than this are removed by the sweeper
    pub ttl: Duration,

    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,

    /// Maximum conversations removed per sweep pass
    pub sweep_batch_size: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 12,
            offload_threshold: 20,
            // 1 hour idle TTL
            ttl: Duration::from_secs(3600),
            // Sweep every 5 minutes
            sweep_interval: Duration::from_secs(300),
            sweep_batch_size: 100,
        }
    }
}

/// Configuration for fixed-window rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per user per window
    pub limit: u32,

    /// Window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window: Duration::from_secs(3600),
        }
    }
}

/// Timeout tiers for adaptive retrieval
///
/// Word-count thresholds map a query to a retrieval mode and a timeout
/// budget. All thresholds are overridable; the defaults mirror the behavior
/// the gateway was tuned for in production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Queries up to this many words use the fast/narrow mode
    pub fast_max_words: usize,

    /// Queries up to this many words use the local mode
    pub local_max_words: usize,

    /// Queries up to this many words use the balanced hybrid mode
    pub balanced_max_words: usize,

    /// Timeout for fast-mode retrieval
    pub fast_timeout: Duration,

    /// Timeout for local-mode retrieval
    pub local_timeout: Duration,

    /// Timeout for balanced-mode retrieval
    pub balanced_timeout: Duration,

    /// Timeout for deep/global retrieval (longest queries)
    pub deep_timeout: Duration,

    /// Timeout for the single fallback attempt after a primary timeout
    pub fallback_timeout: Duration,

    /// Conversations with more messages than this escalate the mode one tier
    pub deep_history_threshold: usize,

    /// Timeout for the model completion call
    pub completion_timeout: Duration,

    /// User-facing answer returned when both retrieval attempts time out
    /// This answer is itself cache-eligible so repeats hit the cache
    pub fallback_message: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fast_max_words: 3,
            local_max_words: 7,
            balanced_max_words: 15,
            fast_timeout: Duration::from_secs(10),
            local_timeout: Duration::from_secs(20),
            balanced_timeout: Duration::from_secs(30),
            deep_timeout: Duration::from_secs(60),
            fallback_timeout: Duration::from_secs(15),
            deep_history_threshold: 8,
            completion_timeout: Duration::from_secs(60),
            fallback_message: "The search took too long to complete. Please try \
                               a simpler or more specific question."
                .to_string(),
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub cache: CacheConfig,
    pub conversation: ConversationConfig,
    pub rate_limit: RateLimitConfig,
    pub retrieval: RetrievalConfig,

    /// Default model name used when a request does not specify one
    pub default_model: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            conversation: ConversationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retrieval: RetrievalConfig::default(),
            default_model: "gpt-4.1-mini".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Reads `.env` if present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("RAG_CACHE_TTL_SECS") {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse::<usize>("RAG_CACHE_MAX_EXACT") {
            config.cache.max_exact_entries = max;
        }
        if let Some(max) = env_parse::<usize>("RAG_CACHE_MAX_SEMANTIC") {
            config.cache.max_semantic_entries = max;
        }
        if let Some(threshold) = env_parse::<f32>("RAG_SIMILARITY_THRESHOLD") {
            config.cache.similarity_threshold = threshold;
        }
        if let Ok(keywords) = std::env::var("RAG_POPULAR_KEYWORDS") {
            config.cache.popular_keywords = keywords
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
        }

        if let Some(max) = env_parse::<usize>("RAG_MAX_HISTORY") {
            config.conversation.max_history = max;
        }
        if let Some(secs) = env_parse::<u64>("RAG_CONVERSATION_TTL_SECS") {
            config.conversation.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RAG_SWEEP_INTERVAL_SECS") {
            config.conversation.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(limit) = env_parse::<u32>("RAG_RATE_LIMIT") {
            config.rate_limit.limit = limit;
        }
        if let Some(secs) = env_parse::<u64>("RAG_RATE_WINDOW_SECS") {
            config.rate_limit.window = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("RAG_FAST_TIMEOUT_SECS") {
            config.retrieval.fast_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RAG_BALANCED_TIMEOUT_SECS") {
            config.retrieval.balanced_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RAG_DEEP_TIMEOUT_SECS") {
            config.retrieval.deep_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RAG_FALLBACK_TIMEOUT_SECS") {
            config.retrieval.fallback_timeout = Duration::from_secs(secs);
        }

        if let Ok(model) = std::env::var("RAG_DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                config.default_model = model;
            }
        }

        config
    }

    /// Validate the full configuration
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;

        if self.conversation.max_history == 0 {
            return Err(GatewayError::Config(
                "max_history must be greater than 0".to_string(),
            ));
        }

        if self.conversation.sweep_batch_size == 0 {
            return Err(GatewayError::Config(
                "sweep_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.limit == 0 {
            return Err(GatewayError::Config(
                "rate limit must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.window.is_zero() {
            return Err(GatewayError::Config(
                "rate limit window must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.fallback_timeout.is_zero() {
            return Err(GatewayError::Config(
                "fallback_timeout must be greater than 0".to_string(),
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(GatewayError::Config(
                "default_model must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
