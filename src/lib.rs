//! Conversational RAG gateway core: multi-level response caching, adaptive
//! retrieval timeouts, conversation history and per-user rate limiting,
//! assembled into a single request pipeline around pluggable retriever and
//! model collaborators.

pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pipeline;
pub mod ratelimit;
pub mod retrieval;

pub use cache::{CacheStats, CachedResponse, ResponseCache, SeedResponse};
pub use config::{
    CacheConfig, ConversationConfig, GatewayConfig, RateLimitConfig, RetrievalConfig,
};
pub use conversation::{ConversationStore, Message, Role, start_expiry_sweeper};
pub use error::{GatewayError, ModelErrorKind, Result};
pub use pipeline::{ChatMetadata, ChatOutcome, RequestPipeline};
pub use ratelimit::RateLimiter;
pub use retrieval::{
    AdaptiveRetrievalPolicy, DocumentSink, ModelClient, RetrievalMode, RetrievedContext, Retriever,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging from `RUST_LOG`, defaulting to `rag_gateway=info`.
/// Call once at process start before constructing the pipeline.
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rag_gateway=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
