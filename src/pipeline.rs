//! Request pipeline
//!
//! Wires the cache, conversation store, rate limiter and adaptive retrieval
//! policy around the external retriever/model collaborators. One pipeline
//! instance is constructed at process start and shared across requests.
//!
//! Per-request flow: rate limit, cache lookup, history build, retrieval,
//! completion, cache store, conversation bookkeeping. Collaborator failures
//! surface as a structured error beside an empty response; the pipeline
//! itself never panics on a request.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::GatewayConfig;
use crate::conversation::{ConversationStore, Role};
use crate::error::{GatewayError, ModelErrorKind, Result};
use crate::ratelimit::RateLimiter;
use crate::retrieval::{
    AdaptiveRetrievalPolicy, DocumentSink, ModelClient, RetrievalOutcome, Retriever,
};

/// Request-scoped identity and timing, constructed once per call and
/// carried by value through the pipeline
#[derive(Debug, Clone)]
pub struct RequestSpan {
    pub request_id: String,
    started: Instant,
}

impl RequestSpan {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Per-response bookkeeping surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub cached: bool,
    pub rate_limit_remaining: u32,
    pub history_messages: usize,
    pub elapsed_ms: u64,
    pub request_id: String,
}

/// Structured error beside an empty response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatErrorInfo {
    pub kind: String,
    pub message: String,
}

impl ChatErrorInfo {
    fn from_error(error: &GatewayError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Everything a chat call produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub response: String,
    pub conversation_id: String,
    pub sources: Vec<String>,
    pub metadata: ChatMetadata,
    pub error: Option<ChatErrorInfo>,
}

/// The assembled gateway: caching, conversations, rate limiting and
/// adaptive retrieval around external collaborators
pub struct RequestPipeline<R, M> {
    config: GatewayConfig,
    cache: Arc<ResponseCache>,
    conversations: Arc<ConversationStore>,
    limiter: Arc<RateLimiter>,
    policy: AdaptiveRetrievalPolicy,
    retriever: R,
    model: M,

    /// Serializes writes to the external index; the only insertion lock
    ingest_lock: Mutex<()>,
}

impl<R, M> RequestPipeline<R, M>
where
    R: Retriever,
    M: ModelClient,
{
    /// Build the pipeline, failing fast on an invalid configuration
    pub fn new(config: GatewayConfig, retriever: R, model: M) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GatewayError::Init(e.to_string()))?;

        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let conversations = Arc::new(ConversationStore::new(config.conversation.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let policy = AdaptiveRetrievalPolicy::new(config.retrieval.clone());

        Ok(Self {
            config,
            cache,
            conversations,
            limiter,
            policy,
            retriever,
            model,
            ingest_lock: Mutex::new(()),
        })
    }

    /// Handle one chat turn end to end.
    ///
    /// Rate-limit rejections are the only hard error; every downstream
    /// failure degrades to an outcome carrying a structured `error` field.
    pub async fn handle_chat(
        &self,
        message: &str,
        conversation_id: Option<String>,
        user_id: &str,
        model: Option<String>,
    ) -> Result<ChatOutcome> {
        let span = RequestSpan::new();
        let conversation_id =
            conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let model = model.unwrap_or_else(|| self.config.default_model.clone());

        debug!(
            "request {} from user {} on conversation {}",
            span.request_id, user_id, conversation_id
        );

        let remaining = self.limiter.check_and_increment(user_id).await?;

        let history_messages = self.conversations.message_count(&conversation_id).await;
        let history = self
            .conversations
            .build_history_context(&conversation_id, true)
            .await?;

        if let Some(hit) = self.cache.lookup(message, &history, user_id, &model).await {
            self.conversations
                .append(&conversation_id, Role::User, message)
                .await;
            self.conversations
                .append(&conversation_id, Role::Assistant, &hit.response)
                .await;

            info!(
                "request {} served from cache in {}ms",
                span.request_id,
                span.elapsed_ms()
            );
            return Ok(self.outcome(
                hit.response,
                hit.sources,
                conversation_id,
                true,
                remaining,
                history_messages,
                &span,
                None,
            ));
        }

        self.conversations
            .append(&conversation_id, Role::User, message)
            .await;

        let retrieved = match self
            .policy
            .retrieve(&self.retriever, message, history_messages)
            .await
        {
            Ok(RetrievalOutcome::Context(context)) => context,
            Ok(RetrievalOutcome::TimedOut) => {
                // Degraded but successful: the fallback answer is a real
                // response and stays cache eligible
                let fallback = self.policy.fallback_message().to_string();
                self.cache
                    .store(message, &history, user_id, &model, &fallback, vec![])
                    .await;
                self.conversations
                    .append(&conversation_id, Role::Assistant, &fallback)
                    .await;

                info!(
                    "request {} degraded to fallback answer in {}ms",
                    span.request_id,
                    span.elapsed_ms()
                );
                return Ok(self.outcome(
                    fallback,
                    vec![],
                    conversation_id,
                    false,
                    remaining,
                    history_messages,
                    &span,
                    None,
                ));
            }
            Err(e) => {
                warn!("request {} retrieval failed: {}", span.request_id, e);
                return Ok(self.outcome(
                    String::new(),
                    vec![],
                    conversation_id,
                    false,
                    remaining,
                    history_messages,
                    &span,
                    Some(ChatErrorInfo::from_error(&e)),
                ));
            }
        };

        let system_context = if history.is_empty() {
            retrieved.text.clone()
        } else {
            format!("{}\n\nConversation so far:\n{}", retrieved.text, history)
        };

        let completion = match timeout(
            self.config.retrieval.completion_timeout,
            self.model.complete(message, &system_context),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("request {} completion failed: {}", span.request_id, e);
                return Ok(self.outcome(
                    String::new(),
                    vec![],
                    conversation_id,
                    false,
                    remaining,
                    history_messages,
                    &span,
                    Some(ChatErrorInfo::from_error(&e)),
                ));
            }
            Err(_) => {
                let e = GatewayError::Model {
                    kind: ModelErrorKind::Other,
                    message: format!(
                        "completion timed out after {:?}",
                        self.config.retrieval.completion_timeout
                    ),
                };
                warn!("request {}: {}", span.request_id, e);
                return Ok(self.outcome(
                    String::new(),
                    vec![],
                    conversation_id,
                    false,
                    remaining,
                    history_messages,
                    &span,
                    Some(ChatErrorInfo::from_error(&e)),
                ));
            }
        };

        self.cache
            .store(
                message,
                &history,
                user_id,
                &model,
                &completion,
                retrieved.sources.clone(),
            )
            .await;
        self.conversations
            .append(&conversation_id, Role::Assistant, &completion)
            .await;

        info!(
            "request {} completed in {}ms",
            span.request_id,
            span.elapsed_ms()
        );
        Ok(self.outcome(
            completion,
            retrieved.sources,
            conversation_id,
            false,
            remaining,
            history_messages,
            &span,
            None,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        response: String,
        sources: Vec<String>,
        conversation_id: String,
        cached: bool,
        rate_limit_remaining: u32,
        history_messages: usize,
        span: &RequestSpan,
        error: Option<ChatErrorInfo>,
    ) -> ChatOutcome {
        ChatOutcome {
            response,
            conversation_id,
            sources,
            metadata: ChatMetadata {
                cached,
                rate_limit_remaining,
                history_messages,
                elapsed_ms: span.elapsed_ms(),
                request_id: span.request_id.clone(),
            },
            error,
        }
    }

    pub async fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Shared handles for background sweepers and warm-up
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    pub fn conversations(&self) -> Arc<ConversationStore> {
        Arc::clone(&self.conversations)
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }
}

impl<R, M> RequestPipeline<R, M>
where
    R: Retriever + DocumentSink,
    M: ModelClient,
{
    /// Add a document to the external index. Insertions run one at a time;
    /// concurrent callers queue on the lock.
    pub async fn ingest_document(&self, text: &str) -> Result<()> {
        let _guard = self.ingest_lock.lock().await;
        debug!("ingesting document ({} chars)", text.chars().count());
        self.retriever.ingest(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitConfig, RetrievalConfig};
    use crate::retrieval::{RetrievalMode, RetrievedContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticRetriever {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StaticRetriever {
        fn instant() -> Self {
            Self {
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &str, _mode: RetrievalMode) -> Result<RetrievedContext> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(RetrievedContext {
                text: "golden visa context passage".to_string(),
                sources: vec!["golden_visa.md".to_string()],
            })
        }
    }

    impl DocumentSink for StaticRetriever {
        async fn ingest(&self, _text: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EchoModel;

    impl ModelClient for EchoModel {
        async fn complete(&self, prompt: &str, _system_context: &str) -> Result<String> {
            Ok(format!("model answer for: {prompt}"))
        }
    }

    struct FailingModel;

    impl ModelClient for FailingModel {
        async fn complete(&self, _prompt: &str, _system_context: &str) -> Result<String> {
            Err(GatewayError::Model {
                kind: ModelErrorKind::NotFound,
                message: "no such model".to_string(),
            })
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig::default()
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_appends() {
        let pipeline =
            RequestPipeline::new(test_config(), StaticRetriever::instant(), EchoModel).unwrap();

        let outcome = pipeline
            .handle_chat("what is a golden visa?", None, "u1", None)
            .await
            .unwrap();

        assert!(outcome.response.starts_with("model answer for:"));
        assert_eq!(outcome.sources, vec!["golden_visa.md".to_string()]);
        assert!(!outcome.metadata.cached);
        assert!(outcome.error.is_none());
        assert!(!outcome.conversation_id.is_empty());

        let count = pipeline
            .conversations()
            .message_count(&outcome.conversation_id)
            .await;
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_repeat_question_served_from_cache() {
        let retriever = StaticRetriever::instant();
        let pipeline = RequestPipeline::new(test_config(), retriever, EchoModel).unwrap();

        let first = pipeline
            .handle_chat("what is a golden visa?", None, "u1", None)
            .await
            .unwrap();
        assert!(!first.metadata.cached);

        let second = pipeline
            .handle_chat(
                "what is a golden visa?",
                Some(first.conversation_id.clone()),
                "u2",
                None,
            )
            .await
            .unwrap();

        // Different user and non-empty history change the exact key; the
        // popular/semantic tiers still serve the repeat
        assert!(second.metadata.cached);
        assert_eq!(second.response, first.response);
    }

    #[tokio::test]
    async fn test_rate_limit_is_a_hard_error() {
        let mut config = test_config();
        config.rate_limit = RateLimitConfig {
            limit: 1,
            window: Duration::from_secs(60),
        };
        let pipeline =
            RequestPipeline::new(config, StaticRetriever::instant(), EchoModel).unwrap();

        pipeline
            .handle_chat("first question here", None, "u1", None)
            .await
            .unwrap();

        let err = pipeline
            .handle_chat("second question here", None, "u1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_retrieval_timeouts_degrade_to_fallback_answer() {
        let mut config = test_config();
        config.retrieval = RetrievalConfig {
            fast_timeout: Duration::from_millis(20),
            local_timeout: Duration::from_millis(20),
            balanced_timeout: Duration::from_millis(20),
            deep_timeout: Duration::from_millis(20),
            fallback_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let fallback = config.retrieval.fallback_message.clone();
        let pipeline = RequestPipeline::new(
            config,
            StaticRetriever::slow(Duration::from_millis(200)),
            EchoModel,
        )
        .unwrap();

        let outcome = pipeline
            .handle_chat("some slow question", None, "u1", None)
            .await
            .unwrap();

        assert_eq!(outcome.response, fallback);
        assert!(outcome.error.is_none());

        // The degraded answer was cached
        let stats = pipeline.get_cache_stats().await;
        assert!(stats.exact_size >= 1);
    }

    #[tokio::test]
    async fn test_model_error_surfaces_in_outcome() {
        let pipeline =
            RequestPipeline::new(test_config(), StaticRetriever::instant(), FailingModel).unwrap();

        let outcome = pipeline
            .handle_chat("what is a golden visa?", None, "u1", None)
            .await
            .unwrap();

        assert!(outcome.response.is_empty());
        let error = outcome.error.expect("model failure should be surfaced");
        assert_eq!(error.kind, "model_not_found");

        // Failed turns are not cached
        let stats = pipeline.get_cache_stats().await;
        assert_eq!(stats.exact_size, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_construction() {
        let mut config = test_config();
        config.cache.similarity_threshold = 2.0;

        let result = RequestPipeline::new(config, StaticRetriever::instant(), EchoModel);
        assert!(matches!(result, Err(GatewayError::Init(_))));
    }

    #[tokio::test]
    async fn test_ingest_serializes_under_lock() {
        let pipeline = Arc::new(
            RequestPipeline::new(test_config(), StaticRetriever::instant(), EchoModel).unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..4 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                pipeline.ingest_document(&format!("document {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}
