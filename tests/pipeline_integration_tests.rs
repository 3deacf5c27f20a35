//! Integration tests for the request pipeline
//!
//! These tests drive full chat turns through in-memory retriever/model
//! stand-ins and verify:
//! - End-to-end response assembly and metadata
//! - Cache hits on repeated questions
//! - Rate limiting across a conversation
//! - Timeout degradation to the fallback answer
//! - History truncation on long conversations

use rag_gateway::config::{GatewayConfig, RateLimitConfig, RetrievalConfig};
use rag_gateway::error::{GatewayError, Result};
use rag_gateway::pipeline::RequestPipeline;
use rag_gateway::retrieval::{
    DocumentSink, ModelClient, RetrievalMode, RetrievedContext, Retriever,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_test::assert_ok;
use std::sync::Arc;
use std::time::Duration;

struct MemoryRetriever {
    delay: Duration,
    retrievals: Arc<AtomicUsize>,
    ingested: Arc<AtomicUsize>,
}

impl MemoryRetriever {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            retrievals: Arc::new(AtomicUsize::new(0)),
            ingested: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter handle that survives moving the retriever into the pipeline
    fn retrieval_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.retrievals)
    }

    fn ingest_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.ingested)
    }
}

impl Retriever for MemoryRetriever {
    async fn retrieve(&self, _query: &str, _mode: RetrievalMode) -> Result<RetrievedContext> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RetrievedContext {
            text: "Golden visa holders may sponsor family members.".to_string(),
            sources: vec!["family_sponsorship.md".to_string()],
        })
    }
}

impl DocumentSink for MemoryRetriever {
    async fn ingest(&self, _text: &str) -> Result<()> {
        self.ingested.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingModel {
    completions: Arc<AtomicUsize>,
}

impl CountingModel {
    fn new() -> Self {
        Self {
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn completion_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.completions)
    }
}

impl ModelClient for CountingModel {
    async fn complete(&self, prompt: &str, _system_context: &str) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Here is a detailed answer to: {prompt}"))
    }
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    // No jitter so TTL assertions are deterministic
    config.cache.ttl_jitter = 0.0;
    config
}

#[tokio::test]
async fn test_full_turn_produces_response_and_metadata() {
    let pipeline =
        RequestPipeline::new(config(), MemoryRetriever::new(Duration::ZERO), CountingModel::new())
            .unwrap();

    let outcome = pipeline
        .handle_chat("can golden visa holders sponsor family?", None, "alice", None)
        .await
        .unwrap();

    assert!(outcome.response.contains("detailed answer"));
    assert_eq!(outcome.sources, vec!["family_sponsorship.md".to_string()]);
    assert!(!outcome.metadata.cached);
    assert_eq!(outcome.metadata.history_messages, 0);
    assert!(!outcome.metadata.request_id.is_empty());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_repeated_question_skips_retrieval_and_model() {
    let retriever = MemoryRetriever::new(Duration::ZERO);
    let model = CountingModel::new();
    let retrievals = retriever.retrieval_counter();
    let completions = model.completion_counter();
    let pipeline = RequestPipeline::new(config(), retriever, model).unwrap();

    let first = pipeline
        .handle_chat("что такое золотая виза?", None, "alice", None)
        .await
        .unwrap();
    assert!(!first.metadata.cached);
    assert_eq!(retrievals.load(Ordering::SeqCst), 1);
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    // Fresh conversation, identical question: empty history gives the same
    // signature, so the exact tier serves it
    let second = pipeline
        .handle_chat("Что такое золотая виза?", None, "alice", None)
        .await
        .unwrap();

    assert!(second.metadata.cached);
    assert_eq!(second.response, first.response);

    // The cached turn touched neither the index nor the model
    assert_eq!(retrievals.load(Ordering::SeqCst), 1);
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    let stats = pipeline.get_cache_stats().await;
    assert_eq!(stats.exact_hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_cached_turns_still_recorded_in_conversation() {
    let pipeline =
        RequestPipeline::new(config(), MemoryRetriever::new(Duration::ZERO), CountingModel::new())
            .unwrap();

    let first = pipeline
        .handle_chat("what is a golden visa?", None, "alice", None)
        .await
        .unwrap();
    let second = pipeline
        .handle_chat("what is a golden visa?", None, "bob", None)
        .await
        .unwrap();

    assert!(second.metadata.cached);
    // Both turns of the cached exchange appear in the new conversation
    let count = pipeline
        .conversations()
        .message_count(&second.conversation_id)
        .await;
    assert_eq!(count, 2);
    assert_ne!(first.conversation_id, second.conversation_id);
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let mut config = config();
    config.rate_limit = RateLimitConfig {
        limit: 10,
        window: Duration::from_secs(3600),
    };
    let pipeline =
        RequestPipeline::new(config, MemoryRetriever::new(Duration::ZERO), CountingModel::new())
            .unwrap();

    let mut conversation_id = None;
    for i in 0..10 {
        let outcome = pipeline
            .handle_chat(&format!("question number {i}"), conversation_id.clone(), "alice", None)
            .await
            .unwrap();
        conversation_id = Some(outcome.conversation_id);
    }

    let err = pipeline
        .handle_chat("one question too many", conversation_id, "alice", None)
        .await
        .unwrap_err();

    match err {
        GatewayError::RateLimitExceeded { retry_after_seconds } => {
            assert!(retry_after_seconds >= 1);
        }
        other => panic!("expected rate limit rejection, got {other}"),
    }

    // Other users are unaffected
    tokio_test::assert_ok!(pipeline.handle_chat("a fresh question", None, "bob", None).await);
}

#[tokio::test]
async fn test_slow_retrieval_degrades_to_fallback() {
    let mut config = config();
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
        MemoryRetriever::new(Duration::from_millis(200)),
        CountingModel::new(),
    )
    .unwrap();

    let outcome = pipeline
        .handle_chat("a question the index is too slow for", None, "alice", None)
        .await
        .unwrap();

    assert_eq!(outcome.response, fallback);
    assert!(outcome.error.is_none());

    // The next identical question is served from cache without touching
    // the slow index again
    let cached = pipeline
        .handle_chat("a question the index is too slow for", None, "bob", None)
        .await
        .unwrap();
    assert!(cached.metadata.cached);
    assert_eq!(cached.response, fallback);
}

#[tokio::test]
async fn test_long_conversation_history_is_truncated() {
    let pipeline = Arc::new(
        RequestPipeline::new(config(), MemoryRetriever::new(Duration::ZERO), CountingModel::new())
            .unwrap(),
    );

    let conversations = pipeline.conversations();
    // 30 messages: over the history budget, under the compaction threshold
    for i in 0..30 {
        let role = if i % 2 == 0 {
            rag_gateway::Role::User
        } else {
            rag_gateway::Role::Assistant
        };
        conversations.append("long-chat", role, &format!("message {i}")).await;
    }

    let history = conversations
        .build_history_context("long-chat", true)
        .await
        .unwrap();

    // Default budget is 12: oldest six, gap marker, newest six
    assert_eq!(history.lines().count(), 13);
    assert!(history.contains("message 0"));
    assert!(history.contains("[gap]"));
    assert!(history.contains("message 29"));
    assert!(!history.contains("message 15"));
}

#[tokio::test]
async fn test_concurrent_ingest_completes() {
    let retriever = MemoryRetriever::new(Duration::ZERO);
    let ingested = retriever.ingest_counter();
    let pipeline =
        Arc::new(RequestPipeline::new(config(), retriever, CountingModel::new()).unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline.ingest_document(&format!("knowledge document {i}")).await
        }));
    }
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }
    assert_eq!(ingested.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_outcome_serializes_for_transport() {
    let pipeline =
        RequestPipeline::new(config(), MemoryRetriever::new(Duration::ZERO), CountingModel::new())
            .unwrap();

    let outcome = pipeline
        .handle_chat("what is a golden visa?", None, "alice", None)
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["metadata"]["cached"], false);
    assert!(json["metadata"]["request_id"].is_string());
    assert!(json["error"].is_null());
}
