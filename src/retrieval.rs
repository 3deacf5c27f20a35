//! Retrieval collaborators and the adaptive timeout policy
//!
//! The gateway never talks to an embedding index or language model
//! directly; it consumes them through the [`Retriever`], [`ModelClient`]
//! and [`DocumentSink`] traits. The [`AdaptiveRetrievalPolicy`] classifies
//! each query by word count (and conversation depth) into a retrieval mode
//! and timeout budget, and performs at most one cheaper fallback attempt
//! when the primary attempt times out.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::error::{GatewayError, Result};

/// Retrieval depth/cost tier, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetrievalMode {
    /// Plain chunk lookup, no graph traversal
    Naive,

    /// Entity-local neighborhood retrieval
    Local,

    /// Combined local and global retrieval
    Hybrid,

    /// Full-corpus community retrieval, most expensive
    Global,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Naive => "naive",
            RetrievalMode::Local => "local",
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::Global => "global",
        }
    }

    /// One tier deeper, saturating at `Global`
    fn escalate(self) -> Self {
        match self {
            RetrievalMode::Naive => RetrievalMode::Local,
            RetrievalMode::Local => RetrievalMode::Hybrid,
            RetrievalMode::Hybrid | RetrievalMode::Global => RetrievalMode::Global,
        }
    }
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Context returned by a retrieval call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Concatenated supporting passages
    pub text: String,

    /// Source document identifiers for citation
    pub sources: Vec<String>,
}

/// Document/context retrieval collaborator
pub trait Retriever: Send + Sync {
    fn retrieve(
        &self,
        query: &str,
        mode: RetrievalMode,
    ) -> impl Future<Output = Result<RetrievedContext>> + Send;
}

/// Language-model completion collaborator
pub trait ModelClient: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        system_context: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Write-side of the external document index
pub trait DocumentSink: Send + Sync {
    fn ingest(&self, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Mode and timeout chosen for one retrieval attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalPlan {
    pub mode: RetrievalMode,
    pub timeout: Duration,
}

/// Result of a policy-driven retrieval: either context, or both attempts
/// timed out and the pipeline should degrade to the fallback answer
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    Context(RetrievedContext),
    TimedOut,
}

/// Chooses retrieval depth and timeout per query, with a single cheap
/// fallback attempt after a timeout
///
/// Invariant: at most two retrieval attempts per request; worst-case
/// latency is bounded by `primary_timeout + fallback_timeout`.
#[derive(Debug, Clone)]
pub struct AdaptiveRetrievalPolicy {
    config: RetrievalConfig,
}

impl AdaptiveRetrievalPolicy {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Map query complexity (word count) and conversation depth to a
    /// `(mode, timeout)` plan. Long conversations escalate the mode one
    /// tier: follow-up questions tend to lean on accumulated entities.
    pub fn classify(&self, query: &str, history_messages: usize) -> RetrievalPlan {
        let word_count = query.split_whitespace().count();

        let (mut mode, timeout) = if word_count <= self.config.fast_max_words {
            (RetrievalMode::Naive, self.config.fast_timeout)
        } else if word_count <= self.config.local_max_words {
            (RetrievalMode::Local, self.config.local_timeout)
        } else if word_count <= self.config.balanced_max_words {
            (RetrievalMode::Hybrid, self.config.balanced_timeout)
        } else {
            (RetrievalMode::Global, self.config.deep_timeout)
        };

        if history_messages > self.config.deep_history_threshold {
            mode = mode.escalate();
        }

        RetrievalPlan { mode, timeout }
    }

    /// Run one retrieval under the classified timeout. On timeout, retry
    /// exactly once in the cheapest mode under the fixed fallback timeout;
    /// if that also times out or errors, report `TimedOut` so the caller
    /// can degrade. Non-timeout errors on the primary attempt propagate
    /// without a retry.
    pub async fn retrieve<R: Retriever>(
        &self,
        retriever: &R,
        query: &str,
        history_messages: usize,
    ) -> Result<RetrievalOutcome> {
        let plan = self.classify(query, history_messages);
        debug!(
            "retrieval plan: mode={} timeout={:?} ({} history messages)",
            plan.mode, plan.timeout, history_messages
        );

        match timeout(plan.timeout, retriever.retrieve(query, plan.mode)).await {
            Ok(Ok(context)) => return Ok(RetrievalOutcome::Context(context)),
            Ok(Err(GatewayError::RetrievalTimeout { .. })) | Err(_) => {
                warn!(
                    "retrieval timed out after {:?} in {} mode, falling back to {}",
                    plan.timeout,
                    plan.mode,
                    RetrievalMode::Naive
                );
            }
            Ok(Err(e)) => return Err(e),
        }

        match timeout(
            self.config.fallback_timeout,
            retriever.retrieve(query, RetrievalMode::Naive),
        )
        .await
        {
            Ok(Ok(context)) => Ok(RetrievalOutcome::Context(context)),
            Ok(Err(e)) => {
                warn!("fallback retrieval failed: {}", e);
                Ok(RetrievalOutcome::TimedOut)
            }
            Err(_) => {
                warn!(
                    "fallback retrieval timed out after {:?}",
                    self.config.fallback_timeout
                );
                Ok(RetrievalOutcome::TimedOut)
            }
        }
    }

    /// The user-facing answer used when both attempts time out
    pub fn fallback_message(&self) -> &str {
        &self.config.fallback_message
    }
}
