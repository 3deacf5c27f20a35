//! Error types for the gateway core
//!
//! This module defines the error taxonomy for the request pipeline and its
//! supporting stores. Caching errors are always recovered internally and
//! never reach callers; collaborator errors are classified so the caller can
//! decide whether a retry makes sense.

use thiserror::Error;

/// Classification of language-model failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelErrorKind {
    /// Requested model does not exist or is not available
    NotFound,

    /// Upstream model provider rejected the call for rate reasons
    RateLimited,

    /// Any other completion failure
    Other,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelErrorKind::NotFound => write!(f, "model_not_found"),
            ModelErrorKind::RateLimited => write!(f, "model_rate_limited"),
            ModelErrorKind::Other => write!(f, "model_error"),
        }
    }
}

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Per-user fixed window is exhausted
    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// Retrieval call exceeded its timeout budget
    #[error("Retrieval timed out after {timeout_seconds}s: {context}")]
    RetrievalTimeout {
        timeout_seconds: u64,
        context: String,
    },

    /// Retrieval collaborator failed for a non-timeout reason
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Language-model completion failure
    #[error("Model error ({kind}): {message}")]
    Model {
        kind: ModelErrorKind,
        message: String,
    },

    /// Internal cache failure - always recovered, never surfaced to callers
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collaborator unavailable at startup (missing credentials, dead backend)
    #[error("Initialization error: {0}")]
    Init(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Whether the error is recoverable inside the pipeline (degrades to a
    /// structured response) rather than failing the request outright.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::RetrievalTimeout { .. }
                | GatewayError::Retrieval(_)
                | GatewayError::Model { .. }
                | GatewayError::Cache(_)
        )
    }

    /// Short machine-readable kind string for structured error fields
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GatewayError::RetrievalTimeout { .. } => "retrieval_timeout",
            GatewayError::Retrieval(_) => "retrieval_error",
            GatewayError::Model { kind, .. } => match kind {
                ModelErrorKind::NotFound => "model_not_found",
                ModelErrorKind::RateLimited => "model_rate_limited",
                ModelErrorKind::Other => "model_error",
            },
            GatewayError::Cache(_) => "cache_error",
            GatewayError::Config(_) => "config_error",
            GatewayError::Init(_) => "init_error",
            GatewayError::Other(_) => "internal_error",
        }
    }
}

impl From<String> for GatewayError {
    fn from(s: String) -> Self {
        GatewayError::Other(s)
    }
}

impl From<&str> for GatewayError {
    fn from(s: &str) -> Self {
        GatewayError::Other(s.to_string())
    }
}
