//! Query normalization and deterministic cache keys
//!
//! The exact tier keys on a digest of the full request signature; the
//! semantic and popular tiers key on the normalized query text alone.

use sha2::{Digest, Sha256};

/// Canonicalize a raw query for cache-key purposes: lowercase, trim,
/// collapse internal whitespace (including newlines) to single spaces.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic digest of the full request signature for the exact tier.
///
/// The conversation identity enters through the context fingerprint: the
/// history context already differs per conversation, so hashing the raw
/// conversation id again would only fragment the cache.
pub fn exact_key(normalized_query: &str, context_digest: &str, user_id: &str, model: &str) -> String {
    let material = format!("{normalized_query}|{context_digest}|{user_id}|{model}");
    truncated_sha256(&material)
}

/// Fingerprint of a context string, stored alongside cached responses
pub fn context_digest(context: &str) -> String {
    truncated_sha256(context)
}

fn truncated_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    // 16 hex chars (64 bits) is plenty for cache-sized key spaces
    hex::encode(&digest[..8])
}
