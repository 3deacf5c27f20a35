//! Per-conversation message history
//!
//! Ordered message logs keyed by conversation id, with TTL-based expiry
//! (background sweep in bounded batches), soft compaction of long
//! conversations, and history formatting for prompt construction. The store
//! exclusively owns its records; callers only ever see formatted text or
//! counts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ConversationConfig;
use crate::error::{GatewayError, Result};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
            Role::System => write!(f, "System"),
        }
    }
}

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// One conversation's ordered message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationRecord {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }
}

/// Store for conversation histories with TTL expiry
pub struct ConversationStore {
    config: ConversationConfig,
    inner: RwLock<HashMap<String, ConversationRecord>>,
}

impl ConversationStore {
    pub fn new(config: ConversationConfig) -> Self {
        info!(
            "initializing conversation store (max_history {}, ttl {:?})",
            config.max_history, config.ttl
        );
        Self {
            config,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Append a message, creating the record on first use.
    ///
    /// Soft compaction: only once the log exceeds three times the history
    /// budget is it trimmed back to twice the budget, so the trim cost is
    /// not paid on every append. An omitted-count marker records the cut.
    pub async fn append(&self, conversation_id: &str, role: Role, content: &str) {
        let mut records = self.inner.write().await;
        let record = records
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationRecord::new(conversation_id.to_string()));

        record.messages.push(Message {
            role,
            content: content.to_string(),
        });
        record.last_activity = Utc::now();

        let hard_limit = 3 * self.config.max_history;
        if record.messages.len() > hard_limit {
            let keep = 2 * self.config.max_history;
            let omitted = record.messages.len() - keep;
            record.messages.drain(..omitted);
            record.messages.insert(
                0,
                Message {
                    role: Role::System,
                    content: format!("[{} messages omitted]", omitted),
                },
            );
            debug!(
                "compacted conversation {}: dropped {} messages",
                conversation_id, omitted
            );
        }
    }

    /// Build the history portion of the prompt for a conversation.
    ///
    /// Takes up to `max_history` messages. When the full history exceeds
    /// that budget, the oldest and newest halves are kept with a `[gap]`
    /// marker between them so both the opening framing and the recent
    /// exchange survive. Formatting of long histories runs on the blocking
    /// pool so the request path never stalls on string work.
    pub async fn build_history_context(
        &self,
        conversation_id: &str,
        include_last_user: bool,
    ) -> Result<String> {
        let mut messages = {
            let records = self.inner.read().await;
            match records.get(conversation_id) {
                Some(record) => record.messages.clone(),
                None => return Ok(String::new()),
            }
        };

        if !include_last_user {
            if let Some(last) = messages.last() {
                if last.role == Role::User {
                    messages.pop();
                }
            }
        }

        // The offload decision keys on the full history, not the truncated
        // selection: truncation itself is part of the work being offloaded
        let offload = messages.len() > self.config.offload_threshold;
        let budget = self.config.max_history;

        if offload {
            tokio::task::spawn_blocking(move || format_history(&select_window(messages, budget)))
                .await
                .map_err(|e| GatewayError::Other(format!("history formatting failed: {e}")))
        } else {
            Ok(format_history(&select_window(messages, budget)))
        }
    }

    /// Number of messages currently stored for a conversation
    pub async fn message_count(&self, conversation_id: &str) -> usize {
        let records = self.inner.read().await;
        records
            .get(conversation_id)
            .map(|r| r.messages.len())
            .unwrap_or(0)
    }

    /// Explicitly delete a conversation, returning whether it existed
    pub async fn delete(&self, conversation_id: &str) -> bool {
        let mut records = self.inner.write().await;
        records.remove(conversation_id).is_some()
    }

    /// Number of live conversations
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove conversations idle past the TTL, at most one batch per call
    /// so a sweep never monopolizes the write lock.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.ttl)
                .unwrap_or(chrono::Duration::seconds(3600));

        let mut records = self.inner.write().await;
        let expired: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.last_activity < cutoff)
            .take(self.config.sweep_batch_size)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            records.remove(id);
        }

        if !expired.is_empty() {
            debug!("swept {} expired conversations", expired.len());
        }
        expired.len()
    }
}

/// Pick the messages that fit the history budget; over-budget histories
/// keep the oldest and newest halves around a `[gap]` marker
fn select_window(messages: Vec<Message>, budget: usize) -> Vec<Message> {
    if messages.len() <= budget {
        return messages;
    }

    let head = budget / 2;
    let tail = budget - head;
    let mut selected = Vec::with_capacity(budget + 1);
    selected.extend_from_slice(&messages[..head]);
    selected.push(Message {
        role: Role::System,
        content: "[gap]".to_string(),
    });
    selected.extend_from_slice(&messages[messages.len() - tail..]);
    selected
}

/// Format selected messages as alternating role-prefixed lines
fn format_history(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            // System entries are markers; emit them bare
            Role::System => lines.push(message.content.clone()),
            role => lines.push(format!("{}: {}", role, message.content)),
        }
    }
    lines.join("\n")
}

/// Background task removing idle conversations on a fixed interval
pub async fn start_expiry_sweeper(store: Arc<ConversationStore>) {
    let interval = store.config.sweep_interval;
    info!("starting conversation expiry sweeper (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let removed = store.sweep_expired().await;
        if removed >= store.config.sweep_batch_size {
            warn!(
                "expiry sweep hit batch limit ({}), more conversations pending",
                removed
            );
        }
    }
}
