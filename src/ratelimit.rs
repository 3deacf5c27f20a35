//! Per-user fixed-window rate limiting
//!
//! Counts requests per user inside a fixed window. Windows reset lazily on
//! the next request after expiry, so an idle user costs nothing. Stale
//! windows are additionally dropped during sweeps so the map stays bounded
//! by the active user population.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, Result};

struct WindowState {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by user id
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<String, WindowState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            "initializing rate limiter ({} requests per {:?})",
            config.limit, config.window
        );
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Count one request for the user. Returns the remaining allowance in
    /// the current window, or `RateLimitExceeded` carrying the seconds
    /// until the window rolls over (at least 1).
    pub async fn check_and_increment(&self, user_id: &str) -> Result<u32> {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        let state = windows
            .entry(user_id.to_string())
            .or_insert_with(|| WindowState { started: now, count: 0 });

        if now.duration_since(state.started) >= self.config.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= self.config.limit {
            let elapsed = now.duration_since(state.started);
            let retry_after_seconds =
                (self.config.window.saturating_sub(elapsed)).as_secs().max(1);
            warn!(
                "rate limit exceeded for user {} ({} in window)",
                user_id, state.count
            );
            return Err(GatewayError::RateLimitExceeded { retry_after_seconds });
        }

        state.count += 1;
        let remaining = self.config.limit - state.count;
        debug!("user {} has {} requests remaining", user_id, remaining);
        Ok(remaining)
    }

    /// Remaining allowance without consuming a request
    pub async fn remaining(&self, user_id: &str) -> u32 {
        let windows = self.windows.read().await;
        match windows.get(user_id) {
            Some(state) if state.started.elapsed() < self.config.window => {
                self.config.limit.saturating_sub(state.count)
            }
            _ => self.config.limit,
        }
    }

    /// Drop windows that have fully expired, returning how many were removed
    pub async fn sweep_stale(&self) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, state| state.started.elapsed() < self.config.window);
        let removed = before - windows.len();
        if removed > 0 {
            debug!("dropped {} stale rate-limit windows", removed);
        }
        removed
    }

    /// Number of users with a live window
    pub async fn tracked_users(&self) -> usize {
        self.windows.read().await.len()
    }
}
