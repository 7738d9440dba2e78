//! Retry wrapper for rate-limited model calls.
//!
//! The downstream model service enforces a request-rate ceiling, and
//! staggered scheduling only reduces collision probability. Every
//! analysis therefore calls the model through a [`ResilientProvider`]
//! carrying that analysis kind's [`RetryPolicy`]: retry only on
//! rate-limit failures, with a linearly growing wait, up to a fixed
//! attempt budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Provider, ProviderError};

// ── Retry policy ─────────────────────────────────────────────────

/// Bounded retry configuration for one analysis kind.
///
/// The wait before retry `n` (1-based) is `n × backoff_base`, so a
/// 35s base waits 35s, then 70s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (never zero).
    pub max_attempts: u32,
    /// Base wait between attempts; grows linearly with the attempt index.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Standard three-attempt policy with a kind-specific base.
    pub const fn with_base_secs(secs: u64) -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(secs),
        }
    }

    /// Wait before the retry following `attempt_index` (0-based).
    pub fn backoff_for(&self, attempt_index: u32) -> Duration {
        self.backoff_base * (attempt_index + 1)
    }
}

// ── Resilient provider ───────────────────────────────────────────

/// Wraps a [`Provider`] with rate-limit-only retry.
///
/// Any failure other than [`ProviderError::RateLimited`], or a
/// rate-limit failure on the final attempt, propagates immediately.
pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_rate_limit() && attempt + 1 < self.policy.max_attempts => {
                    let wait = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        "Rate limit hit, backing off before retry"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
