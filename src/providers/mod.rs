//! Language-model providers.
//!
//! A [`Provider`] turns a prompt into a text answer. Concrete providers
//! wrap a specific model API; [`ResilientProvider`] wraps any provider
//! with a bounded retry policy for rate-limit failures. Analysis code
//! only ever sees the trait object, so providers are swappable per
//! deployment and mockable in tests.

pub mod gemini;
pub mod resilient;

use async_trait::async_trait;
use thiserror::Error;

#[allow(unused_imports)]
pub use gemini::GeminiProvider;
#[allow(unused_imports)]
pub use resilient::{ResilientProvider, RetryPolicy};

// ── Provider errors ──────────────────────────────────────────────

/// Failure classes for a model call.
///
/// `RateLimited` is the only recoverable class; everything else
/// propagates immediately to the caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The model service rejected the request for exceeding its
    /// request-rate ceiling (HTTP 429).
    #[error("model service rate limited the request")]
    RateLimited,

    /// Any other non-success response from the model API.
    #[error("model API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure before a response was received.
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The response arrived but carried no usable text.
    #[error("model response contained no text")]
    EmptyResponse,

    /// Required credentials were not configured.
    #[error("missing model credentials ({0})")]
    MissingCredentials(&'static str),
}

impl ProviderError {
    /// Whether this failure may be retried after backing off.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

// ── Provider trait ───────────────────────────────────────────────

/// A text-in, text-out model capability.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in logs (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate a completion for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}
