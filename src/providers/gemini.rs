//! Google Gemini provider.
//!
//! Thin REST wrapper around the `generateContent` endpoint. Maps HTTP
//! 429 to [`ProviderError::RateLimited`] so the resilient wrapper can
//! distinguish it from terminal failures.

use std::time::Duration;

use async_trait::async_trait;

use super::{Provider, ProviderError};

/// Default API endpoint root.
const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request timeout for a single generation call.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider backed by the Google Gemini API.
pub struct GeminiProvider {
    /// API key; `None` when the deployment never configured one.
    api_key: Option<String>,
    /// Model id (e.g. "gemini-2.5-flash").
    model: String,
    /// Fully-formed `generateContent` URL (without the key query param).
    endpoint: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a provider against the public Gemini API.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            endpoint: format!("{DEFAULT_API_ROOT}/models/{model}:generateContent"),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Create a provider against an alternate API root (proxies,
    /// regional endpoints, test servers).
    pub fn with_api_root(api_key: Option<String>, model: impl Into<String>, root: &str) -> Self {
        let model = model.into();
        Self {
            endpoint: format!("{}/models/{model}:generateContent", root.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials("model.api_key"))?;

        let payload = serde_json::json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": 0.2
            }
        });

        let url = format!("{}?key={key}", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or(ProviderError::EmptyResponse)
    }
}

// ── Tests ────────────────────────────────────────────────────────
