//! Configuration loading.
//!
//! A TOML file provides the base configuration; environment variables
//! override the secrets so deployments never have to write credentials
//! to disk. The loaded [`Config`] is injected into the capability
//! clients at construction — business logic never reads the
//! environment ad hoc.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ── Sections ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub github: GithubConfig,
    pub model: ModelConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Shared secret for `X-Hub-Signature-256` verification. Unset
    /// disables signature checking.
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            webhook_secret: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// REST API root.
    pub api_url: String,
    /// Access token presented as a bearer credential. App-level JWT
    /// minting and installation-token exchange happen outside this
    /// service.
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model API key.
    pub api_key: Option<String>,
    /// Model id to query.
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".into(),
        }
    }
}

/// Commands the quality pipeline runs against the local checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Lint command and arguments.
    pub lint_command: Vec<String>,
    /// Security-scan command and arguments.
    pub scan_command: Vec<String>,
    /// Directory the commands run in.
    pub workdir: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            lint_command: vec!["flake8".into(), ".".into()],
            scan_command: vec!["bandit".into(), "-r".into(), ".".into()],
            workdir: ".".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    /// Load from an optional TOML file, then apply environment
    /// overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(token) = env_non_empty("MERGEWARDEN_GITHUB_TOKEN").or_else(|| env_non_empty("GITHUB_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(key) = env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("GOOGLE_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(secret) = env_non_empty("MERGEWARDEN_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(secret);
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// ── Tests ────────────────────────────────────────────────────────
