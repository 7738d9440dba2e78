//! Axum-based webhook gateway.
//!
//! One inbound surface: `POST /webhook` receives signed hosting-service
//! notifications, verifies authenticity, and acknowledges immediately —
//! dispatch runs on a spawned task so slow analyses never hold the
//! sender's connection. Body limits and request timeouts guard the
//! endpoint the same way as any public HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::analysis::AnalysisRunner;
use crate::config::Config;
use crate::dispatch::{AnalysisExecutor, Dispatcher, StaggerScheduler, WebhookPayload};
use crate::github::{CommentSink, GithubClient, RepoHost};
use crate::providers::{GeminiProvider, Provider};

/// Maximum request body size (1 MiB) — hosting-service payloads stay
/// well under this.
pub const MAX_BODY_SIZE: usize = 1_048_576;

/// Request timeout; the webhook path only parses and spawns.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Shared webhook secret; unset disables signature checking.
    pub webhook_secret: Option<Arc<str>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Verify a `sha256=<hex>` HMAC signature over the raw request body.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Run the HTTP gateway until the process is stopped.
pub async fn run_gateway(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    let webhook_secret: Option<Arc<str>> = config
        .gateway
        .webhook_secret
        .as_deref()
        .map(str::trim)
        .filter(|secret| !secret.is_empty())
        .map(Arc::from);

    // Capability clients are built once, with the configuration
    // injected here rather than read inside pipeline logic.
    let github = Arc::new(GithubClient::new(&config.github, config.quality.clone()));
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::new(
        config.model.api_key.clone(),
        config.model.model.clone(),
    ));
    let runner = Arc::new(AnalysisRunner::new(
        Arc::clone(&github) as Arc<dyn RepoHost>,
        Arc::clone(&github) as Arc<dyn CommentSink>,
        provider,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        StaggerScheduler::new(runner as Arc<dyn AnalysisExecutor>),
        Arc::clone(&github) as Arc<dyn RepoHost>,
        github as Arc<dyn CommentSink>,
    ));

    let state = AppState {
        dispatcher,
        webhook_secret: webhook_secret.clone(),
        started_at: chrono::Utc::now(),
    };

    println!("🦀 Mergewarden gateway listening on http://{display_addr}");
    println!("  POST /webhook  — hosting-service event notifications");
    println!("  GET  /health   — health check");
    if webhook_secret.is_some() {
        println!("  🔐 Signature verification: ACTIVE (X-Hub-Signature-256)");
    } else {
        println!("  ⚠️  Signature verification: DISABLED (no webhook secret configured)");
    }
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/webhook", post(handle_webhook))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

// ══════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════

/// GET /health — always public (no secrets leaked)
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "started_at": state.started_at.to_rfc3339(),
    }))
}

/// POST /webhook — inbound event notifications.
///
/// Acknowledges as soon as the payload is authenticated and parsed;
/// dispatch and every downstream pipeline run on spawned tasks.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // ── Signature (optional, recommended) ──
    if let Some(ref secret) = state.webhook_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, &body, signature) {
            tracing::warn!(
                "Webhook signature verification failed (signature: {})",
                if signature.is_empty() { "missing" } else { "invalid" }
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "Invalid signature"})),
            );
        }
    }

    // ── Event kind header ──
    let Some(event_kind) = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Missing X-GitHub-Event header"})),
        );
    };

    // ── Parse body ──
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "Webhook JSON parse error");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid JSON payload"})),
            );
        }
    };

    tracing::info!(event = %event_kind, "Received event");

    // Acknowledge now; dispatch independently.
    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        dispatcher.dispatch(&event_kind, payload).await;
    });

    (StatusCode::OK, Json(serde_json::json!({"status": "received"})))
}

// ── Tests ────────────────────────────────────────────────────────
