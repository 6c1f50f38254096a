//! HTTP surface
//!
//! - `GET /api/health`
//! - `GET|OPTIONS /api/vaults`
//! - `POST /api/webhook`

pub mod signature;
pub mod vaults;
pub mod webhook;

use webhook::{KongOutput, WebhookError};

use crate::cache::AprCache;
use crate::config::{Config, FixedRatePolicy};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use eyre::Result;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const SIGNATURE_HEADER: &str = "kong-signature";

pub struct AppState {
    pub cache: AprCache,
    pub webhook_secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub fixed_rate_policy: FixedRatePolicy,
}

impl AppState {
    pub fn new(cache: AprCache, config: &Config) -> Self {
        Self {
            cache,
            webhook_secret: config.webhook_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            fixed_rate_policy: config.fixed_rate_policy,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/vaults", get(vaults::get_vaults).options(vaults::vaults_preflight))
        .route("/api/webhook", post(kong_webhook))
        .with_state(Arc::new(state))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn kong_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<KongOutput>>, WebhookError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outputs = webhook::process(
        &state.cache,
        state.webhook_secret.as_deref(),
        signature,
        &body,
        state.fixed_rate_policy,
        Utc::now().timestamp(),
    )
    .await?;
    Ok(Json(outputs))
}

/// Bind and serve until Ctrl+C
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 Shutdown signal received");
        })
        .await?;

    Ok(())
}
