//! `GET /api/vaults`
//!
//! Serves the whole cache. CDN-friendly cache headers on success,
//! `no-store` on failure, stale snapshots flagged in headers.

use crate::cache::CacheRead;
use crate::error::CacheError;
use crate::server::AppState;
use axum::extract::{Query, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub const REFRESH_SECRET_HEADER: &str = "x-refresh-secret";
pub const CACHE_CONTROL_OK: &str = "public, max-age=0, s-maxage=900, stale-while-revalidate=600";
const CACHE_CONTROL_PREFLIGHT: &str = "public, max-age=0";

static X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");
static X_CACHE_ERROR: HeaderName = HeaderName::from_static("x-cache-error");

#[derive(Debug, Default, Deserialize)]
pub struct VaultsQuery {
    pub refresh_secret: Option<String>,
}

fn cors_headers(cache_control: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, OPTIONS"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers
}

/// Byte-wise compare without an early exit
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn provided_secret<'a>(headers: &'a HeaderMap, query: &'a VaultsQuery) -> Option<&'a str> {
    headers
        .get(REFRESH_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.refresh_secret.as_deref())
}

fn ok_response(read: CacheRead) -> Response {
    let mut headers = cors_headers(CACHE_CONTROL_OK);

    let last_modified = read.generated_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if read.is_stale() {
        headers.insert(X_CACHE_STATUS.clone(), HeaderValue::from_static("stale"));
        // header values must be visible ASCII
        let printable: String = read
            .stale_error
            .as_deref()
            .unwrap_or("")
            .chars()
            .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
            .collect();
        if let Ok(value) = HeaderValue::from_str(&printable) {
            headers.insert(X_CACHE_ERROR.clone(), value);
        }
    }
    (StatusCode::OK, headers, Json(read.data.as_ref())).into_response()
}

fn error_response(err: CacheError) -> Response {
    error!("❌ Failed to serve vaults: {}", err);
    (
        StatusCode::BAD_GATEWAY,
        cors_headers("no-store"),
        Json(json!({
            "message": "An error occurred while fetching data.",
            "error": err.to_string(),
        })),
    )
        .into_response()
}

pub async fn get_vaults(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<VaultsQuery>,
) -> Response {
    let result = match provided_secret(&headers, &query) {
        Some(provided) => {
            let authorized = state
                .refresh_secret
                .as_deref()
                .is_some_and(|expected| !expected.is_empty() && secrets_match(provided, expected));
            if !authorized {
                warn!("⚠️  Refresh rejected: bad or unconfigured secret");
                return (
                    StatusCode::UNAUTHORIZED,
                    cors_headers(CACHE_CONTROL_PREFLIGHT),
                    Json(json!({ "error": "unauthorized" })),
                )
                    .into_response();
            }
            state.cache.force_refresh().await
        }
        None => state.cache.get().await,
    };

    match result {
        Ok(read) => ok_response(read),
        Err(e) => error_response(e),
    }
}

pub async fn vaults_preflight() -> Response {
    (StatusCode::NO_CONTENT, cors_headers(CACHE_CONTROL_PREFLIGHT)).into_response()
}
