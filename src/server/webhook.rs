//! Kong batch webhook
//!
//! Kong posts a list of vault addresses at a block; we answer with one row
//! per vault per APR component, read straight from the cache.

use crate::cache::AprCache;
use crate::config::FixedRatePolicy;
use crate::error::CacheError;
use crate::pipeline::AprDataCache;
use crate::server::signature::{verify_signature, SignatureError};
use crate::types::YearnVaultExtra;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_LABEL: &str = "katana-apr";

type Component = (&'static str, fn(&YearnVaultExtra) -> Option<f64>);

const COMPONENTS: [Component; 5] = [
    ("katanaAppRewardsAPR", |e| e.katana_app_rewards_apr),
    ("FixedRateKatanaRewards", |e| e.fixed_rate_katana_rewards),
    ("katanaBonusAPY", |e| e.katana_bonus_apy),
    ("katanaNativeYield", |e| e.katana_native_yield),
    ("steerPointsPerDollar", |e| e.steer_points_per_dollar),
];

// ============================================
// PAYLOAD
// ============================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KongBatchWebhook {
    #[serde(default)]
    pub abi_path: String,
    pub chain_id: u64,
    #[serde(deserialize_with = "block_value")]
    pub block_number: String,
    #[serde(deserialize_with = "block_value")]
    pub block_time: String,
    #[serde(default)]
    pub subscription: Subscription,
    pub vaults: Vec<String>,
}

impl KongBatchWebhook {
    pub fn label(&self) -> &str {
        self.subscription
            .labels
            .first()
            .map(String::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LABEL)
    }
}

/// Block number / time arrive as integers or decimal strings
fn block_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n.to_string()),
        Raw::Text(s) => s
            .trim()
            .parse::<u64>()
            .map(|n| n.to_string())
            .map_err(|_| de::Error::custom(format!("not a block value: {:?}", s))),
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KongOutput {
    pub chain_id: u64,
    pub address: String,
    pub label: String,
    pub component: String,
    pub value: f64,
    pub block_number: String,
    pub block_time: String,
}

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret not configured")]
    SecretNotConfigured,

    #[error("missing signature")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid payload")]
    InvalidPayload(#[source] serde_json::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::SecretNotConfigured | WebhookError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::MissingSignature | WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            WebhookError::Cache(e) => error!("❌ Webhook error: {}", e),
            WebhookError::InvalidPayload(e) => warn!("⚠️  Webhook payload rejected: {}", e),
            _ => warn!("⚠️  Webhook rejected: {}", self),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ============================================
// HANDLING
// ============================================

pub fn parse_payload(body: &[u8]) -> Result<KongBatchWebhook, WebhookError> {
    serde_json::from_slice(body).map_err(WebhookError::InvalidPayload)
}

/// Rows for every requested vault present in the cache
pub fn build_outputs(hook: &KongBatchWebhook, cache: &AprDataCache, policy: FixedRatePolicy) -> Vec<KongOutput> {
    let label = hook.label();
    let mut outputs = Vec::with_capacity(hook.vaults.len() * (COMPONENTS.len() + 2));

    for address in &hook.vaults {
        let Some(record) = cache.get(address) else {
            continue;
        };
        let extra = record.extra().cloned().unwrap_or_default();

        let row = |component: &str, value: f64| KongOutput {
            chain_id: hook.chain_id,
            address: address.clone(),
            label: label.to_string(),
            component: component.to_string(),
            value,
            block_number: hook.block_number.clone(),
            block_time: hook.block_time.clone(),
        };

        for (component, value) in COMPONENTS {
            outputs.push(row(component, value(&extra).unwrap_or(0.0)));
        }

        let fixed = if policy.is_enabled() {
            extra.fixed_rate_katana_rewards.unwrap_or(0.0)
        } else {
            0.0
        };
        let net_apr =
            extra.katana_app_rewards_apr.unwrap_or(0.0) + fixed + extra.katana_native_yield.unwrap_or(0.0);

        outputs.push(row("netAPR", net_apr));
        outputs.push(row("netAPY", extra.katana_bonus_apy.unwrap_or(0.0)));
    }

    outputs
}

/// Verify, parse and answer one delivery
pub async fn process(
    cache: &AprCache,
    secret: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    policy: FixedRatePolicy,
    now: i64,
) -> Result<Vec<KongOutput>, WebhookError> {
    let secret = secret.filter(|s| !s.is_empty()).ok_or(WebhookError::SecretNotConfigured)?;
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    verify_signature(signature, body, secret, now)?;

    let hook = parse_payload(body)?;
    debug!(
        "Kong batch: subscription {} ({}), {} vaults at block {}",
        hook.subscription.id,
        hook.abi_path,
        hook.vaults.len(),
        hook.block_number
    );
    if hook.vaults.is_empty() {
        return Ok(Vec::new());
    }

    let read = cache.get().await?;
    Ok(build_outputs(&hook, &read.data, policy))
}
