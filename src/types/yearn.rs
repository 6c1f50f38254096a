//! yDaemon vault models
//!
//! Mirrors the JSON returned by `GET /vaults/katana`. Fields the pipeline
//! never reads (fees, points, price-per-share history) are carried through as
//! raw JSON so the served records keep the upstream shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================
// VAULT
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearnVault {
    pub address: String,

    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "chainID", default)]
    pub chain_id: u64,

    #[serde(default)]
    pub strategies: Vec<YearnStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apr: Option<YearnVaultApr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvl: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<VaultToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultToken {
    pub address: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub symbol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearnVaultApr {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(rename = "netAPR", default, skip_serializing_if = "Option::is_none")]
    pub net_apr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Value>,

    #[serde(rename = "pricePerShare", default, skip_serializing_if = "Option::is_none")]
    pub price_per_share: Option<Value>,

    #[serde(rename = "forwardAPR", default, skip_serializing_if = "Option::is_none")]
    pub forward_apr: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<YearnVaultExtra>,
}

/// Named APR components. All values are fractional rates (0.12 = 12%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearnVaultExtra {
    /// Legacy debt-weighted sum of strategy-level rewards
    #[serde(rename = "katanaRewardsAPR", default, skip_serializing_if = "Option::is_none")]
    pub katana_rewards_apr: Option<f64>,

    #[serde(rename = "katanaAppRewardsAPR", default, skip_serializing_if = "Option::is_none")]
    pub katana_app_rewards_apr: Option<f64>,

    #[serde(rename = "FixedRateKatanaRewards", default, skip_serializing_if = "Option::is_none")]
    pub fixed_rate_katana_rewards: Option<f64>,

    #[serde(rename = "katanaBonusAPY", default, skip_serializing_if = "Option::is_none")]
    pub katana_bonus_apy: Option<f64>,

    #[serde(rename = "extrinsicYield", default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_yield: Option<f64>,

    #[serde(rename = "katanaNativeYield", default, skip_serializing_if = "Option::is_none")]
    pub katana_native_yield: Option<f64>,

    #[serde(rename = "steerPointsPerDollar", default, skip_serializing_if = "Option::is_none")]
    pub steer_points_per_dollar: Option<f64>,

    /// Upstream keys we do not compute, passed through untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

// ============================================
// STRATEGY
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearnStrategy {
    pub address: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "netAPR", default, skip_serializing_if = "Option::is_none")]
    pub net_apr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StrategyDetails>,

    #[serde(rename = "rewardToken", default, skip_serializing_if = "Option::is_none")]
    pub reward_token: Option<StrategyRewardToken>,

    #[serde(rename = "underlyingContract", default, skip_serializing_if = "Option::is_none")]
    pub underlying_contract: Option<String>,

    #[serde(rename = "assumedFDV", default, skip_serializing_if = "Option::is_none")]
    pub assumed_fdv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetails {
    #[serde(default)]
    pub total_debt: String,

    #[serde(default)]
    pub total_gain: String,

    #[serde(default)]
    pub total_loss: String,

    #[serde(default)]
    pub last_report: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_fee: Option<f64>,

    /// Basis points, 0..=10000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyRewardToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,

    #[serde(rename = "assumedFDV")]
    pub assumed_fdv: f64,
}

impl YearnStrategy {
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("active"))
            .unwrap_or(false)
    }

    /// True when `totalDebt` is set and non-zero
    pub fn has_debt(&self) -> bool {
        match self.details.as_ref() {
            Some(d) => !matches!(d.total_debt.trim(), "" | "0" | "0x0"),
            None => false,
        }
    }

    /// Parsed `totalDebt`, 0 when missing or unparseable
    pub fn total_debt(&self) -> f64 {
        self.details
            .as_ref()
            .and_then(|d| d.total_debt.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Debt ratio as a fraction clamped to [0, 1]
    pub fn debt_fraction(&self) -> f64 {
        let bps = self.details.as_ref().and_then(|d| d.debt_ratio).unwrap_or(0.0);
        if !bps.is_finite() {
            return 0.0;
        }
        (bps / 10_000.0).clamp(0.0, 1.0)
    }
}
