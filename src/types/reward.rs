//! Reward attribution output types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reward program a result was produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    #[serde(rename = "yearn")]
    Yearn,
    #[serde(rename = "fixed rate")]
    FixedRate,
    #[serde(rename = "morpho")]
    Morpho,
    #[serde(rename = "sushi")]
    Sushi,
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::Yearn => write!(f, "yearn"),
            PoolType::FixedRate => write!(f, "fixed rate"),
            PoolType::Morpho => write!(f, "morpho"),
            PoolType::Sushi => write!(f, "sushi"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

/// One campaign's contribution. `apr` is in percentage points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub apr: f64,
    pub token: BreakdownToken,
    pub weight: f64,
}

impl TokenBreakdown {
    /// Zero contribution used when nothing matched
    pub fn zero() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardResult {
    /// Vault address for vault-level programs, strategy address otherwise
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Underlying pool for strategy-level programs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_address: Option<String>,

    pub pool_type: PoolType,
    pub breakdown: TokenBreakdown,
}

impl RewardResult {
    pub fn is_strategy_level(&self) -> bool {
        self.pool_address.is_some()
    }
}
