//! Vault Aggregator
//!
//! Folds every program's results for one vault into the served record:
//! strategy metadata, per-program totals, static yields and points.
//!
//! Program results are percentage points; everything written to
//! `apr.extra` is a fraction. The `/100` happens here and only here.

use crate::aggregate::points::SteerPointsCalculator;
use crate::config::{FixedRatePolicy, StaticYields};
use crate::error::AggregateError;
use crate::rewards::debug::{AprDebugEvent, AprDebugLogger, DebugStage};
use crate::rewards::matcher::{addresses_equal, parse_address};
use crate::types::{
    PoolType, RewardResult, StrategyRewardToken, TokenBreakdown, YearnStrategy, YearnVault,
    YearnVaultApr, YearnVaultExtra,
};
use serde::Serialize;
use tracing::error;

// ============================================
// CACHE RECORD
// ============================================

/// Placeholder for vaults no program produced anything for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyVaultApr {
    pub name: String,
    pub apr: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pools: Option<Vec<String>>,
    pub breakdown: Vec<TokenBreakdown>,
}

impl EmptyVaultApr {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            apr: 0.0,
            pools: None,
            breakdown: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VaultAprRecord {
    Aggregated(YearnVault),
    Empty(EmptyVaultApr),
}

impl VaultAprRecord {
    pub fn extra(&self) -> Option<&YearnVaultExtra> {
        match self {
            VaultAprRecord::Aggregated(vault) => vault.apr.as_ref()?.extra.as_ref(),
            VaultAprRecord::Empty(_) => None,
        }
    }

    pub fn is_empty_record(&self) -> bool {
        matches!(self, VaultAprRecord::Empty(_))
    }
}

// ============================================
// AGGREGATOR
// ============================================

fn sum_fraction<'a>(results: impl Iterator<Item = &'a RewardResult>) -> f64 {
    results.map(|r| r.breakdown.apr / 100.0).sum()
}

pub struct VaultAggregator {
    static_yields: StaticYields,
    points: SteerPointsCalculator,
    fixed_rate_policy: FixedRatePolicy,
    token_fdv: f64,
}

impl VaultAggregator {
    pub fn new(static_yields: StaticYields, fixed_rate_policy: FixedRatePolicy, token_fdv: f64) -> Self {
        let points = SteerPointsCalculator::new(&static_yields.steer_points.0);
        Self {
            static_yields,
            points,
            fixed_rate_policy,
            token_fdv,
        }
    }

    /// Attach reward metadata to an active strategy; returns its rewards APR (fraction)
    fn enrich_strategy(&self, strategy: &mut YearnStrategy, results: &[RewardResult]) -> f64 {
        if !strategy.is_active() || strategy.address.is_empty() {
            return 0.0;
        }

        let matching: Vec<&RewardResult> = results
            .iter()
            .filter(|r| r.is_strategy_level() && addresses_equal(&r.address, &strategy.address))
            .collect();

        if let Some(first) = matching.iter().find(|r| !r.breakdown.token.address.is_empty()) {
            let token = &first.breakdown.token;
            strategy.reward_token = Some(StrategyRewardToken {
                address: token.address.clone(),
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                assumed_fdv: self.token_fdv,
            });
            strategy.underlying_contract = first.pool_address.clone();
            strategy.assumed_fdv = Some(self.token_fdv);
        }

        sum_fraction(matching.into_iter())
    }

    pub fn aggregate(&self, vault: &YearnVault, results: &[RewardResult]) -> Result<YearnVault, AggregateError> {
        if parse_address(&vault.address).is_none() {
            return Err(AggregateError::InvalidVaultAddress(vault.address.clone()));
        }

        let mut strategies = vault.strategies.clone();
        let mut strategy_rewards = 0.0;
        for strategy in &mut strategies {
            let apr = self.enrich_strategy(strategy, results);
            strategy_rewards += apr * strategy.debt_fraction();
        }

        let vault_level = |pool_type: PoolType| {
            sum_fraction(
                results
                    .iter()
                    .filter(move |r| !r.is_strategy_level() && r.pool_type == pool_type),
            )
        };
        let app_rewards = vault_level(PoolType::Yearn);
        let fixed_rate = match self.fixed_rate_policy {
            FixedRatePolicy::Disabled => 0.0,
            _ => vault_level(PoolType::FixedRate),
        };

        let mut apr = vault.apr.clone().unwrap_or_default();
        let mut extra = apr.extra.take().unwrap_or_default();
        extra.katana_rewards_apr = Some(strategy_rewards);
        extra.katana_app_rewards_apr = Some(app_rewards);
        extra.fixed_rate_katana_rewards = Some(fixed_rate);
        extra.katana_bonus_apy = Some(self.static_yields.bonus_apy(&vault.symbol));
        extra.katana_native_yield = Some(self.static_yields.native_yield(&vault.symbol));
        extra.steer_points_per_dollar = Some(self.points.calculate_for_vault(vault));
        apr.extra = Some(extra);

        if self.fixed_rate_policy == FixedRatePolicy::IncludeInNetApr {
            apr.net_apr = Some(apr.net_apr.unwrap_or(0.0) + fixed_rate);
        }

        Ok(YearnVault {
            address: vault.address.clone(),
            symbol: vault.symbol.clone(),
            name: vault.name.clone(),
            chain_id: vault.chain_id,
            strategies,
            apr: Some(apr),
            tvl: vault.tvl.clone(),
            token: vault.token.clone(),
        })
    }

    /// Cache record for one vault. Never fails: errors become the empty record.
    pub fn record_for(
        &self,
        vault: &YearnVault,
        results: &[RewardResult],
        debug: &AprDebugLogger,
    ) -> VaultAprRecord {
        if results.is_empty() {
            debug.log(
                AprDebugEvent::new(DebugStage::Fallback)
                    .vault(vault.address.as_str())
                    .reason("empty_results_after_calculation"),
            );
            return VaultAprRecord::Empty(EmptyVaultApr::new(&vault.name));
        }

        match self.aggregate(vault, results) {
            Ok(aggregated) => {
                debug.log(
                    AprDebugEvent::new(DebugStage::ResultSummary)
                        .vault(vault.address.as_str())
                        .reason("vault_results_aggregated")
                        .field("results", results.len()),
                );
                VaultAprRecord::Aggregated(aggregated)
            }
            Err(e) => {
                error!("❌ Failed to aggregate {} ({}): {}", vault.symbol, vault.address, e);
                VaultAprRecord::Empty(EmptyVaultApr::new(&vault.name))
            }
        }
    }
}
