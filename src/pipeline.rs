//! APR Pipeline
//!
//! One full rebuild: fetch the vault list, run every reward program
//! concurrently, aggregate each vault. Produces a complete [`AprDataCache`]
//! or an error; never a partial map.

use crate::aggregate::{VaultAggregator, VaultAprRecord};
use crate::config::Config;
use crate::error::CacheError;
use crate::rewards::{
    AprCalculator, AprDebugLogger, RewardProgram, StrategyRewardsCalculator, TokenAllowlist,
    VaultResults, VaultRewardsCalculator,
};
use crate::sources::{MerklApi, MulticallReader, OpportunitySource, StrategyPoolReader, VaultSource, YearnApi};
use crate::types::RewardResult;
use async_trait::async_trait;
use eyre::Result;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

// ============================================
// CACHE DATA
// ============================================

/// Vault address (as upstream wrote it) -> record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AprDataCache {
    pub vaults: BTreeMap<String, VaultAprRecord>,
}

impl AprDataCache {
    /// Exact key first, then lowercased, then any case
    pub fn get(&self, address: &str) -> Option<&VaultAprRecord> {
        self.vaults
            .get(address)
            .or_else(|| self.vaults.get(&address.to_lowercase()))
            .or_else(|| {
                self.vaults
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(address))
                    .map(|(_, v)| v)
            })
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

/// Anything that can produce a full cache
#[async_trait]
pub trait SnapshotBuilder: Send + Sync {
    async fn build(&self) -> Result<AprDataCache, CacheError>;
}

// ============================================
// PIPELINE
// ============================================

pub struct AprPipeline {
    vaults: Arc<dyn VaultSource>,
    calculators: Vec<Arc<dyn AprCalculator>>,
    aggregator: VaultAggregator,
    debug: Arc<AprDebugLogger>,
}

impl AprPipeline {
    pub fn new(
        vaults: Arc<dyn VaultSource>,
        calculators: Vec<Arc<dyn AprCalculator>>,
        aggregator: VaultAggregator,
        debug: Arc<AprDebugLogger>,
    ) -> Self {
        Self {
            vaults,
            calculators,
            aggregator,
            debug,
        }
    }

    /// Wire the live sources from configuration
    pub fn from_config(config: &Config, debug: Arc<AprDebugLogger>) -> Result<Self> {
        let vaults: Arc<dyn VaultSource> = Arc::new(YearnApi::new(
            &config.ydaemon_base_uri,
            config.chain_id,
            config.http_timeout(),
            debug.clone(),
        )?);
        let merkl: Arc<dyn OpportunitySource> = Arc::new(MerklApi::new(
            &config.merkl_base_uri,
            config.chain_id,
            config.http_timeout(),
            debug.clone(),
        )?);
        let reader: Arc<dyn StrategyPoolReader> =
            Arc::new(MulticallReader::new(config.rpc_url.clone(), config.multicall()?));

        let allowlist = TokenAllowlist::new(&config.reward_tokens);
        if allowlist.is_empty() {
            warn!("⚠️  No valid reward token addresses; every program will report 0");
        } else {
            info!("🪙 Reward token allowlist: {} tokens", allowlist.len());
        }
        let aggregator = VaultAggregator::new(
            config.load_static_yields()?,
            config.fixed_rate_policy,
            config.katana_token_fdv,
        );

        let calculators = Self::calculators(config, merkl, reader, allowlist, debug.clone());
        Ok(Self::new(vaults, calculators, aggregator, debug))
    }

    fn calculators(
        config: &Config,
        merkl: Arc<dyn OpportunitySource>,
        reader: Arc<dyn StrategyPoolReader>,
        allowlist: TokenAllowlist,
        debug: Arc<AprDebugLogger>,
    ) -> Vec<Arc<dyn AprCalculator>> {
        RewardProgram::ALL
            .iter()
            .filter(|p| **p != RewardProgram::FixedRate || config.fixed_rate_policy.is_enabled())
            .map(|program| -> Arc<dyn AprCalculator> {
                if program.is_vault_level() {
                    Arc::new(VaultRewardsCalculator::new(
                        *program,
                        merkl.clone(),
                        allowlist.clone(),
                        debug.clone(),
                    ))
                } else {
                    Arc::new(StrategyRewardsCalculator::new(
                        *program,
                        merkl.clone(),
                        reader.clone(),
                        allowlist.clone(),
                        debug.clone(),
                    ))
                }
            })
            .collect()
    }

    pub fn programs(&self) -> Vec<RewardProgram> {
        self.calculators.iter().map(|c| c.program()).collect()
    }
}

fn results_for(address: &str, program_results: &[VaultResults]) -> Vec<RewardResult> {
    program_results
        .iter()
        .filter_map(|m| m.get(address))
        .flat_map(|r| r.iter().cloned())
        .collect()
}

#[async_trait]
impl SnapshotBuilder for AprPipeline {
    async fn build(&self) -> Result<AprDataCache, CacheError> {
        let start = Instant::now();

        let vaults = self
            .vaults
            .fetch_vaults()
            .await
            .map_err(|e| CacheError::VaultFetch(e.to_string()))?;
        if vaults.is_empty() {
            return Err(CacheError::NoVaults);
        }

        // every program at once; each one degrades on its own
        let program_results: Vec<VaultResults> = join_all(
            self.calculators
                .iter()
                .map(|c| c.calculate_vault_aprs(&vaults)),
        )
        .await;

        let mut cache = AprDataCache::default();
        let mut fallbacks = 0;
        for vault in &vaults {
            let results = results_for(&vault.address, &program_results);
            let record = self.aggregator.record_for(vault, &results, &self.debug);
            if record.is_empty_record() {
                fallbacks += 1;
            }
            cache.vaults.insert(vault.address.clone(), record);
        }

        if fallbacks > 0 {
            warn!("⚠️  {} of {} vaults fell back to the empty record", fallbacks, vaults.len());
        }
        info!(
            "✅ APR cache rebuilt: {} vaults, {} programs in {:?}",
            cache.len(),
            self.calculators.len(),
            start.elapsed()
        );
        Ok(cache)
    }
}
