//! Per-program APR calculators
//!
//! Each reward program fetches its own opportunity slice and runs the
//! extractor at its granularity:
//!
//! - vault level: forwarded rewards (ERC20LOGPROCESSOR), fixed-rate (ERC20_FIX_APR)
//! - strategy level: Morpho lending, Steer/Sushi LP (pool resolved on-chain)
//!
//! A program that cannot fetch its inputs yields an empty map; the other
//! programs are unaffected.

use crate::rewards::debug::{AprDebugEvent, AprDebugLogger, DebugStage};
use crate::rewards::extractor::{extract, ExtractionTarget, TokenAllowlist};
use crate::rewards::matcher::parse_address;
use crate::sources::yearn_api::active_strategy_addresses;
use crate::sources::{OpportunityQuery, OpportunitySource, StrategyPoolReader};
use crate::types::{Opportunity, PoolType, RewardResult, YearnVault};
use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Results per vault address
pub type VaultResults = HashMap<String, Vec<RewardResult>>;

// ============================================
// PROGRAMS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardProgram {
    /// KAT forwarded straight to the vault
    Forwarded,
    /// Fixed-APR KAT campaigns on the vault
    FixedRate,
    /// Morpho lending strategies
    Morpho,
    /// Steer-managed Sushi LP strategies
    Steer,
}

impl RewardProgram {
    pub const ALL: [RewardProgram; 4] = [
        RewardProgram::Forwarded,
        RewardProgram::FixedRate,
        RewardProgram::Morpho,
        RewardProgram::Steer,
    ];

    pub fn pool_type(&self) -> PoolType {
        match self {
            RewardProgram::Forwarded => PoolType::Yearn,
            RewardProgram::FixedRate => PoolType::FixedRate,
            RewardProgram::Morpho => PoolType::Morpho,
            RewardProgram::Steer => PoolType::Sushi,
        }
    }

    pub fn query(&self) -> OpportunityQuery {
        match self {
            RewardProgram::Forwarded => OpportunityQuery::FORWARDED,
            RewardProgram::FixedRate => OpportunityQuery::FIXED_APR,
            RewardProgram::Morpho => OpportunityQuery::MORPHO,
            RewardProgram::Steer => OpportunityQuery::SUSHI,
        }
    }

    /// Strategy name substring for strategy-level programs
    pub fn strategy_filter(&self) -> Option<&'static str> {
        match self {
            RewardProgram::Morpho => Some("Morpho"),
            RewardProgram::Steer => Some("Steer"),
            _ => None,
        }
    }

    pub fn is_vault_level(&self) -> bool {
        self.strategy_filter().is_none()
    }
}

impl fmt::Display for RewardProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardProgram::Forwarded => write!(f, "Forwarded KAT"),
            RewardProgram::FixedRate => write!(f, "Fixed-rate KAT"),
            RewardProgram::Morpho => write!(f, "Morpho"),
            RewardProgram::Steer => write!(f, "Steer/Sushi"),
        }
    }
}

#[async_trait]
pub trait AprCalculator: Send + Sync {
    fn program(&self) -> RewardProgram;

    /// Never fails: upstream errors degrade to an empty map
    async fn calculate_vault_aprs(&self, vaults: &[YearnVault]) -> VaultResults;
}

async fn fetch_opportunities(
    source: &dyn OpportunitySource,
    program: RewardProgram,
) -> Option<Vec<Opportunity>> {
    match source.fetch_opportunities(program.query()).await {
        Ok(opportunities) => Some(opportunities),
        Err(e) => {
            warn!("⚠️  {} opportunities unavailable: {}", program, e);
            None
        }
    }
}

fn log_opportunity_fetch(debug: &AprDebugLogger, vault: &str, program: RewardProgram, count: usize) {
    debug.log(
        AprDebugEvent::new(DebugStage::OpportunityFetch)
            .vault(vault)
            .field("poolType", program.pool_type().to_string())
            .field("opportunities", count),
    );
}

// ============================================
// VAULT-LEVEL PROGRAMS
// ============================================

pub struct VaultRewardsCalculator {
    program: RewardProgram,
    source: Arc<dyn OpportunitySource>,
    allowlist: TokenAllowlist,
    debug: Arc<AprDebugLogger>,
}

impl VaultRewardsCalculator {
    pub fn new(
        program: RewardProgram,
        source: Arc<dyn OpportunitySource>,
        allowlist: TokenAllowlist,
        debug: Arc<AprDebugLogger>,
    ) -> Self {
        Self {
            program,
            source,
            allowlist,
            debug,
        }
    }

    /// Extract for each vault against an already fetched opportunity list
    pub fn compute(&self, vaults: &[YearnVault], opportunities: &[Opportunity]) -> VaultResults {
        let pool_type = self.program.pool_type();
        let mut out = HashMap::with_capacity(vaults.len());

        for vault in vaults {
            log_opportunity_fetch(&self.debug, &vault.address, self.program, opportunities.len());

            let target = ExtractionTarget::vault(vault);
            match extract(&target, opportunities, pool_type, &self.allowlist, &self.debug) {
                Ok(extraction) => {
                    out.insert(vault.address.clone(), extraction.into_results(&target, pool_type));
                }
                Err(e) => debug!("{}: skipping vault: {}", self.program, e),
            }
        }

        out
    }
}

#[async_trait]
impl AprCalculator for VaultRewardsCalculator {
    fn program(&self) -> RewardProgram {
        self.program
    }

    async fn calculate_vault_aprs(&self, vaults: &[YearnVault]) -> VaultResults {
        let Some(opportunities) = fetch_opportunities(self.source.as_ref(), self.program).await else {
            return HashMap::new();
        };

        let out = self.compute(vaults, &opportunities);
        info!("🎯 {}: {} vaults scored", self.program, out.len());
        out
    }
}

// ============================================
// STRATEGY-LEVEL PROGRAMS
// ============================================

/// (vault address, strategy address as upstream wrote it, parsed strategy)
pub type StrategyRef = (String, String, Address);

pub struct StrategyRewardsCalculator {
    program: RewardProgram,
    source: Arc<dyn OpportunitySource>,
    reader: Arc<dyn StrategyPoolReader>,
    allowlist: TokenAllowlist,
    debug: Arc<AprDebugLogger>,
}

impl StrategyRewardsCalculator {
    pub fn new(
        program: RewardProgram,
        source: Arc<dyn OpportunitySource>,
        reader: Arc<dyn StrategyPoolReader>,
        allowlist: TokenAllowlist,
        debug: Arc<AprDebugLogger>,
    ) -> Self {
        Self {
            program,
            source,
            reader,
            allowlist,
            debug,
        }
    }

    fn collect_strategies(&self, vaults: &[YearnVault]) -> Vec<StrategyRef> {
        let Some(filter) = self.program.strategy_filter() else {
            return Vec::new();
        };

        vaults
            .iter()
            .flat_map(|vault| {
                active_strategy_addresses(vault, filter)
                    .into_iter()
                    .filter_map(|s| parse_address(&s).map(|addr| (vault.address.clone(), s, addr)))
            })
            .collect()
    }

    async fn resolve_pools(&self, strategies: &[Address]) -> eyre::Result<HashMap<Address, Address>> {
        match self.program {
            RewardProgram::Morpho => self.reader.morpho_vaults(strategies).await,
            RewardProgram::Steer => self.reader.steer_pools(strategies).await,
            _ => Ok(HashMap::new()),
        }
    }

    /// Extract per strategy given resolved pools
    pub fn compute(
        &self,
        strategies: &[StrategyRef],
        pools: &HashMap<Address, Address>,
        opportunities: &[Opportunity],
    ) -> VaultResults {
        let pool_type = self.program.pool_type();
        let mut out: VaultResults = HashMap::new();

        for (vault_address, strategy_address, strategy) in strategies {
            let pool = pools
                .get(strategy)
                .map(|p| p.to_checksum(None))
                .unwrap_or_default();

            let target = ExtractionTarget::strategy(vault_address, strategy_address, &pool);
            match extract(&target, opportunities, pool_type, &self.allowlist, &self.debug) {
                Ok(extraction) => out
                    .entry(vault_address.clone())
                    .or_default()
                    .extend(extraction.into_results(&target, pool_type)),
                Err(e) => debug!("{}: skipping strategy: {}", self.program, e),
            }
        }

        out
    }
}

#[async_trait]
impl AprCalculator for StrategyRewardsCalculator {
    fn program(&self) -> RewardProgram {
        self.program
    }

    async fn calculate_vault_aprs(&self, vaults: &[YearnVault]) -> VaultResults {
        let strategies = self.collect_strategies(vaults);
        if strategies.is_empty() {
            return HashMap::new();
        }

        let mut unique: Vec<Address> = strategies.iter().map(|(_, _, addr)| *addr).collect();
        unique.sort();
        unique.dedup();

        let pools = match self.resolve_pools(&unique).await {
            Ok(pools) => pools,
            Err(e) => {
                warn!("⚠️  {} pool resolution failed: {}", self.program, e);
                return HashMap::new();
            }
        };

        let Some(opportunities) = fetch_opportunities(self.source.as_ref(), self.program).await else {
            return HashMap::new();
        };

        for (vault_address, _, _) in &strategies {
            log_opportunity_fetch(&self.debug, vault_address, self.program, opportunities.len());
        }

        let out = self.compute(&strategies, &pools, &opportunities);
        info!(
            "🎯 {}: {} strategies across {} vaults ({} pools resolved)",
            self.program,
            strategies.len(),
            out.len(),
            pools.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::merkl::{AprRecord, Campaign, RewardToken};
    use crate::types::yearn::StrategyDetails;
    use crate::types::{AprBreakdown, YearnStrategy};
    use eyre::eyre;
    use std::sync::Mutex;

    const VAULT: &str = "0x00000000000000000000000000000000000000aa";
    const STRATEGY: &str = "0x0000000000000000000000000000000000000001";
    const POOL: &str = "0x000000000000000000000000000000000000bbbb";
    const KAT: &str = "0x6E9C1F88a960fE63387eb4b71BC525a9313d8461";

    struct FakeMerkl {
        opportunities: Vec<Opportunity>,
        fail: bool,
        queries: Mutex<Vec<OpportunityQuery>>,
    }

    impl FakeMerkl {
        fn new(opportunities: Vec<Opportunity>) -> Self {
            Self {
                opportunities,
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl OpportunitySource for FakeMerkl {
        async fn fetch_opportunities(&self, query: OpportunityQuery) -> eyre::Result<Vec<Opportunity>> {
            self.queries.lock().unwrap().push(query);
            if self.fail {
                return Err(eyre!("merkl down"));
            }
            Ok(self.opportunities.clone())
        }
    }

    struct FakeReader {
        pools: HashMap<Address, Address>,
        fail: bool,
    }

    #[async_trait]
    impl StrategyPoolReader for FakeReader {
        async fn morpho_vaults(&self, _: &[Address]) -> eyre::Result<HashMap<Address, Address>> {
            if self.fail {
                return Err(eyre!("rpc down"));
            }
            Ok(self.pools.clone())
        }

        async fn steer_pools(&self, _: &[Address]) -> eyre::Result<HashMap<Address, Address>> {
            self.morpho_vaults(&[]).await
        }
    }

    fn opportunity(identifier: &str, apr: f64) -> Opportunity {
        Opportunity {
            identifier: identifier.to_string(),
            campaigns: Some(vec![Campaign {
                campaign_id: Some("0xc1".to_string()),
                reward_token: RewardToken {
                    address: KAT.to_string(),
                    symbol: "KAT".to_string(),
                    decimals: 18,
                },
                ..Default::default()
            }]),
            apr_record: Some(AprRecord {
                cumulated: Some(apr),
                breakdowns: vec![AprBreakdown {
                    identifier: "0xc1".to_string(),
                    value: Some(apr),
                }],
            }),
            ..Default::default()
        }
    }

    fn vault(strategy_name: &str) -> YearnVault {
        YearnVault {
            address: VAULT.to_string(),
            name: "vbUSDC yVault".to_string(),
            symbol: "yvvbUSDC".to_string(),
            strategies: vec![YearnStrategy {
                address: STRATEGY.to_string(),
                name: strategy_name.to_string(),
                status: Some("active".to_string()),
                details: Some(StrategyDetails {
                    total_debt: "1000".to_string(),
                    debt_ratio: Some(10_000.0),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn reader(fail: bool) -> Arc<FakeReader> {
        let mut pools = HashMap::new();
        pools.insert(STRATEGY.parse().unwrap(), POOL.parse().unwrap());
        Arc::new(FakeReader { pools, fail })
    }

    #[test]
    fn test_program_metadata() {
        assert!(RewardProgram::Forwarded.is_vault_level());
        assert!(!RewardProgram::Steer.is_vault_level());
        assert_eq!(RewardProgram::FixedRate.pool_type(), PoolType::FixedRate);
        assert_eq!(RewardProgram::Steer.query(), OpportunityQuery::SUSHI);
        assert_eq!(RewardProgram::Morpho.strategy_filter(), Some("Morpho"));
    }

    #[tokio::test]
    async fn test_vault_level_results() {
        let merkl = Arc::new(FakeMerkl::new(vec![opportunity(VAULT, 12.5)]));
        let calc = VaultRewardsCalculator::new(
            RewardProgram::Forwarded,
            merkl.clone(),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );

        let out = calc.calculate_vault_aprs(&[vault("Morpho Gauntlet")]).await;
        let results = &out[VAULT];
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].breakdown.apr, 12.5);
        assert_eq!(results[0].pool_type, PoolType::Yearn);
        assert_eq!(merkl.queries.lock().unwrap()[0], OpportunityQuery::FORWARDED);
    }

    #[tokio::test]
    async fn test_vault_level_placeholder_when_unmatched() {
        let merkl = Arc::new(FakeMerkl::new(vec![]));
        let calc = VaultRewardsCalculator::new(
            RewardProgram::FixedRate,
            merkl,
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );

        let out = calc.calculate_vault_aprs(&[vault("Morpho Gauntlet")]).await;
        assert_eq!(out[VAULT].len(), 1);
        assert_eq!(out[VAULT][0].breakdown.apr, 0.0);
        assert_eq!(out[VAULT][0].pool_type, PoolType::FixedRate);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_empty() {
        let calc = VaultRewardsCalculator::new(
            RewardProgram::Forwarded,
            Arc::new(FakeMerkl::failing()),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );
        assert!(calc.calculate_vault_aprs(&[vault("x")]).await.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_level_results() {
        let calc = StrategyRewardsCalculator::new(
            RewardProgram::Morpho,
            Arc::new(FakeMerkl::new(vec![opportunity(POOL, 8.0)])),
            reader(false),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );

        let out = calc.calculate_vault_aprs(&[vault("Morpho Gauntlet vbUSDC")]).await;
        let results = &out[VAULT];
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].address, STRATEGY);
        assert_eq!(results[0].breakdown.apr, 8.0);
        assert_eq!(
            results[0].pool_address.as_deref().map(str::to_lowercase).as_deref(),
            Some(POOL)
        );
    }

    #[tokio::test]
    async fn test_strategy_filter_by_name() {
        let calc = StrategyRewardsCalculator::new(
            RewardProgram::Steer,
            Arc::new(FakeMerkl::new(vec![opportunity(POOL, 8.0)])),
            reader(false),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );

        // no Steer strategy in this vault
        let out = calc.calculate_vault_aprs(&[vault("Morpho Gauntlet vbUSDC")]).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_reader_failure_is_empty() {
        let calc = StrategyRewardsCalculator::new(
            RewardProgram::Morpho,
            Arc::new(FakeMerkl::new(vec![opportunity(POOL, 8.0)])),
            reader(true),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );
        assert!(calc.calculate_vault_aprs(&[vault("Morpho Gauntlet")]).await.is_empty());
    }

    #[test]
    fn test_unresolved_pool_is_skipped() {
        let calc = StrategyRewardsCalculator::new(
            RewardProgram::Morpho,
            Arc::new(FakeMerkl::new(vec![])),
            reader(false),
            TokenAllowlist::wrapped_kat(),
            Arc::new(AprDebugLogger::disabled()),
        );

        let strategies = calc.collect_strategies(&[vault("Morpho Gauntlet")]);
        assert_eq!(strategies.len(), 1);

        let out = calc.compute(&strategies, &HashMap::new(), &[opportunity(POOL, 1.0)]);
        assert!(out.is_empty());
    }
}
