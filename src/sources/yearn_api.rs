//! yDaemon vault source
//!
//! API: {YDAEMON_BASE_URI}/vaults/katana?chainIDs=747474&strategiesDetails=withDetails&...

use crate::rewards::debug::{AprDebugEvent, AprDebugLogger, DebugStage};
use crate::types::YearnVault;
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Upper bound on vaults per request
const VAULT_LIMIT: u32 = 2500;

#[async_trait]
pub trait VaultSource: Send + Sync {
    async fn fetch_vaults(&self) -> Result<Vec<YearnVault>>;
}

pub struct YearnApi {
    http_client: Client,
    base_url: String,
    chain_id: u64,
    debug: Arc<AprDebugLogger>,
}

impl YearnApi {
    pub fn new(
        base_url: &str,
        chain_id: u64,
        timeout: Duration,
        debug: Arc<AprDebugLogger>,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            debug,
        })
    }

    fn vaults_url(&self) -> String {
        format!("{}/vaults/katana", self.base_url)
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("hideAlways", "true".to_string()),
            ("orderBy", "featuringScore".to_string()),
            ("orderDirection", "desc".to_string()),
            ("strategiesDetails", "withDetails".to_string()),
            ("strategiesCondition", "inQueue".to_string()),
            ("chainIDs", self.chain_id.to_string()),
            ("limit", VAULT_LIMIT.to_string()),
        ]
    }
}

#[async_trait]
impl VaultSource for YearnApi {
    async fn fetch_vaults(&self) -> Result<Vec<YearnVault>> {
        let start = Instant::now();

        let response = self
            .http_client
            .get(self.vaults_url())
            .query(&self.query())
            .send()
            .await
            .map_err(|e| eyre!("yDaemon request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(eyre!("yDaemon returned HTTP {}", response.status()));
        }

        let vaults: Vec<YearnVault> = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse yDaemon vaults: {}", e))?;

        for vault in &vaults {
            self.debug.log(
                AprDebugEvent::new(DebugStage::VaultFetch)
                    .vault(vault.address.as_str())
                    .field("symbol", vault.symbol.as_str())
                    .field("strategies", vault.strategies.len()),
            );
        }

        info!("📦 yDaemon: {} vaults in {:?}", vaults.len(), start.elapsed());
        Ok(vaults)
    }
}

// ============================================
// VAULT HELPERS
// ============================================

pub fn vault_by_address<'a>(vaults: &'a [YearnVault], address: &str) -> Option<&'a YearnVault> {
    vaults.iter().find(|v| v.address.eq_ignore_ascii_case(address))
}

/// Active (debt-holding) strategies whose name contains `name_filter`
pub fn active_strategy_addresses(vault: &YearnVault, name_filter: &str) -> Vec<String> {
    let addresses: Vec<String> = vault
        .strategies
        .iter()
        .filter(|s| s.name.contains(name_filter) && s.has_debt())
        .map(|s| s.address.clone())
        .collect();

    debug!(
        "{}: {} active '{}' strategies",
        vault.symbol,
        addresses.len(),
        name_filter
    );
    addresses
}

/// Vault `netAPR`, 0 when missing
pub fn auto_compounded_apy(vault: &YearnVault) -> f64 {
    vault.apr.as_ref().and_then(|a| a.net_apr).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::yearn::StrategyDetails;
    use crate::types::{YearnStrategy, YearnVaultApr};

    fn strategy(name: &str, debt: &str) -> YearnStrategy {
        YearnStrategy {
            address: format!("0x{:0>40}", name.len()),
            name: name.to_string(),
            status: Some("active".to_string()),
            details: Some(StrategyDetails {
                total_debt: debt.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn vault() -> YearnVault {
        YearnVault {
            address: "0xE007CA01894c863d7898045ed5A3B4Abf0b18f37".to_string(),
            symbol: "yvvbUSDC".to_string(),
            strategies: vec![
                strategy("Morpho Gauntlet vbUSDC", "100"),
                strategy("Morpho Steakhouse vbUSDC", "0"),
                strategy("Steer AUSD-vbUSDC LP", "5"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_vault_by_address_case_insensitive() {
        let vaults = vec![vault()];
        assert!(vault_by_address(&vaults, "0xe007ca01894c863d7898045ed5a3b4abf0b18f37").is_some());
        assert!(vault_by_address(&vaults, "0x0000000000000000000000000000000000000001").is_none());
    }

    #[test]
    fn test_active_strategy_addresses() {
        let v = vault();
        assert_eq!(active_strategy_addresses(&v, "Morpho").len(), 1);
        assert_eq!(active_strategy_addresses(&v, "Steer").len(), 1);
        assert!(active_strategy_addresses(&v, "Aave").is_empty());
    }

    #[test]
    fn test_auto_compounded_apy() {
        let mut v = vault();
        assert_eq!(auto_compounded_apy(&v), 0.0);
        v.apr = Some(YearnVaultApr {
            net_apr: Some(0.05),
            ..Default::default()
        });
        assert_eq!(auto_compounded_apy(&v), 0.05);
    }

    #[test]
    fn test_query_params() {
        let api = YearnApi::new(
            "https://ydaemon.yearn.fi/",
            747474,
            Duration::from_secs(5),
            Arc::new(AprDebugLogger::disabled()),
        )
        .unwrap();

        assert_eq!(api.vaults_url(), "https://ydaemon.yearn.fi/vaults/katana");
        let query = api.query();
        assert!(query.contains(&("chainIDs", "747474".to_string())));
        assert!(query.contains(&("limit", "2500".to_string())));
        assert!(query.contains(&("strategiesDetails", "withDetails".to_string())));
    }
}
