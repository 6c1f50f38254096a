//! Strategy -> pool resolution via Multicall3
//!
//! Morpho strategies expose the lending vault they deposit into (`vault()`).
//! Steer strategies expose their LP wrapper (`STEER_LP()`), which in turn
//! exposes the Sushi pool (`pool()`), so those take two batches.
//!
//! Every call is `allowFailure = true`: one broken strategy only drops itself.

use alloy_primitives::{address, Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, trace};

// ============================================
// INTERFACES
// ============================================

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);
    }
}

sol! {
    interface ISteerStrategy {
        function STEER_LP() external view returns (address);
    }

    interface ISteerLp {
        function pool() external view returns (address);
    }

    interface IMorphoStrategy {
        function vault() external view returns (address);
    }
}

/// Multicall3 address (same on all EVM chains)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Max calls per aggregate3 batch
const MAX_CALLS_PER_BATCH: usize = 100;

#[async_trait]
pub trait StrategyPoolReader: Send + Sync {
    /// strategy -> Morpho vault
    async fn morpho_vaults(&self, strategies: &[Address]) -> Result<HashMap<Address, Address>>;

    /// strategy -> Sushi pool behind the strategy's Steer LP
    async fn steer_pools(&self, strategies: &[Address]) -> Result<HashMap<Address, Address>>;
}

pub struct MulticallReader {
    rpc_url: String,
    multicall: Address,
}

impl MulticallReader {
    pub fn new(rpc_url: String, multicall: Address) -> Self {
        Self { rpc_url, multicall }
    }

    /// Execute one Multicall3 batch
    async fn execute_multicall(&self, calls: Vec<IMulticall3::Call3>) -> Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);

        let calldata = IMulticall3::aggregate3Call { calls }.abi_encode();

        let tx = TransactionRequest::default()
            .to(self.multicall)
            .input(calldata.into());

        let result = provider
            .call(tx)
            .await
            .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

        let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&result)
            .map_err(|e| eyre!("Failed to decode multicall result: {}", e))?;

        Ok(decoded)
    }

    /// Same zero-arg address getter on every target, chunked
    async fn read_address_getter<C>(&self, targets: &[Address]) -> Result<HashMap<Address, Address>>
    where
        C: SolCall<Return = Address>,
    {
        let mut out = HashMap::with_capacity(targets.len());
        // zero-arg getter: calldata is just the selector
        let calldata: Bytes = C::SELECTOR.to_vec().into();

        for chunk in targets.chunks(MAX_CALLS_PER_BATCH) {
            let calls = chunk
                .iter()
                .map(|target| IMulticall3::Call3 {
                    target: *target,
                    allowFailure: true,
                    callData: calldata.clone(),
                })
                .collect();

            let results = self.execute_multicall(calls).await?;
            out.extend(decode_address_results::<C>(chunk, &results));
        }

        Ok(out)
    }
}

/// Pair targets with successful, non-zero address returns
fn decode_address_results<C>(targets: &[Address], results: &[IMulticall3::Result]) -> Vec<(Address, Address)>
where
    C: SolCall<Return = Address>,
{
    targets
        .iter()
        .zip(results.iter())
        .filter_map(|(target, result)| {
            if !result.success {
                trace!("call reverted on {:?}", target);
                return None;
            }
            let value = C::abi_decode_returns(&result.returnData).ok()?;
            (value != Address::ZERO).then_some((*target, value))
        })
        .collect()
}

#[async_trait]
impl StrategyPoolReader for MulticallReader {
    async fn morpho_vaults(&self, strategies: &[Address]) -> Result<HashMap<Address, Address>> {
        if strategies.is_empty() {
            return Ok(HashMap::new());
        }

        let start = Instant::now();
        let vaults = self
            .read_address_getter::<IMorphoStrategy::vaultCall>(strategies)
            .await?;

        debug!(
            "⚡ Multicall3: {}/{} Morpho vaults resolved in {:?}",
            vaults.len(),
            strategies.len(),
            start.elapsed()
        );
        Ok(vaults)
    }

    async fn steer_pools(&self, strategies: &[Address]) -> Result<HashMap<Address, Address>> {
        if strategies.is_empty() {
            return Ok(HashMap::new());
        }

        let start = Instant::now();

        // BATCH 1: strategy -> Steer LP
        let lps = self
            .read_address_getter::<ISteerStrategy::STEER_LPCall>(strategies)
            .await?;

        // BATCH 2: Steer LP -> pool
        let lp_addresses: Vec<Address> = strategies.iter().filter_map(|s| lps.get(s).copied()).collect();
        let pools = self
            .read_address_getter::<ISteerLp::poolCall>(&lp_addresses)
            .await?;

        let resolved: HashMap<Address, Address> = strategies
            .iter()
            .filter_map(|s| {
                let lp = lps.get(s)?;
                pools.get(lp).map(|pool| (*s, *pool))
            })
            .collect();

        debug!(
            "⚡ Multicall3: {}/{} Steer pools resolved in {:?} (2 RPC calls)",
            resolved.len(),
            strategies.len(),
            start.elapsed()
        );
        Ok(resolved)
    }
}
