//! Upstream data sources: yDaemon vaults, Merkl opportunities, on-chain reads

pub mod blacklist;
pub mod contract_reader;
pub mod merkl_api;
pub mod yearn_api;

pub use contract_reader::{MulticallReader, StrategyPoolReader, MULTICALL3};
pub use merkl_api::{MerklApi, OpportunityQuery, OpportunitySource};
pub use yearn_api::{VaultSource, YearnApi};
