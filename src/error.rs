//! Typed errors at the pipeline boundaries
//!
//! Adapters and the binary use `eyre::Result`; these enums exist where a
//! caller has to branch on the failure (skip, substitute, map to HTTP).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardError {
    #[error("missing target address for {0}")]
    MissingAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("invalid vault address: {0:?}")]
    InvalidVaultAddress(String),
}

/// Rebuild failures. Cloneable so every waiter on a shared rebuild gets it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("failed to fetch vaults: {0}")]
    VaultFetch(String),

    #[error("vault list is empty")]
    NoVaults,
}
