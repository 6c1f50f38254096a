//! Vault-level aggregation: program results -> served vault records

pub mod aggregator;
pub mod points;

pub use aggregator::{VaultAggregator, VaultAprRecord};
