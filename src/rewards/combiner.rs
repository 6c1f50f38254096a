//! Breakdown Combiner
//!
//! Sums contributions that share (owner, program, token, weight, pool).
//! Several campaigns paying the same token to the same target collapse into
//! one line.

use crate::types::{PoolType, RewardResult};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CombineKey {
    address: String,
    pool_type: PoolType,
    token_address: String,
    token_symbol: String,
    token_decimals: u8,
    weight_bits: u64,
    pool_address: Option<String>,
}

impl CombineKey {
    fn of(result: &RewardResult) -> Self {
        // -0.0 and 0.0 are the same weight
        let weight = if result.breakdown.weight == 0.0 {
            0.0
        } else {
            result.breakdown.weight
        };

        Self {
            address: result.address.clone(),
            pool_type: result.pool_type,
            token_address: result.breakdown.token.address.clone(),
            token_symbol: result.breakdown.token.symbol.clone(),
            token_decimals: result.breakdown.token.decimals,
            weight_bits: weight.to_bits(),
            pool_address: result.pool_address.clone(),
        }
    }
}

/// Sum `apr` per key. Output keeps first-seen order.
pub fn combine(results: Vec<RewardResult>) -> Vec<RewardResult> {
    let mut index: HashMap<CombineKey, usize> = HashMap::with_capacity(results.len());
    let mut combined: Vec<RewardResult> = Vec::with_capacity(results.len());

    for result in results {
        let key = CombineKey::of(&result);
        match index.get(&key) {
            Some(&i) => combined[i].breakdown.apr += result.breakdown.apr,
            None => {
                index.insert(key, combined.len());
                combined.push(result);
            }
        }
    }

    combined
}
