//! Reward attribution: matching opportunities to vaults and strategies
//!
//! matcher -> extractor -> combiner, driven per program by the calculators.

pub mod calculators;
pub mod combiner;
pub mod debug;
pub mod extractor;
pub mod matcher;

pub use calculators::{
    AprCalculator, RewardProgram, StrategyRewardsCalculator, VaultResults, VaultRewardsCalculator,
};
pub use debug::AprDebugLogger;
pub use extractor::TokenAllowlist;
