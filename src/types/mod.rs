//! Wire and domain models shared across the pipeline

pub mod merkl;
pub mod reward;
pub mod yearn;

pub use merkl::{AprBreakdown, OpportunitiesResponse, Opportunity};
pub use reward::{BreakdownToken, PoolType, RewardResult, TokenBreakdown};
pub use yearn::{StrategyRewardToken, YearnStrategy, YearnVault, YearnVaultApr, YearnVaultExtra};
