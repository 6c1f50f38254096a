//! Strategy/Vault APR Extractor
//!
//! For one target (a vault, or a strategy's underlying pool) this finds the
//! Merkl opportunity, pairs each campaign with its APR breakdown and keeps the
//! campaigns paying an allowlisted reward token.
//!
//! The outcome is an [`Extraction`]; the zero placeholder only appears when
//! converting to output rows via [`Extraction::into_results`].

use crate::error::RewardError;
use crate::rewards::combiner::combine;
use crate::rewards::debug::{AprDebugEvent, AprDebugLogger, DebugStage};
use crate::rewards::matcher::{identifier_matches_address, parse_address};
use crate::types::{
    AprBreakdown, BreakdownToken, Opportunity, PoolType, RewardResult, TokenBreakdown, YearnVault,
};
use alloy_primitives::Address;

// ============================================
// REWARD TOKEN ALLOWLIST
// ============================================

/// KAT and its wrapped variants
pub const WRAPPED_KAT_ADDRESSES: [&str; 3] = [
    "0x6E9C1F88a960fE63387eb4b71BC525a9313d8461", // wrapped KAT v2
    "0x3ba1fbC4c3aEA775d335b31fb53778f46FD3a330", // wrapped KAT v1
    "0x0161A31702d6CF715aaa912d64c6A190FD0093aa", // KAT
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenAllowlist {
    tokens: Vec<Address>,
}

impl TokenAllowlist {
    /// Invalid entries are dropped
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self {
            tokens: tokens.iter().filter_map(|t| parse_address(t.as_ref())).collect(),
        }
    }

    #[cfg(test)]
    pub fn wrapped_kat() -> Self {
        Self::new(&WRAPPED_KAT_ADDRESSES)
    }

    pub fn allows(&self, token: &str) -> bool {
        match parse_address(token) {
            Some(addr) => self.tokens.contains(&addr),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ============================================
// TARGET + OUTCOME
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionTarget {
    /// Owner of the results: vault or strategy address
    pub address: String,
    pub name: Option<String>,
    /// Address the opportunity identifier must match
    pub match_address: String,
    pub pool_address: Option<String>,
    /// Vault the target belongs to, used for debug sampling
    pub vault_address: String,
}

impl ExtractionTarget {
    pub fn vault(vault: &YearnVault) -> Self {
        Self {
            address: vault.address.clone(),
            name: Some(vault.name.clone()),
            match_address: vault.address.clone(),
            pool_address: None,
            vault_address: vault.address.clone(),
        }
    }

    pub fn strategy(vault_address: &str, strategy_address: &str, pool_address: &str) -> Self {
        Self {
            address: strategy_address.to_string(),
            name: None,
            match_address: pool_address.to_string(),
            pool_address: Some(pool_address.to_string()),
            vault_address: vault_address.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// No opportunity identifier matches the target
    NoOpportunity,
    /// Matched opportunity carries no campaigns
    NoCampaigns { identifier: String },
    /// Campaigns exist but none survived breakdown lookup and token filter
    NoMatch {
        identifier: String,
        campaigns: usize,
        breakdown_matches: usize,
    },
    /// Combined contributions, never empty
    Computed(Vec<RewardResult>),
}

impl Extraction {
    pub fn reason(&self) -> &'static str {
        match self {
            Extraction::NoOpportunity => "opportunity_missing",
            Extraction::NoCampaigns { .. } => "opportunity_has_no_campaigns",
            Extraction::NoMatch { .. } => "no_matching_campaigns_after_filters",
            Extraction::Computed(_) => "apr_calculated",
        }
    }

    /// Output rows; anything but `Computed` becomes one zero placeholder.
    pub fn into_results(self, target: &ExtractionTarget, pool_type: PoolType) -> Vec<RewardResult> {
        match self {
            Extraction::Computed(results) => results,
            _ => vec![RewardResult {
                address: target.address.clone(),
                name: target.name.clone(),
                pool_address: target.pool_address.clone(),
                pool_type,
                breakdown: TokenBreakdown::zero(),
            }],
        }
    }
}

// ============================================
// EXTRACTION
// ============================================

/// First breakdown for the campaign; its value may still be non-numeric
pub fn find_breakdown<'a>(breakdowns: &'a [AprBreakdown], campaign_id: &str) -> Option<&'a AprBreakdown> {
    if campaign_id.is_empty() {
        return None;
    }
    breakdowns
        .iter()
        .find(|b| b.identifier.eq_ignore_ascii_case(campaign_id))
}

pub fn extract(
    target: &ExtractionTarget,
    opportunities: &[Opportunity],
    pool_type: PoolType,
    allowlist: &TokenAllowlist,
    debug: &AprDebugLogger,
) -> Result<Extraction, RewardError> {
    if target.match_address.is_empty() {
        return Err(RewardError::MissingAddress(target.address.clone()));
    }

    let vault = target.vault_address.as_str();

    let Some(opportunity) = opportunities
        .iter()
        .find(|o| identifier_matches_address(&o.identifier, &target.match_address))
    else {
        debug.log(
            AprDebugEvent::new(DebugStage::OpportunityLookup)
                .vault(vault)
                .reason("opportunity_missing")
                .field("target", target.match_address.as_str())
                .field("poolType", pool_type.to_string())
                .field("opportunities", opportunities.len()),
        );
        return Ok(Extraction::NoOpportunity);
    };

    debug.log(
        AprDebugEvent::new(DebugStage::OpportunityLookup)
            .vault(vault)
            .reason("opportunity_found")
            .field("identifier", opportunity.identifier.as_str())
            .field("poolType", pool_type.to_string()),
    );

    let campaigns = opportunity.campaigns();
    if campaigns.is_empty() {
        debug.log(
            AprDebugEvent::new(DebugStage::ResultSummary)
                .vault(vault)
                .reason("opportunity_has_no_campaigns")
                .field("results", 0),
        );
        return Ok(Extraction::NoCampaigns {
            identifier: opportunity.identifier.clone(),
        });
    }

    let breakdowns = opportunity.breakdowns();
    debug.log(
        AprDebugEvent::new(DebugStage::CampaignScan)
            .vault(vault)
            .field("campaigns", campaigns.len())
            .field("breakdowns", breakdowns.len()),
    );

    let mut results = Vec::new();
    let mut breakdown_matches = 0;

    for campaign in campaigns {
        let campaign_id = campaign.campaign_id.as_deref().unwrap_or("");
        let Some(apr) = find_breakdown(breakdowns, campaign_id).and_then(|b| b.value) else {
            debug.log(
                AprDebugEvent::new(DebugStage::CampaignAprMatch)
                    .vault(vault)
                    .field("campaignId", campaign_id)
                    .field("matched", false),
            );
            continue;
        };
        breakdown_matches += 1;

        debug.log(
            AprDebugEvent::new(DebugStage::CampaignAprMatch)
                .vault(vault)
                .field("campaignId", campaign_id)
                .field("matched", true)
                .field("apr", apr),
        );

        let token = &campaign.reward_token;
        if !allowlist.allows(&token.address) {
            debug.log(
                AprDebugEvent::new(DebugStage::TokenFilter)
                    .vault(vault)
                    .reason("reward_token_filtered")
                    .field("rewardToken", token.address.as_str())
                    .field("symbol", token.symbol.as_str()),
            );
            continue;
        }

        debug.log(
            AprDebugEvent::new(DebugStage::TokenFilter)
                .vault(vault)
                .reason("reward_token_accepted")
                .field("rewardToken", token.address.as_str())
                .field("symbol", token.symbol.as_str()),
        );

        results.push(RewardResult {
            address: target.address.clone(),
            name: target.name.clone(),
            pool_address: target.pool_address.clone(),
            pool_type,
            breakdown: TokenBreakdown {
                apr,
                token: BreakdownToken {
                    address: token.address.clone(),
                    symbol: token.symbol.clone(),
                    decimals: token.decimals,
                },
                weight: 0.0,
            },
        });
    }

    let extraction = if results.is_empty() {
        Extraction::NoMatch {
            identifier: opportunity.identifier.clone(),
            campaigns: campaigns.len(),
            breakdown_matches,
        }
    } else {
        Extraction::Computed(combine(results))
    };

    let result_count = match &extraction {
        Extraction::Computed(r) => r.len(),
        _ => 0,
    };
    debug.log(
        AprDebugEvent::new(DebugStage::ResultSummary)
            .vault(vault)
            .reason(extraction.reason())
            .field("results", result_count),
    );

    Ok(extraction)
}
