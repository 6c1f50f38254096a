//! Vault diagnostics
//!
//! Explains why a vault does or does not earn forwarded KAT rewards, one
//! reason per vault, without going through the full pipeline.

use crate::rewards::extractor::find_breakdown;
use crate::rewards::matcher::identifier_matches_address;
use crate::rewards::TokenAllowlist;
use crate::sources::yearn_api::auto_compounded_apy;
use crate::types::{Opportunity, YearnVault};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    NoOpportunity,
    NoCampaigns,
    NoAprBreakdownMatch,
    TokenFilteredOut,
    AprCalculated,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::NoOpportunity,
        Classification::NoCampaigns,
        Classification::NoAprBreakdownMatch,
        Classification::TokenFilteredOut,
        Classification::AprCalculated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NoOpportunity => "NO_OPPORTUNITY",
            Classification::NoCampaigns => "NO_CAMPAIGNS",
            Classification::NoAprBreakdownMatch => "NO_APR_BREAKDOWN_MATCH",
            Classification::TokenFilteredOut => "TOKEN_FILTERED_OUT",
            Classification::AprCalculated => "APR_CALCULATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultClassification {
    pub vault_address: String,
    pub vault_name: String,
    pub vault_symbol: String,
    /// Upstream `netAPR`, for context
    pub net_apr: f64,
    pub reason: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaigns_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apr_breakdowns_total: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_campaigns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filtered_campaigns: Vec<String>,
}

pub fn classify_vault(
    vault: &YearnVault,
    opportunities: &[Opportunity],
    allowlist: &TokenAllowlist,
) -> VaultClassification {
    let mut out = VaultClassification {
        vault_address: vault.address.clone(),
        vault_name: vault.name.clone(),
        vault_symbol: vault.symbol.clone(),
        net_apr: auto_compounded_apy(vault),
        reason: Classification::NoOpportunity,
        opportunity_identifier: None,
        campaigns_total: None,
        apr_breakdowns_total: None,
        matched_campaigns: Vec::new(),
        filtered_campaigns: Vec::new(),
    };

    let Some(opportunity) = opportunities
        .iter()
        .find(|o| identifier_matches_address(&o.identifier, &vault.address))
    else {
        return out;
    };

    let campaigns = opportunity.campaigns();
    let breakdowns = opportunity.breakdowns();
    out.opportunity_identifier = Some(opportunity.identifier.clone());
    out.campaigns_total = Some(campaigns.len());
    out.apr_breakdowns_total = Some(breakdowns.len());

    if campaigns.is_empty() {
        out.reason = Classification::NoCampaigns;
        return out;
    }

    let mut any_breakdown = false;
    for campaign in campaigns {
        let id = campaign.campaign_id.as_deref().unwrap_or("");
        if find_breakdown(breakdowns, id).and_then(|b| b.value).is_none() {
            continue;
        }

        any_breakdown = true;
        if allowlist.allows(&campaign.reward_token.address) {
            out.matched_campaigns.push(id.to_string());
        } else {
            out.filtered_campaigns.push(id.to_string());
        }
    }

    out.reason = if !any_breakdown {
        Classification::NoAprBreakdownMatch
    } else if out.matched_campaigns.is_empty() {
        Classification::TokenFilteredOut
    } else {
        Classification::AprCalculated
    };
    out
}

/// Count per reason, every reason present
pub fn summarize(classifications: &[VaultClassification]) -> BTreeMap<&'static str, usize> {
    let mut summary: BTreeMap<&'static str, usize> = Classification::ALL.iter().map(|c| (c.as_str(), 0)).collect();
    for c in classifications {
        *summary.entry(c.reason.as_str()).or_insert(0) += 1;
    }
    summary
}
