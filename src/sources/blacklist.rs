//! Campaign Blacklist Filter
//!
//! Known-bad campaigns are stripped from every opportunity before extraction,
//! and opportunities listed under excluded protocol suffixes are dropped.

use crate::rewards::debug::{AprDebugEvent, AprDebugLogger, DebugStage};
use crate::types::Opportunity;
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    static ref EXCLUDED_CAMPAIGN_IDS: HashSet<String> = [
        "0x487022e5f413f60e3e6aa251712f9c2d6601f01d14b565e779a61b68c173bd6c",
        "0xc5a22d022154d5c64ff14b2f4071f134eb83cf159f9f846ad0ba0908a755e86d",
    ]
    .iter()
    .map(|id| id.to_lowercase())
    .collect();

    static ref EXCLUDED_IDENTIFIER_SUFFIXES: HashSet<&'static str> = ["JUMPER"].into_iter().collect();
}

pub fn is_excluded_campaign_id(campaign_id: Option<&str>) -> bool {
    match campaign_id {
        Some(id) if !id.is_empty() => EXCLUDED_CAMPAIGN_IDS.contains(&id.to_lowercase()),
        _ => false,
    }
}

/// Suffix after the leading address, separators stripped, uppercased
fn identifier_suffix(identifier: &str) -> Option<String> {
    let rest = identifier.strip_prefix("0x").or_else(|| identifier.strip_prefix("0X"))?;
    if rest.len() < 40 || !rest.is_char_boundary(40) {
        return None;
    }
    let (addr, suffix) = rest.split_at(40);
    if !addr.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let suffix = suffix.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    if suffix.is_empty() {
        None
    } else {
        Some(suffix.to_uppercase())
    }
}

pub fn is_excluded_identifier(identifier: &str) -> bool {
    identifier_suffix(identifier)
        .map(|s| EXCLUDED_IDENTIFIER_SUFFIXES.contains(s.as_str()))
        .unwrap_or(false)
}

/// What the filter removed from one opportunity
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistReport {
    pub identifier: String,
    pub removed: Vec<String>,
    /// Removed ids that also had an APR breakdown
    pub removed_with_breakdown: Vec<String>,
}

impl BlacklistReport {
    pub fn reason(&self) -> &'static str {
        if self.removed_with_breakdown.is_empty() {
            "campaign_blacklisted"
        } else {
            "apr_breakdown_campaign_blacklisted"
        }
    }

    /// Not tied to a vault: the identifier may be a pool or carry a protocol suffix
    pub fn to_event(&self) -> AprDebugEvent {
        AprDebugEvent::new(DebugStage::BlacklistFilter)
            .reason(self.reason())
            .field("identifier", self.identifier.as_str())
            .field("blacklistedCampaigns", self.removed.len())
            .field("blacklistedCampaignIds", self.removed.clone())
            .field(
                "blacklistedAprBreakdownCampaignIds",
                self.removed_with_breakdown.clone(),
            )
    }
}

/// Remove excluded campaigns from one opportunity
pub fn filter_opportunity(mut opportunity: Opportunity) -> (Opportunity, Option<BlacklistReport>) {
    let Some(campaigns) = opportunity.campaigns.take() else {
        return (opportunity, None);
    };

    let (removed, kept): (Vec<_>, Vec<_>) = campaigns
        .into_iter()
        .partition(|c| is_excluded_campaign_id(c.campaign_id.as_deref()));
    opportunity.campaigns = Some(kept);

    if removed.is_empty() {
        return (opportunity, None);
    }

    let removed: Vec<String> = removed.into_iter().filter_map(|c| c.campaign_id).collect();
    let removed_with_breakdown = removed
        .iter()
        .filter(|id| {
            opportunity
                .breakdowns()
                .iter()
                .any(|b| b.identifier.eq_ignore_ascii_case(id))
        })
        .cloned()
        .collect();

    let report = BlacklistReport {
        identifier: opportunity.identifier.clone(),
        removed,
        removed_with_breakdown,
    };
    (opportunity, Some(report))
}

/// Drop excluded opportunities, strip excluded campaigns from the rest
pub fn apply_campaign_blacklist(
    opportunities: Vec<Opportunity>,
    debug: &AprDebugLogger,
) -> Vec<Opportunity> {
    opportunities
        .into_iter()
        .filter(|o| !is_excluded_identifier(&o.identifier))
        .map(|o| {
            let (filtered, report) = filter_opportunity(o);
            if let Some(report) = report {
                debug.log(report.to_event());
            }
            filtered
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::merkl::{AprRecord, Campaign};
    use crate::types::AprBreakdown;

    const BLOCKED: &str = "0x487022e5f413f60e3e6aa251712f9c2d6601f01d14b565e779a61b68c173bd6c";
    const BLOCKED_2: &str = "0xc5a22d022154d5c64ff14b2f4071f134eb83cf159f9f846ad0ba0908a755e86d";
    const VAULT: &str = "0x00000000000000000000000000000000000000aa";

    fn campaign(id: &str) -> Campaign {
        Campaign {
            campaign_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn opportunity(identifier: &str, ids: &[&str], breakdown_ids: &[&str]) -> Opportunity {
        Opportunity {
            identifier: identifier.to_string(),
            campaigns: Some(ids.iter().map(|id| campaign(id)).collect()),
            apr_record: Some(AprRecord {
                cumulated: None,
                breakdowns: breakdown_ids
                    .iter()
                    .map(|id| AprBreakdown {
                        identifier: id.to_string(),
                        value: Some(1.0),
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_excluded_ids_case_insensitive() {
        assert!(is_excluded_campaign_id(Some(BLOCKED)));
        assert!(is_excluded_campaign_id(Some(&BLOCKED.to_uppercase())));
        assert!(is_excluded_campaign_id(Some(BLOCKED_2)));
        assert!(!is_excluded_campaign_id(Some("0x1234")));
        assert!(!is_excluded_campaign_id(None));
        assert!(!is_excluded_campaign_id(Some("")));
    }

    #[test]
    fn test_removes_exactly_excluded() {
        let opp = opportunity(VAULT, &["0xkeep", BLOCKED, "0xkeep2"], &[]);
        let (filtered, report) = filter_opportunity(opp);

        let ids: Vec<_> = filtered
            .campaigns()
            .iter()
            .filter_map(|c| c.campaign_id.clone())
            .collect();
        assert_eq!(ids, vec!["0xkeep", "0xkeep2"]);

        let report = report.unwrap();
        assert_eq!(report.removed, vec![BLOCKED.to_string()]);
        assert_eq!(report.reason(), "campaign_blacklisted");
    }

    #[test]
    fn test_report_tracks_breakdown_ids() {
        let upper = BLOCKED.to_uppercase().replace("0X", "0x");
        let opp = opportunity(VAULT, &[upper.as_str()], &[BLOCKED]);
        let (_, report) = filter_opportunity(opp);
        let report = report.unwrap();

        assert_eq!(report.removed_with_breakdown, vec![upper]);
        assert_eq!(report.reason(), "apr_breakdown_campaign_blacklisted");

        let event = report.to_event();
        assert_eq!(event.stage, DebugStage::BlacklistFilter);
        assert!(event.vault_address.is_none());
        assert_eq!(event.fields["identifier"], VAULT);
        assert_eq!(event.fields["blacklistedCampaigns"], 1);
        assert!(event.message().unwrap().contains(VAULT));
    }

    #[test]
    fn test_no_campaigns_pass_through() {
        let opp = Opportunity {
            identifier: VAULT.to_string(),
            ..Default::default()
        };
        let (filtered, report) = filter_opportunity(opp.clone());
        assert_eq!(filtered, opp);
        assert!(report.is_none());
    }

    #[test]
    fn test_identifier_suffix_exclusion() {
        assert!(is_excluded_identifier(&format!("{}JUMPER", VAULT)));
        assert!(is_excluded_identifier(&format!("{}-jumper", VAULT)));
        assert!(!is_excluded_identifier(VAULT));
        assert!(!is_excluded_identifier(&format!("{}SUSHI", VAULT)));
        assert!(!is_excluded_identifier("JUMPER"));
    }

    #[test]
    fn test_blacklist_events_leave_sample_slots_free() {
        use crate::rewards::debug::DebugConfig;

        let logger = AprDebugLogger::new(DebugConfig {
            enabled: true,
            vault_filter: None,
            sample_limit: Some(1),
        });
        let pool = "0x00000000000000000000000000000000000000cc";
        apply_campaign_blacklist(vec![opportunity(pool, &[BLOCKED], &[])], &logger);

        assert!(logger.should_log(Some(VAULT)));
    }

    #[test]
    fn test_apply_drops_and_filters() {
        let opps = vec![
            opportunity(VAULT, &[BLOCKED, "0xkeep"], &[]),
            opportunity(&format!("{}JUMPER", VAULT), &["0xkeep"], &[]),
        ];
        let out = apply_campaign_blacklist(opps, &AprDebugLogger::disabled());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].campaigns().len(), 1);
    }
}
