//! Merkl opportunity source
//!
//! API: {MERKL_BASE_URI}/v4/opportunities
//!
//! The endpoint answers either a bare array or `{ opportunities: [...] }`; both
//! are normalised here, and the campaign blacklist is applied before anything
//! downstream sees the list.

use crate::rewards::debug::AprDebugLogger;
use crate::sources::blacklist::apply_campaign_blacklist;
use crate::types::{OpportunitiesResponse, Opportunity};
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Which slice of opportunities a reward program needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityQuery {
    /// Opportunities of one protocol (`name=<protocol>`)
    Protocol(&'static str),
    /// Live opportunities of one campaign type (`status=LIVE&type=<type>`)
    LiveCampaignType(&'static str),
}

impl OpportunityQuery {
    pub const SUSHI: Self = OpportunityQuery::Protocol("sushi");
    pub const MORPHO: Self = OpportunityQuery::Protocol("morpho");
    pub const FORWARDED: Self = OpportunityQuery::LiveCampaignType("ERC20LOGPROCESSOR");
    pub const FIXED_APR: Self = OpportunityQuery::LiveCampaignType("ERC20_FIX_APR");

    pub fn params(&self, chain_id: u64) -> Vec<(&'static str, String)> {
        let mut params = match self {
            OpportunityQuery::Protocol(name) => vec![("name", name.to_string())],
            OpportunityQuery::LiveCampaignType(kind) => {
                vec![("status", "LIVE".to_string()), ("type", kind.to_string())]
            }
        };
        params.push(("chainId", chain_id.to_string()));
        params.push(("campaigns", "true".to_string()));
        params
    }
}

impl fmt::Display for OpportunityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityQuery::Protocol(name) => write!(f, "protocol={}", name),
            OpportunityQuery::LiveCampaignType(kind) => write!(f, "type={}", kind),
        }
    }
}

#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn fetch_opportunities(&self, query: OpportunityQuery) -> Result<Vec<Opportunity>>;
}

pub struct MerklApi {
    http_client: Client,
    base_url: String,
    chain_id: u64,
    debug: Arc<AprDebugLogger>,
}

impl MerklApi {
    pub fn new(
        base_url: &str,
        chain_id: u64,
        timeout: Duration,
        debug: Arc<AprDebugLogger>,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
            debug,
        })
    }

    fn opportunities_url(&self) -> String {
        format!("{}/v4/opportunities", self.base_url)
    }
}

/// Typed opportunities from a response body. Bad elements are skipped with a warning.
fn decode_body(body: OpportunitiesResponse, query: OpportunityQuery) -> Vec<Opportunity> {
    let decoded = body.decode();

    if let Some(body) = &decoded.unrecognized {
        warn!("⚠️  Merkl {}: unrecognized response, no opportunities: {}", query, body);
    }
    for (index, err) in &decoded.rejected {
        warn!("⚠️  Merkl {}: skipping opportunity #{}: {}", query, index, err);
    }

    decoded.opportunities
}

#[async_trait]
impl OpportunitySource for MerklApi {
    async fn fetch_opportunities(&self, query: OpportunityQuery) -> Result<Vec<Opportunity>> {
        let start = Instant::now();

        let response = self
            .http_client
            .get(self.opportunities_url())
            .query(&query.params(self.chain_id))
            .send()
            .await
            .map_err(|e| eyre!("Merkl request failed ({}): {}", query, e))?;

        if !response.status().is_success() {
            return Err(eyre!("Merkl returned HTTP {} ({})", response.status(), query));
        }

        let body: OpportunitiesResponse = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse Merkl opportunities ({}): {}", query, e))?;

        let opportunities = apply_campaign_blacklist(decode_body(body, query), &self.debug);

        debug!(
            "Merkl {}: {} opportunities in {:?}",
            query,
            opportunities.len(),
            start.elapsed()
        );
        Ok(opportunities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_params() {
        let params = OpportunityQuery::SUSHI.params(747474);
        assert_eq!(
            params,
            vec![
                ("name", "sushi".to_string()),
                ("chainId", "747474".to_string()),
                ("campaigns", "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_campaign_type_params() {
        let params = OpportunityQuery::FIXED_APR.params(747474);
        assert!(params.contains(&("status", "LIVE".to_string())));
        assert!(params.contains(&("type", "ERC20_FIX_APR".to_string())));
        assert!(params.contains(&("campaigns", "true".to_string())));
        assert_eq!(OpportunityQuery::FORWARDED.to_string(), "type=ERC20LOGPROCESSOR");
    }

    #[test]
    fn test_decode_body_keeps_good_elements() {
        let body: OpportunitiesResponse = serde_json::from_str(
            r#"[{"identifier": "0xaaa", "name": "ok"}, {"identifier": "0xbbb", "name": null}, 42]"#,
        )
        .unwrap();
        let opportunities = decode_body(body, OpportunityQuery::FORWARDED);
        let ids: Vec<_> = opportunities.iter().map(|o| o.identifier.as_str()).collect();
        assert_eq!(ids, vec!["0xaaa", "0xbbb"]);

        let body: OpportunitiesResponse = serde_json::from_str(r#""maintenance""#).unwrap();
        assert!(decode_body(body, OpportunityQuery::FORWARDED).is_empty());
    }

    #[test]
    fn test_url_trailing_slash() {
        let api = MerklApi::new(
            "https://api.merkl.xyz/",
            747474,
            Duration::from_secs(5),
            Arc::new(AprDebugLogger::disabled()),
        )
        .unwrap();
        assert_eq!(api.opportunities_url(), "https://api.merkl.xyz/v4/opportunities");
    }
}
