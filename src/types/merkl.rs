//! Merkl opportunity models (`GET /v4/opportunities`)

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Bare address, or an address followed by a protocol suffix
    pub identifier: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "numeric_or_none", skip_serializing_if = "Option::is_none")]
    pub apr: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaigns: Option<Vec<Campaign>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apr_record: Option<AprRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub reward_token: RewardToken,

    #[serde(default, deserialize_with = "numeric_or_none", skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<f64>,

    #[serde(default, deserialize_with = "numeric_or_none", skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardToken {
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub symbol: String,

    /// Number or numeric string; anything else reads as 0
    #[serde(default, deserialize_with = "lenient_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AprRecord {
    #[serde(default, deserialize_with = "numeric_or_none", skip_serializing_if = "Option::is_none")]
    pub cumulated: Option<f64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub breakdowns: Vec<AprBreakdown>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AprBreakdown {
    /// Campaign id this breakdown belongs to
    #[serde(default, deserialize_with = "null_as_default")]
    pub identifier: String,

    /// APR in percentage points; `None` when upstream sent a non-number
    #[serde(default, deserialize_with = "numeric_or_none", skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Opportunity {
    pub fn campaigns(&self) -> &[Campaign] {
        self.campaigns.as_deref().unwrap_or(&[])
    }

    pub fn breakdowns(&self) -> &[AprBreakdown] {
        self.apr_record
            .as_ref()
            .map(|r| r.breakdowns.as_slice())
            .unwrap_or(&[])
    }
}

// ============================================
// RESPONSE SHAPES
// ============================================

/// `/v4/opportunities` answers either a bare array or a wrapped object.
/// Elements stay raw so one malformed entry cannot sink the rest.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpportunitiesResponse {
    List(Vec<Value>),
    Wrapped { opportunities: Vec<Value> },
    Unknown(Value),
}

/// Typed result of one response body
#[derive(Debug, Default)]
pub struct DecodedOpportunities {
    pub opportunities: Vec<Opportunity>,
    /// `(index, error)` for every element that failed to decode
    pub rejected: Vec<(usize, String)>,
    /// Leading part of a body that was neither an array nor `{ opportunities: [...] }`
    pub unrecognized: Option<String>,
}

impl OpportunitiesResponse {
    pub fn decode(self) -> DecodedOpportunities {
        let elements = match self {
            OpportunitiesResponse::List(list) => list,
            OpportunitiesResponse::Wrapped { opportunities } => opportunities,
            OpportunitiesResponse::Unknown(body) => {
                let preview: String = body.to_string().chars().take(200).collect();
                return DecodedOpportunities {
                    unrecognized: Some(preview),
                    ..Default::default()
                };
            }
        };

        let mut decoded = DecodedOpportunities::default();
        for (index, element) in elements.into_iter().enumerate() {
            match serde_json::from_value::<Opportunity>(element) {
                Ok(opportunity) => decoded.opportunities.push(opportunity),
                Err(e) => decoded.rejected.push((index, e.to_string())),
            }
        }
        decoded
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_decimals<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let decimals = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(decimals.and_then(|d| u8::try_from(d).ok()).unwrap_or(0))
}

/// Accepts JSON numbers only; strings, nulls and objects become `None`.
fn numeric_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> DecodedOpportunities {
        serde_json::from_str::<OpportunitiesResponse>(json).unwrap().decode()
    }

    #[test]
    fn test_response_array_shape() {
        let decoded = decode(r#"[{"identifier": "0xabc", "name": "A"}]"#);
        let list = decoded.opportunities;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].identifier, "0xabc");
        assert!(list[0].campaigns().is_empty());
        assert!(decoded.rejected.is_empty());
    }

    #[test]
    fn test_response_wrapped_shape() {
        let decoded = decode(r#"{"opportunities": [{"identifier": "0xabc"}, {"identifier": "0xdef"}]}"#);
        assert_eq!(decoded.opportunities.len(), 2);
        assert!(decoded.unrecognized.is_none());
    }

    #[test]
    fn test_response_unknown_shape_is_flagged() {
        let decoded = decode(r#"{"message": "rate limited"}"#);
        assert!(decoded.opportunities.is_empty());
        assert_eq!(decoded.unrecognized.as_deref(), Some(r#"{"message":"rate limited"}"#));
    }

    #[test]
    fn test_null_fields_keep_the_element() {
        let decoded = decode(
            r#"[
                {"identifier": "0xaaa", "name": "ok"},
                {"identifier": "0xbbb", "name": null,
                 "campaigns": [{"campaignId": "0x1", "rewardToken": null}],
                 "aprRecord": {"cumulated": 1, "breakdowns": null}}
            ]"#,
        );
        assert_eq!(decoded.opportunities.len(), 2);
        let second = &decoded.opportunities[1];
        assert_eq!(second.name, "");
        assert_eq!(second.campaigns().len(), 1);
        assert_eq!(second.campaigns()[0].reward_token, RewardToken::default());
        assert!(second.breakdowns().is_empty());
    }

    #[test]
    fn test_bad_element_is_rejected_alone() {
        let decoded = decode(
            r#"[
                {"identifier": "0xaaa"},
                {"identifier": null},
                {"identifier": "0xccc", "campaigns": [{"campaignId": "0x1",
                  "rewardToken": {"address": "0xk", "symbol": "KAT", "decimals": "18"}}]}
            ]"#,
        );
        assert_eq!(decoded.opportunities.len(), 2);
        assert_eq!(decoded.rejected.len(), 1);
        assert_eq!(decoded.rejected[0].0, 1);
        assert_eq!(decoded.opportunities[1].campaigns()[0].reward_token.decimals, 18);
    }

    #[test]
    fn test_non_numeric_breakdown_value() {
        let json = r#"{
            "identifier": "0xabc",
            "aprRecord": {"cumulated": 10, "breakdowns": [
                {"identifier": "0x01", "value": 4.5},
                {"identifier": "0x02", "value": "n/a"}
            ]}
        }"#;
        let opp: Opportunity = serde_json::from_str(json).unwrap();
        assert_eq!(opp.breakdowns()[0].value, Some(4.5));
        assert_eq!(opp.breakdowns()[1].value, None);
    }
}
