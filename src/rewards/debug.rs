//! APR Debug Sampler
//!
//! Structured, sampled trace of why a vault got the APR it got. Disabled by
//! default; when enabled it can be pinned to one vault (`APR_DEBUG_VAULT_ADDRESS`)
//! or capped to the first N distinct vaults seen (`APR_DEBUG_SAMPLE_LIMIT`).
//!
//! Events go to tracing target `apr_debug`. Logging never fails the caller.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

const LOG_PREFIX: &str = "[apr-debug]";

// ============================================
// CONFIG
// ============================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugConfig {
    pub enabled: bool,
    /// Lowercased vault address; only this vault is traced when set
    pub vault_filter: Option<String>,
    /// Max distinct vault addresses traced per process
    pub sample_limit: Option<usize>,
}

// ============================================
// EVENTS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugStage {
    VaultFetch,
    BlacklistFilter,
    OpportunityFetch,
    OpportunityLookup,
    CampaignScan,
    CampaignAprMatch,
    TokenFilter,
    ResultSummary,
    Fallback,
}

impl DebugStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugStage::VaultFetch => "vault_fetch",
            DebugStage::BlacklistFilter => "blacklist_filter",
            DebugStage::OpportunityFetch => "opportunity_fetch",
            DebugStage::OpportunityLookup => "opportunity_lookup",
            DebugStage::CampaignScan => "campaign_scan",
            DebugStage::CampaignAprMatch => "campaign_apr_match",
            DebugStage::TokenFilter => "token_filter",
            DebugStage::ResultSummary => "result_summary",
            DebugStage::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DebugStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AprDebugEvent {
    pub stage: DebugStage,
    pub vault_address: Option<String>,
    pub reason: Option<&'static str>,
    pub fields: Map<String, Value>,
}

impl AprDebugEvent {
    pub fn new(stage: DebugStage) -> Self {
        Self {
            stage,
            vault_address: None,
            reason: None,
            fields: Map::new(),
        }
    }

    pub fn vault(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        if !address.is_empty() {
            self.vault_address = Some(address);
        }
        self
    }

    pub fn reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("?")
    }

    fn num_field(&self, key: &str) -> String {
        match self.fields.get(key) {
            Some(Value::Number(n)) => n.to_string(),
            _ => "0".to_string(),
        }
    }

    /// Human message for the event; `None` means the event is not worth a line.
    pub fn message(&self) -> Option<String> {
        let vault = self.vault_address.as_deref().unwrap_or("-");
        let reason = self.reason.unwrap_or("-");

        let msg = match self.stage {
            DebugStage::VaultFetch => format!(
                "vault {} ({}) fetched with {} strategies",
                vault,
                self.str_field("symbol"),
                self.num_field("strategies")
            ),
            DebugStage::BlacklistFilter => format!(
                "removed {} blacklisted campaign(s) from {} ({})",
                self.num_field("blacklistedCampaigns"),
                self.str_field("identifier"),
                reason
            ),
            DebugStage::OpportunityFetch => format!(
                "{} opportunities available for {} [{}]",
                self.num_field("opportunities"),
                vault,
                self.str_field("poolType")
            ),
            DebugStage::OpportunityLookup => format!("lookup for {}: {}", vault, reason),
            DebugStage::CampaignScan => format!(
                "scanning {} campaign(s) for {}",
                self.num_field("campaigns"),
                vault
            ),
            DebugStage::CampaignAprMatch => {
                if !self.fields.get("matched").and_then(Value::as_bool).unwrap_or(false) {
                    return None;
                }
                format!(
                    "campaign {} matched breakdown with apr {}",
                    self.str_field("campaignId"),
                    self.num_field("apr")
                )
            }
            DebugStage::TokenFilter => format!(
                "reward token {} for {}: {}",
                self.str_field("rewardToken"),
                vault,
                reason
            ),
            DebugStage::ResultSummary => format!(
                "{} result(s) for {}: {}",
                self.num_field("results"),
                vault,
                reason
            ),
            DebugStage::Fallback => format!("fallback record for {}: {}", vault, reason),
        };

        Some(msg)
    }
}

// ============================================
// LOGGER
// ============================================

#[derive(Debug, Default)]
pub struct AprDebugLogger {
    config: DebugConfig,
    sampled: Mutex<HashSet<String>>,
}

impl AprDebugLogger {
    pub fn new(config: DebugConfig) -> Self {
        Self {
            config,
            sampled: Mutex::new(HashSet::new()),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Sampling decision for one event. Admitting a new address consumes a slot.
    pub fn should_log(&self, vault_address: Option<&str>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let normalized = vault_address.map(str::to_lowercase);

        if let Some(filter) = &self.config.vault_filter {
            match &normalized {
                Some(addr) if addr == filter => {}
                _ => return false,
            }
        }

        let Some(limit) = self.config.sample_limit else {
            return true;
        };
        let Some(addr) = normalized else {
            return false;
        };

        let mut sampled = self.sampled.lock().unwrap_or_else(|e| e.into_inner());
        if sampled.contains(&addr) {
            return true;
        }
        if sampled.len() >= limit {
            return false;
        }
        sampled.insert(addr);
        true
    }

    /// Emit the event if it passes sampling. Returns whether a line was written.
    pub fn log(&self, event: AprDebugEvent) -> bool {
        if !self.config.enabled {
            return false;
        }

        let Some(message) = event.message() else {
            return false;
        };

        if !self.should_log(event.vault_address.as_deref()) {
            return false;
        }

        let fields = Value::Object(event.fields).to_string();
        info!(
            target: "apr_debug",
            stage = event.stage.as_str(),
            reason = event.reason.unwrap_or(""),
            "{} {} {}",
            LOG_PREFIX,
            message,
            fields
        );
        true
    }

    /// Forget sampled addresses
    #[cfg(test)]
    pub fn reset(&self) {
        self.sampled.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT_A: &str = "0x00000000000000000000000000000000000000aa";
    const VAULT_B: &str = "0x00000000000000000000000000000000000000bb";
    const VAULT_C: &str = "0x00000000000000000000000000000000000000cc";

    fn logger(filter: Option<&str>, limit: Option<usize>) -> AprDebugLogger {
        AprDebugLogger::new(DebugConfig {
            enabled: true,
            vault_filter: filter.map(str::to_lowercase),
            sample_limit: limit,
        })
    }

    #[test]
    fn test_disabled_logs_nothing() {
        let logger = AprDebugLogger::disabled();
        assert!(!logger.should_log(Some(VAULT_A)));
        assert!(!logger.log(AprDebugEvent::new(DebugStage::OpportunityLookup).vault(VAULT_A)));
    }

    #[test]
    fn test_vault_filter_exact_match() {
        let logger = logger(Some(VAULT_A.to_uppercase().replace("0X", "0x").as_str()), None);
        assert!(logger.should_log(Some(VAULT_A)));
        assert!(!logger.should_log(Some(VAULT_B)));
        assert!(!logger.should_log(None));
    }

    #[test]
    fn test_sample_limit_first_come() {
        let logger = logger(None, Some(2));
        assert!(logger.should_log(Some(VAULT_A)));
        assert!(logger.should_log(Some(VAULT_B)));
        assert!(!logger.should_log(Some(VAULT_C)));
        // already admitted keeps logging
        assert!(logger.should_log(Some(VAULT_A)));
        // addressless events are blocked once a limit is set
        assert!(!logger.should_log(None));
    }

    #[test]
    fn test_reset_clears_samples() {
        let logger = logger(None, Some(1));
        assert!(logger.should_log(Some(VAULT_A)));
        assert!(!logger.should_log(Some(VAULT_B)));
        logger.reset();
        assert!(logger.should_log(Some(VAULT_B)));
    }

    #[test]
    fn test_unmatched_campaign_is_suppressed() {
        let logger = logger(None, Some(1));
        let event = AprDebugEvent::new(DebugStage::CampaignAprMatch)
            .vault(VAULT_A)
            .field("matched", false);
        assert!(event.message().is_none());
        assert!(!logger.log(event));
        // suppressed events do not consume a sample slot
        assert!(logger.should_log(Some(VAULT_B)));
    }

    #[test]
    fn test_message_formats() {
        let event = AprDebugEvent::new(DebugStage::ResultSummary)
            .vault(VAULT_A)
            .reason("apr_calculated")
            .field("results", 2);
        let msg = event.message().unwrap();
        assert!(msg.contains("2 result(s)"));
        assert!(msg.contains("apr_calculated"));
        assert_eq!(DebugStage::BlacklistFilter.to_string(), "blacklist_filter");
    }
}
