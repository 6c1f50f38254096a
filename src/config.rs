//! Service Configuration
//!
//! Everything comes from the environment (and `.env`), except the static
//! per-symbol yield tables which live in a TOML file.

use crate::rewards::debug::DebugConfig;
use crate::rewards::extractor::WRAPPED_KAT_ADDRESSES;
use crate::sources::MULTICALL3;
use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Katana mainnet
pub const KATANA_CHAIN_ID: u64 = 747474;

const DEFAULT_STATIC_YIELDS: &str = include_str!("../config/static_yields.toml");

// ============================================
// FIXED-RATE POLICY
// ============================================

/// How the fixed-rate KAT program feeds the headline numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixedRatePolicy {
    /// Reported under its own key and counted in the webhook `netAPR`
    #[default]
    Separate,
    /// Also added to the vault's `apr.netAPR`
    IncludeInNetApr,
    /// Program not run, key reported as 0
    Disabled,
}

impl FixedRatePolicy {
    pub fn is_enabled(&self) -> bool {
        *self != FixedRatePolicy::Disabled
    }
}

impl FromStr for FixedRatePolicy {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "separate" => Ok(FixedRatePolicy::Separate),
            "include-in-net-apr" | "include" | "included" => Ok(FixedRatePolicy::IncludeInNetApr),
            "disabled" | "off" => Ok(FixedRatePolicy::Disabled),
            other => Err(eyre!("unknown FIXED_RATE_POLICY: {}", other)),
        }
    }
}

impl fmt::Display for FixedRatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixedRatePolicy::Separate => write!(f, "separate"),
            FixedRatePolicy::IncludeInNetApr => write!(f, "include-in-net-apr"),
            FixedRatePolicy::Disabled => write!(f, "disabled"),
        }
    }
}

// ============================================
// STATIC YIELD TABLES
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticYields {
    /// Vault symbol -> bonus APY
    #[serde(default)]
    pub bonus_apy: BTreeMap<String, f64>,

    /// Vault symbol -> native yield
    #[serde(default)]
    pub native_yield: BTreeMap<String, f64>,

    /// Pool pair (as in strategy names) -> Steer points per dollar
    #[serde(default)]
    pub steer_points: OrderedRates,
}

/// Key -> rate table that keeps file order; the first matching key wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedRates(pub Vec<(String, f64)>);

impl Serialize for OrderedRates {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for OrderedRates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RatesVisitor;

        impl<'de> Visitor<'de> for RatesVisitor {
            type Value = OrderedRates;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of numeric rates")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<OrderedRates, A::Error> {
                let mut rates = Vec::new();
                while let Some((key, rate)) = map.next_entry::<String, f64>()? {
                    rates.push((key, rate));
                }
                Ok(OrderedRates(rates))
            }
        }

        deserializer.deserialize_map(RatesVisitor)
    }
}

impl StaticYields {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let tables: Self = toml::from_str(&content)?;
        Ok(tables)
    }

    /// Tables shipped with the binary
    pub fn embedded() -> Result<Self> {
        Ok(toml::from_str(DEFAULT_STATIC_YIELDS)?)
    }

    fn lookup(table: &BTreeMap<String, f64>, symbol: &str) -> f64 {
        table
            .get(symbol)
            .or_else(|| {
                table
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(symbol))
                    .map(|(_, v)| v)
            })
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn bonus_apy(&self, symbol: &str) -> f64 {
        Self::lookup(&self.bonus_apy, symbol)
    }

    pub fn native_yield(&self, symbol: &str) -> f64 {
        Self::lookup(&self.native_yield, symbol)
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone)]
pub struct Config {
    // ========== Server ==========
    pub port: u16,

    // ========== Network ==========
    /// Katana RPC for Multicall3 reads
    pub rpc_url: String,
    pub chain_id: u64,
    pub multicall_address: String,

    // ========== Upstream APIs ==========
    pub ydaemon_base_uri: String,
    pub merkl_base_uri: String,
    pub http_timeout_secs: u64,

    // ========== Rewards ==========
    /// Reward tokens counted by every program
    pub reward_tokens: Vec<String>,
    /// FDV attached to strategy reward-token metadata
    pub katana_token_fdv: f64,
    pub fixed_rate_policy: FixedRatePolicy,
    /// Override for the embedded static yield tables
    pub static_yields_path: Option<String>,

    // ========== Cache ==========
    pub cache_ttl_secs: u64,

    // ========== Secrets ==========
    pub webhook_secret: Option<String>,
    pub refresh_secret: Option<String>,

    // ========== Debug ==========
    pub debug: DebugConfig,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (env, map in tests)
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            port: non_empty("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            rpc_url: non_empty("RPC_URL_KATANA").unwrap_or_default(),
            chain_id: non_empty("KATANA_CHAIN_ID")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.chain_id),
            multicall_address: non_empty("MULTICALL_ADDRESS").unwrap_or(defaults.multicall_address),

            ydaemon_base_uri: non_empty("YDAEMON_BASE_URI").unwrap_or(defaults.ydaemon_base_uri),
            merkl_base_uri: non_empty("MERKL_BASE_URI").unwrap_or(defaults.merkl_base_uri),
            http_timeout_secs: non_empty("HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),

            reward_tokens: non_empty("REWARD_TOKEN_ALLOWLIST")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.reward_tokens),
            katana_token_fdv: non_empty("KATANA_TOKEN_FDV")
                .and_then(|v| v.replace('_', "").parse().ok())
                .unwrap_or(defaults.katana_token_fdv),
            fixed_rate_policy: match non_empty("FIXED_RATE_POLICY") {
                Some(v) => v.parse()?,
                None => defaults.fixed_rate_policy,
            },
            static_yields_path: non_empty("STATIC_YIELDS_PATH"),

            cache_ttl_secs: non_empty("CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_ttl_secs),

            webhook_secret: non_empty("KONG_WEBHOOK_SECRET"),
            refresh_secret: non_empty("CACHE_REFRESH_SECRET"),

            debug: DebugConfig {
                enabled: non_empty("APR_DEBUG_ENABLED").as_deref() == Some("true"),
                vault_filter: non_empty("APR_DEBUG_VAULT_ADDRESS").map(|v| v.to_lowercase()),
                sample_limit: non_empty("APR_DEBUG_SAMPLE_LIMIT")
                    .and_then(|v| v.parse::<usize>().ok())
                    .filter(|n| *n > 0),
            },
        })
    }

    /// Static tables from `STATIC_YIELDS_PATH`, else the embedded defaults
    pub fn load_static_yields(&self) -> Result<StaticYields> {
        match &self.static_yields_path {
            Some(path) => StaticYields::from_file(path)
                .map_err(|e| eyre!("Failed to load static yields from {}: {}", path, e)),
            None => StaticYields::embedded(),
        }
    }

    pub fn multicall(&self) -> Result<Address> {
        Address::from_str(&self.multicall_address)
            .map_err(|e| eyre!("Invalid MULTICALL_ADDRESS {}: {}", self.multicall_address, e))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate configuration before serving
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL_KATANA - please set a Katana RPC endpoint"));
        }

        self.multicall()?;

        if self.cache_ttl_secs == 0 {
            return Err(eyre!("CACHE_TTL_SECS must be greater than 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(eyre!("HTTP_TIMEOUT_SECS must be greater than 0"));
        }
        if self.reward_tokens.is_empty() {
            return Err(eyre!("REWARD_TOKEN_ALLOWLIST is empty - no rewards would ever count"));
        }
        if !(self.katana_token_fdv.is_finite() && self.katana_token_fdv > 0.0) {
            return Err(eyre!("KATANA_TOKEN_FDV must be positive (currently {})", self.katana_token_fdv));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let set = |v: bool| if v { "✓ Configured" } else { "✗ Not Set" };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              KATANA APR - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Port:              {:^40} ║", self.port);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ UPSTREAMS                                                  ║");
        println!("║ • yDaemon:         {:^40} ║", self.ydaemon_base_uri);
        println!("║ • Merkl:           {:^40} ║", self.merkl_base_uri);
        println!("║ • RPC:             {:^40} ║", set(!self.rpc_url.is_empty()));
        println!("║ • Timeout:         {:>38}s ║", self.http_timeout_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REWARDS                                                    ║");
        println!("║ • Reward Tokens:   {:^40} ║", self.reward_tokens.len());
        println!("║ • Token FDV:       ${:<38.0} ║", self.katana_token_fdv);
        println!("║ • Fixed Rate:      {:^40} ║", self.fixed_rate_policy);
        println!("║ • Static Yields:   {:^40} ║",
            self.static_yields_path.as_deref().unwrap_or("embedded")
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CACHE & SECRETS                                            ║");
        println!("║ • TTL:             {:>38}s ║", self.cache_ttl_secs);
        println!("║ • Webhook Secret:  {:^40} ║", set(self.webhook_secret.is_some()));
        println!("║ • Refresh Secret:  {:^40} ║", set(self.refresh_secret.is_some()));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ APR DEBUG                                                  ║");
        println!("║ • Enabled:         {:^40} ║",
            if self.debug.enabled { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("║ • Vault Filter:    {:^40} ║",
            self.debug.vault_filter.as_deref().unwrap_or("-")
        );
        println!("║ • Sample Limit:    {:^40} ║",
            self.debug.sample_limit.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            rpc_url: String::new(),
            chain_id: KATANA_CHAIN_ID,
            multicall_address: MULTICALL3.to_checksum(None),
            ydaemon_base_uri: "https://ydaemon.yearn.fi".to_string(),
            merkl_base_uri: "https://api.merkl.xyz".to_string(),
            http_timeout_secs: 15,
            reward_tokens: WRAPPED_KAT_ADDRESSES.iter().map(|s| s.to_string()).collect(),
            katana_token_fdv: 1_000_000_000.0,
            fixed_rate_policy: FixedRatePolicy::Separate,
            static_yields_path: None,
            cache_ttl_secs: 300,
            webhook_secret: None,
            refresh_secret: None,
            debug: DebugConfig::default(),
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain_id, 747474);
        assert_eq!(config.port, 3000);
        assert_eq!(config.katana_token_fdv, 1_000_000_000.0);
        assert_eq!(config.reward_tokens.len(), 3);
        assert_eq!(config.multicall().unwrap(), MULTICALL3);
        assert!(!config.debug.enabled);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = from_map(&[
            ("PORT", "8080"),
            ("RPC_URL_KATANA", "https://rpc.katana.network"),
            ("YDAEMON_BASE_URI", "http://localhost:9000"),
            ("KATANA_TOKEN_FDV", "2_000_000_000"),
            ("FIXED_RATE_POLICY", "disabled"),
            ("KONG_WEBHOOK_SECRET", "shh"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.ydaemon_base_uri, "http://localhost:9000");
        assert_eq!(config.merkl_base_uri, "https://api.merkl.xyz");
        assert_eq!(config.katana_token_fdv, 2_000_000_000.0);
        assert_eq!(config.fixed_rate_policy, FixedRatePolicy::Disabled);
        assert_eq!(config.webhook_secret.as_deref(), Some("shh"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_settings() {
        let config = from_map(&[
            ("APR_DEBUG_ENABLED", "true"),
            ("APR_DEBUG_VAULT_ADDRESS", "0xE007CA01894c863d7898045ed5A3B4Abf0b18f37"),
            ("APR_DEBUG_SAMPLE_LIMIT", "0"),
        ])
        .unwrap();

        assert!(config.debug.enabled);
        assert_eq!(
            config.debug.vault_filter.as_deref(),
            Some("0xe007ca01894c863d7898045ed5a3b4abf0b18f37")
        );
        // non-positive limits are ignored
        assert_eq!(config.debug.sample_limit, None);

        let config = from_map(&[("APR_DEBUG_ENABLED", "1"), ("APR_DEBUG_SAMPLE_LIMIT", "5")]).unwrap();
        assert!(!config.debug.enabled);
        assert_eq!(config.debug.sample_limit, Some(5));
    }

    #[test]
    fn test_unknown_policy_is_error() {
        assert!(from_map(&[("FIXED_RATE_POLICY", "sometimes")]).is_err());
        assert_eq!(
            "Include-In-Net-APR".parse::<FixedRatePolicy>().unwrap(),
            FixedRatePolicy::IncludeInNetApr
        );
    }

    #[test]
    fn test_validate_rejects_missing_rpc() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            rpc_url: "https://rpc.katana.network".to_string(),
            cache_ttl_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_embedded_static_yields() {
        let tables = StaticYields::embedded().unwrap();
        let pairs: Vec<&str> = tables.steer_points.0.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            pairs,
            vec!["weETH-vbETH", "AUSD-vbUSDC", "vbUSDC-vbUSDT", "vbWBTC-LBTC", "vbWBTC-BTCK"]
        );
        assert_eq!(tables.steer_points.0[0].1, 2.0);
        assert_eq!(tables.bonus_apy("yvUnknown"), 0.0);
    }

    #[test]
    fn test_static_yield_lookup() {
        let mut tables = StaticYields::default();
        tables.bonus_apy.insert("yvvbUSDC".to_string(), 0.068);
        tables.native_yield.insert("yvvbETH".to_string(), 0.02);

        assert_eq!(tables.bonus_apy("yvvbUSDC"), 0.068);
        assert_eq!(tables.bonus_apy("YVVBUSDC"), 0.068);
        assert_eq!(tables.native_yield("yvvbETH"), 0.02);
        assert_eq!(tables.native_yield("yvvbUSDC"), 0.0);
    }
}
