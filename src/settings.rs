use crate::types::PoolConfig;
use anyhow::Context as _;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Chain {
    pub chain_id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,
}

fn default_call_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct Contracts {
    pub multicall: String,
    pub pool_registry: String,
    pub pair_factory: String,
}

/// One configured pool. Addresses stay as strings here; they are parsed once
/// when the aggregator is constructed.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolEntry {
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub token0: String,
    pub token1: String,
    pub staking_contract: String,
    #[serde(default)]
    pub pair_address: Option<String>,
    pub reward_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_ttl_seconds() -> u64 {
    45
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Performance {
    #[serde(default = "default_multicall_batch_size")]
    pub multicall_batch_size: usize,
    #[serde(default = "default_multicall_max_retries")]
    pub multicall_max_retries: u32,
    #[serde(default = "default_fallback_concurrency")]
    pub fallback_concurrency: usize,
}

fn default_multicall_batch_size() -> usize {
    100
}
fn default_multicall_max_retries() -> u32 {
    1
}
fn default_fallback_concurrency() -> usize {
    4
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            multicall_batch_size: default_multicall_batch_size(),
            multicall_max_retries: default_multicall_max_retries(),
            fallback_concurrency: default_fallback_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubgraphSettings {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Empty url disables the secondary source entirely
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_subgraph_timeout_ms")]
    pub timeout_ms: u64,
    /// Indexed entries older than this are skipped for the cycle
    #[serde(default = "default_subgraph_max_lag_seconds")]
    pub max_lag_seconds: u64,
    #[serde(default = "default_subgraph_failure_cooldown_seconds")]
    pub failure_cooldown_seconds: u64,
}

fn default_false() -> bool {
    false
}
fn default_subgraph_timeout_ms() -> u64 {
    800
}
fn default_subgraph_max_lag_seconds() -> u64 {
    120
}
fn default_subgraph_failure_cooldown_seconds() -> u64 {
    60
}

impl Default for SubgraphSettings {
    fn default() -> Self {
        Self {
            enabled: default_false(),
            url: String::new(),
            timeout_ms: default_subgraph_timeout_ms(),
            max_lag_seconds: default_subgraph_max_lag_seconds(),
            failure_cooldown_seconds: default_subgraph_failure_cooldown_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metrics {
    pub enabled: bool,
    pub port: u16,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub chain: Chain,
    pub rpc: Rpc,
    pub contracts: Contracts,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub subgraph: SubgraphSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub metrics: Metrics,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable overrides for deployment-specific values
        if let Ok(raw_http) = env::var("FARM_SDK_RPC_HTTP_URLS") {
            if let Some(list) = parse_string_list(&raw_http) {
                if !list.is_empty() {
                    settings.rpc.http_urls = list;
                }
            }
        }
        if let Ok(raw_url) = env::var("FARM_SDK_SUBGRAPH_URL") {
            let trimmed = raw_url.trim();
            if !trimmed.is_empty() {
                settings.subgraph.url = trimmed.to_string();
            }
        }

        Ok(settings)
    }

    /// Parses the configured pool entries into typed [`PoolConfig`]s.
    /// A malformed address is a construction-time error, not a per-cycle one.
    pub fn pool_configs(&self) -> anyhow::Result<Vec<PoolConfig>> {
        self.pools
            .iter()
            .map(|entry| {
                let label = format!("{}-{}", entry.token0_symbol, entry.token1_symbol);
                Ok(PoolConfig {
                    token0_symbol: entry.token0_symbol.clone(),
                    token1_symbol: entry.token1_symbol.clone(),
                    token0: entry
                        .token0
                        .parse()
                        .with_context(|| format!("pool {label}: token0"))?,
                    token1: entry
                        .token1
                        .parse()
                        .with_context(|| format!("pool {label}: token1"))?,
                    staking_contract: entry
                        .staking_contract
                        .parse()
                        .with_context(|| format!("pool {label}: staking_contract"))?,
                    pair_hint: entry
                        .pair_address
                        .as_deref()
                        .map(str::parse)
                        .transpose()
                        .with_context(|| format!("pool {label}: pair_address"))?,
                    reward_token: entry
                        .reward_token
                        .parse()
                        .with_context(|| format!("pool {label}: reward_token"))?,
                })
            })
            .collect()
    }
}

/// Accepts either a JSON list or a comma-separated list, with or without
/// quotes - deployment environments disagree on the format.
fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
        let parts: Vec<String> = without_brackets
            .split(',')
            .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Some(parts);
    }

    let parts: Vec<String> = trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_lists_accept_json_and_csv() {
        assert_eq!(
            parse_string_list(r#"["http://a", "http://b"]"#).unwrap(),
            vec!["http://a", "http://b"]
        );
        assert_eq!(
            parse_string_list("http://a, http://b").unwrap(),
            vec!["http://a", "http://b"]
        );
        assert_eq!(parse_string_list("  ").unwrap(), Vec::<String>::new());
    }
}
