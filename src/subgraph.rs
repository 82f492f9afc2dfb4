//! Indexed secondary source (subgraph) client.
//!
//! The subgraph serves the same logical fields as the on-chain reads,
//! pre-aggregated, so a healthy subgraph saves an entire multicall cycle.
//! It is an accelerant only: it never supplies pool configuration, and data
//! older than the configured lag is ignored for the cycle so live chain
//! reads win any material disagreement.

use crate::metrics;
use crate::settings::SubgraphSettings;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const FARMS_QUERY: &str = r#"
query Farms($pairs: [String!]!) {
  farms(where: { pair_in: $pairs }) {
    pair
    isWhitelisted
    poolWeight
    totalStaked
    rewardRatePerSecond
    periodFinish
    nativeLiquidity
    swapFeeAprBps
    updatedAt
  }
}
"#;

const POSITIONS_QUERY: &str = r#"
query Positions($user: String!, $pairs: [String!]!) {
  positions(where: { user: $user, pair_in: $pairs }) {
    pair
    staked
    earned
  }
}
"#;

/// Pool-wide farm state as indexed by the subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphFarm {
    pub pair: Address,
    pub is_whitelisted: bool,
    pub pool_weight: U256,
    pub total_staked: U256,
    pub reward_rate_per_second: U256,
    pub period_finish_unix: u64,
    pub native_liquidity: U256,
    pub swap_fee_apr_bps: u64,
    pub updated_at_unix: u64,
}

/// One account's stake in one farm, as indexed.
#[derive(Debug, Clone)]
pub struct SubgraphPosition {
    pub pair: Address,
    pub staked: U256,
    pub earned: U256,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct FarmsData {
    farms: Vec<RawFarm>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFarm {
    pair: String,
    is_whitelisted: bool,
    pool_weight: String,
    total_staked: String,
    reward_rate_per_second: String,
    period_finish: String,
    native_liquidity: String,
    #[serde(default)]
    swap_fee_apr_bps: Option<String>,
    updated_at: String,
}

#[derive(Deserialize)]
struct PositionsData {
    positions: Vec<RawPosition>,
}

#[derive(Deserialize)]
struct RawPosition {
    pair: String,
    staked: String,
    earned: String,
}

/// HTTP GraphQL client with health tracking.
///
/// A failed query marks the source unhealthy; after `failure_cooldown` the
/// next cycle is allowed to probe it again. Consumers can also switch the
/// source off entirely.
pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
    enabled: AtomicBool,
    healthy: AtomicBool,
    last_failure_unix: AtomicU64,
    failure_cooldown: Duration,
    max_lag_seconds: u64,
}

impl SubgraphClient {
    pub fn new(settings: &SubgraphSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("building subgraph http client")?;
        Ok(Self {
            http,
            url: settings.url.clone(),
            enabled: AtomicBool::new(settings.enabled),
            healthy: AtomicBool::new(true),
            last_failure_unix: AtomicU64::new(0),
            failure_cooldown: Duration::from_secs(settings.failure_cooldown_seconds),
            max_lag_seconds: settings.max_lag_seconds,
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            // A manual re-enable is an explicit vote of confidence
            self.healthy.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Whether the orchestrator should try the subgraph this cycle.
    pub fn is_active(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.healthy.load(Ordering::Relaxed) {
            return true;
        }
        let last_failure = self.last_failure_unix.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        now.saturating_sub(last_failure) >= self.failure_cooldown.as_secs()
    }

    /// Whether an indexed farm entry is fresh enough to use instead of a
    /// live chain read.
    pub fn is_fresh(&self, farm: &SubgraphFarm, now_unix: u64) -> bool {
        let fresh = now_unix.saturating_sub(farm.updated_at_unix) <= self.max_lag_seconds;
        if !fresh {
            warn!(
                pair = ?farm.pair,
                updated_at = farm.updated_at_unix,
                "subgraph entry too stale, deferring to chain reads"
            );
        }
        fresh
    }

    /// Fetches pool-wide farm state for the given pairs.
    pub async fn fetch_farms(&self, pairs: &[Address]) -> Result<HashMap<Address, SubgraphFarm>> {
        metrics::increment_subgraph_request("farms");
        let variables = serde_json::json!({ "pairs": to_hex_list(pairs) });
        let data: FarmsData = self.post(FARMS_QUERY, variables).await?;

        let mut farms = HashMap::with_capacity(data.farms.len());
        for raw in data.farms {
            match parse_farm(&raw) {
                Ok(farm) => {
                    farms.insert(farm.pair, farm);
                }
                Err(e) => warn!(pair = %raw.pair, "skipping malformed subgraph farm: {e}"),
            }
        }
        debug!("subgraph returned {} of {} farms", farms.len(), pairs.len());
        Ok(farms)
    }

    /// Fetches one account's positions for the given pairs.
    pub async fn fetch_positions(
        &self,
        user: Address,
        pairs: &[Address],
    ) -> Result<HashMap<Address, SubgraphPosition>> {
        metrics::increment_subgraph_request("positions");
        let variables = serde_json::json!({
            "user": format!("{user:?}"),
            "pairs": to_hex_list(pairs),
        });
        let data: PositionsData = self.post(POSITIONS_QUERY, variables).await?;

        let mut positions = HashMap::with_capacity(data.positions.len());
        for raw in data.positions {
            match parse_position(&raw) {
                Ok(position) => {
                    positions.insert(position.pair, position);
                }
                Err(e) => warn!(pair = %raw.pair, "skipping malformed subgraph position: {e}"),
            }
        }
        Ok(positions)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let result = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.mark_unhealthy();
                return Err(anyhow!(e).context("subgraph request failed"));
            }
        };

        let body: GraphQlResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                self.mark_unhealthy();
                return Err(anyhow!(e).context("decoding subgraph response"));
            }
        };

        if let Some(errors) = body.errors {
            self.mark_unhealthy();
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow!("subgraph errors: {}", messages.join("; ")));
        }

        let data = body.data.ok_or_else(|| {
            self.mark_unhealthy();
            anyhow!("subgraph response had neither data nor errors")
        })?;

        self.healthy.store(true, Ordering::Relaxed);
        Ok(data)
    }

    fn mark_unhealthy(&self) {
        metrics::increment_subgraph_failure();
        self.healthy.store(false, Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.last_failure_unix.store(now, Ordering::Relaxed);
    }
}

fn to_hex_list(pairs: &[Address]) -> Vec<String> {
    pairs.iter().map(|pair| format!("{pair:?}")).collect()
}

fn parse_farm(raw: &RawFarm) -> Result<SubgraphFarm> {
    Ok(SubgraphFarm {
        pair: raw.pair.parse().context("pair address")?,
        is_whitelisted: raw.is_whitelisted,
        pool_weight: U256::from_dec_str(&raw.pool_weight).context("poolWeight")?,
        total_staked: U256::from_dec_str(&raw.total_staked).context("totalStaked")?,
        reward_rate_per_second: U256::from_dec_str(&raw.reward_rate_per_second)
            .context("rewardRatePerSecond")?,
        period_finish_unix: raw.period_finish.parse().context("periodFinish")?,
        native_liquidity: U256::from_dec_str(&raw.native_liquidity).context("nativeLiquidity")?,
        swap_fee_apr_bps: raw
            .swap_fee_apr_bps
            .as_deref()
            .map(str::parse)
            .transpose()
            .context("swapFeeAprBps")?
            .unwrap_or(0),
        updated_at_unix: raw.updated_at.parse().context("updatedAt")?,
    })
}

fn parse_position(raw: &RawPosition) -> Result<SubgraphPosition> {
    Ok(SubgraphPosition {
        pair: raw.pair.parse().context("pair address")?,
        staked: U256::from_dec_str(&raw.staked).context("staked")?,
        earned: U256::from_dec_str(&raw.earned).context("earned")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_farm_entities_from_response_json() {
        let body = r#"{
            "data": {
                "farms": [{
                    "pair": "0x1111111111111111111111111111111111111111",
                    "isWhitelisted": true,
                    "poolWeight": "500",
                    "totalStaked": "1000000000000000000000000",
                    "rewardRatePerSecond": "1000000000000000000",
                    "periodFinish": "1900000000",
                    "nativeLiquidity": "42",
                    "swapFeeAprBps": "120",
                    "updatedAt": "1700000000"
                }]
            }
        }"#;
        let parsed: GraphQlResponse<FarmsData> = serde_json::from_str(body).unwrap();
        let farms = parsed.data.unwrap().farms;
        assert_eq!(farms.len(), 1);
        let farm = parse_farm(&farms[0]).unwrap();
        assert!(farm.is_whitelisted);
        assert_eq!(farm.swap_fee_apr_bps, 120);
        assert_eq!(farm.total_staked, U256::exp10(24));
        assert_eq!(farm.period_finish_unix, 1_900_000_000);
    }

    #[test]
    fn missing_swap_fee_apr_defaults_to_zero() {
        let raw = RawFarm {
            pair: "0x1111111111111111111111111111111111111111".to_string(),
            is_whitelisted: false,
            pool_weight: "0".to_string(),
            total_staked: "0".to_string(),
            reward_rate_per_second: "0".to_string(),
            period_finish: "0".to_string(),
            native_liquidity: "0".to_string(),
            swap_fee_apr_bps: None,
            updated_at: "0".to_string(),
        };
        assert_eq!(parse_farm(&raw).unwrap().swap_fee_apr_bps, 0);
    }
}
