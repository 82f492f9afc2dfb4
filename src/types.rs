//! Core data model: pool configuration, per-cycle snapshots, derived
//! metrics, and the aggregation result handed to consumers.

use ethers::types::{Address, U256};

/// Static descriptor of one LP-staking pool. Loaded once from settings and
/// never mutated afterwards.
///
/// The `staking_contract` field is a hint: the registry's `stakes(pair)`
/// answer is authoritative at read time and this value is only used when
/// that single read fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Symbol of the first token in the pair (display only)
    pub token0_symbol: String,
    /// Symbol of the second token in the pair (display only)
    pub token1_symbol: String,
    /// First token of the LP pair
    pub token0: Address,
    /// Second token of the LP pair
    pub token1: Address,
    /// Staking-rewards contract hint
    pub staking_contract: Address,
    /// Known LP pair address, if configured; otherwise resolved lazily
    /// through the pair factory
    pub pair_hint: Option<Address>,
    /// Token the pool pays rewards in
    pub reward_token: Address,
}

impl PoolConfig {
    /// Display label used in logs, e.g. `AVAX-USDC`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.token0_symbol, self.token1_symbol)
    }
}

/// Raw per-cycle aggregate of one pool's on-chain state.
///
/// Snapshots are always replaced wholesale - there is no field-level update
/// path, so a reader can never observe a half-written snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub is_whitelisted: bool,
    pub pool_weight: U256,
    /// Total LP tokens staked in the pool
    pub total_staked: U256,
    /// Reward tokens emitted per second (wei)
    pub reward_rate_per_second: U256,
    /// Unix timestamp at which reward emission stops
    pub period_finish_unix: u64,
    /// LP tokens staked by the queried account (zero when no account)
    pub user_staked: U256,
    /// Unclaimed rewards of the queried account (wei)
    pub user_earned: U256,
    /// Wrapped-native liquidity of the pair; zero when the pair has no
    /// native-wrapped leg (the read reverts there)
    pub native_liquidity: U256,
    /// Swap-fee APR in basis points. Only the indexed secondary source can
    /// supply this (fee volume has no single on-chain read); zero otherwise.
    pub swap_fee_apr_bps: u64,
}

/// Metrics derived from a [`PoolSnapshot`]. Computed on demand, never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedMetrics {
    /// Pool-wide reward emission per week (wei)
    pub total_reward_rate_per_week: U256,
    /// The queried account's reward emission per week (wei)
    pub user_reward_rate_per_week: U256,
    /// Annualized staking-reward rate in basis points; zero when not
    /// computable
    pub staking_apr_bps: u64,
    /// Annualized swap-fee rate in basis points; zero when not computable
    pub swap_fee_apr_bps: u64,
    /// `staking_apr_bps + swap_fee_apr_bps`
    pub combined_apr_bps: u64,
    /// Staked LP-token amount shown as the pool's TVL
    pub display_tvl: U256,
    pub is_period_finished: bool,
}

/// Why a pool could not be materialized this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The registry does not whitelist this pair (covers both
    /// never-whitelisted and delisted pools - the registry surface cannot
    /// distinguish them)
    NotWhitelisted,
    /// No pair address configured and the factory lookup found none.
    /// Retrying cannot fix missing configuration.
    MissingPairAddress,
    /// Every read strategy failed for this pool
    ReadFailed,
}

/// Availability of a pool's data within an [`AggregationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(UnavailableReason),
}

/// One pool's complete view-model: configuration plus the latest snapshot
/// and derived metrics, or an explicit unavailable sentinel.
#[derive(Debug, Clone)]
pub struct PoolView {
    pub config: PoolConfig,
    pub snapshot: PoolSnapshot,
    pub metrics: DerivedMetrics,
    pub availability: Availability,
}

impl PoolView {
    pub fn available(config: PoolConfig, snapshot: PoolSnapshot, metrics: DerivedMetrics) -> Self {
        Self {
            config,
            snapshot,
            metrics,
            availability: Availability::Available,
        }
    }

    /// The sentinel produced when no strategy could resolve a pool: zeroed
    /// amounts, zero combined APR, reward period shown as finished. The pool
    /// is rendered, never dropped from the result.
    pub fn unavailable(config: PoolConfig, reason: UnavailableReason) -> Self {
        Self {
            config,
            snapshot: PoolSnapshot::default(),
            metrics: DerivedMetrics {
                is_period_finished: true,
                ..DerivedMetrics::default()
            },
            availability: Availability::Unavailable(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.availability, Availability::Available)
    }
}

/// How many pools each strategy finalized in a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceBreakdown {
    pub from_subgraph: usize,
    pub from_multicall: usize,
    pub from_individual_calls: usize,
    pub unavailable: usize,
}

/// Ordered result of one aggregation cycle: exactly one [`PoolView`] per
/// configured pool, independent of partial failures. Each cycle produces a
/// fresh result that supersedes the previous one.
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub chain_id: u64,
    pub account: Option<Address>,
    pub pools: Vec<PoolView>,
    pub sources: SourceBreakdown,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
