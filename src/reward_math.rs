//! Reward metric derivation.
//!
//! Pure integer math from a [`PoolSnapshot`] to [`DerivedMetrics`]. All
//! intermediate values stay in `U256`; every division truncates toward zero,
//! so results are deterministic across platforms. The user's pool share is
//! scaled to 1e18 fixed point before dividing, which keeps the later
//! multiplication from losing the fractional part.
//!
//! A metric whose inputs are unavailable is `0` - an explicit
//! "not computable" sentinel, never an estimate.

use crate::types::{DerivedMetrics, PoolSnapshot};
use ethers::types::U256;

pub const SECONDS_PER_WEEK: u64 = 604_800;
pub const SECONDS_PER_YEAR: u64 = 31_536_000;
pub const BPS_SCALE: u64 = 10_000;

/// 1e18 fixed-point scale for pool-share math.
fn share_precision() -> U256 {
    U256::exp10(18)
}

/// Pool-wide reward emission per week.
pub fn total_reward_rate_per_week(reward_rate_per_second: U256) -> U256 {
    reward_rate_per_second.saturating_mul(U256::from(SECONDS_PER_WEEK))
}

/// The user's share of the pool in 1e18 fixed point. Zero stake pools yield
/// zero share - there is no division by zero path.
pub fn user_share_of_pool(user_staked: U256, total_staked: U256) -> U256 {
    if total_staked.is_zero() {
        return U256::zero();
    }
    user_staked.saturating_mul(share_precision()) / total_staked
}

/// The user's reward emission per week, truncated toward zero.
pub fn user_reward_rate_per_week(total_per_week: U256, user_share: U256) -> U256 {
    total_per_week.saturating_mul(user_share) / share_precision()
}

/// Annualized staking-reward rate in basis points: yearly reward emission
/// relative to the staked amount. With USD conversion out of scope this is a
/// same-unit ratio; zero when the pool is empty or the reward period is
/// already over.
pub fn staking_apr_bps(
    reward_rate_per_second: U256,
    total_staked: U256,
    period_finished: bool,
) -> u64 {
    if total_staked.is_zero() || period_finished {
        return 0;
    }
    let yearly_bps = reward_rate_per_second
        .saturating_mul(U256::from(SECONDS_PER_YEAR))
        .saturating_mul(U256::from(BPS_SCALE))
        / total_staked;
    if yearly_bps > U256::from(u64::MAX) {
        u64::MAX
    } else {
        yearly_bps.as_u64()
    }
}

/// Derives all display metrics for one snapshot. `now_unix` is passed in so
/// the function stays pure and deterministic under test.
pub fn compute_metrics(snapshot: &PoolSnapshot, now_unix: u64) -> DerivedMetrics {
    let is_period_finished = snapshot.period_finish_unix <= now_unix;

    let total_per_week = total_reward_rate_per_week(snapshot.reward_rate_per_second);
    let user_share = user_share_of_pool(snapshot.user_staked, snapshot.total_staked);
    let user_per_week = user_reward_rate_per_week(total_per_week, user_share);

    let staking_apr = staking_apr_bps(
        snapshot.reward_rate_per_second,
        snapshot.total_staked,
        is_period_finished,
    );
    let swap_fee_apr = snapshot.swap_fee_apr_bps;

    DerivedMetrics {
        total_reward_rate_per_week: total_per_week,
        user_reward_rate_per_week: user_per_week,
        staking_apr_bps: staking_apr,
        swap_fee_apr_bps: swap_fee_apr,
        combined_apr_bps: staking_apr.saturating_add(swap_fee_apr),
        display_tvl: snapshot.total_staked,
        is_period_finished,
    }
}
