//! Contract ABIs - public read surfaces only.
//!
//! The aggregator only ever issues view calls, so the bindings are
//! human-readable ABI fragments wrapped in [`BaseContract`] for encoding
//! calldata and decoding return slots.

use ethers::abi::parse_abi;
use ethers::contract::BaseContract;
use once_cell::sync::Lazy;

/// Pool registry: whitelist gate, pool weights, staking-contract lookup and
/// wrapped-native liquidity per pair.
pub static POOL_REGISTRY: Lazy<BaseContract> = Lazy::new(|| {
    BaseContract::from(
        parse_abi(&[
            "function isWhitelisted(address pair) external view returns (bool)",
            "function weights(address pair) external view returns (uint256)",
            "function stakes(address pair) external view returns (address)",
            "function getNativeLiquidity(address pair) external view returns (uint256)",
        ])
        .expect("registry abi"),
    )
});

/// Per-pool staking-rewards contract.
pub static STAKING_REWARDS: Lazy<BaseContract> = Lazy::new(|| {
    BaseContract::from(
        parse_abi(&[
            "function totalSupply() external view returns (uint256)",
            "function rewardRate() external view returns (uint256)",
            "function periodFinish() external view returns (uint256)",
            "function balanceOf(address account) external view returns (uint256)",
            "function earned(address account) external view returns (uint256)",
        ])
        .expect("staking rewards abi"),
    )
});

/// DEX pair factory, used to resolve LP pair addresses for pools configured
/// without an explicit pair address.
pub static PAIR_FACTORY: Lazy<BaseContract> = Lazy::new(|| {
    BaseContract::from(
        parse_abi(&[
            "function getPair(address tokenA, address tokenB) external view returns (address)",
        ])
        .expect("pair factory abi"),
    )
});
