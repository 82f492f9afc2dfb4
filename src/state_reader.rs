//! Two-phase on-chain state reads.
//!
//! Phase 1 batches the registry reads (whitelist, weight, staking contract,
//! native liquidity) for every pool with a resolved pair address. Phase 2
//! batches the staking reads (totals, rates, user position) for the pools
//! phase 1 confirmed whitelisted - whitelisting is an authoritative on-chain
//! gate, not a display filter, so non-whitelisted pools never reach phase 2.
//!
//! A batch-level failure in either phase propagates as `Err` so the
//! orchestrator can degrade to per-pool reads. A per-call failure inside a
//! successful batch only zeroes the affected field; the rest of that pool's
//! snapshot still populates.

use crate::chain_client::{CallError, ChainClient};
use crate::contracts::{POOL_REGISTRY, STAKING_REWARDS};
use crate::multicall::{BatchError, Call, CallOutcome, Multicall};
use crate::types::{PoolConfig, PoolSnapshot};
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, U256};
use log::{debug, warn};
use std::sync::Arc;

const REGISTRY_CALLS_PER_POOL: usize = 4;
const STAKING_CALLS_PER_POOL: usize = 5;

/// A configured pool with its resolved LP pair address.
#[derive(Debug, Clone)]
pub struct ResolvedPool {
    pub config: PoolConfig,
    pub pair: Address,
}

/// Outcome of reading one pool's state.
#[derive(Debug, Clone)]
pub enum PoolReadState {
    /// The registry does not whitelist this pair
    NotWhitelisted,
    Ready(PoolSnapshot),
}

pub struct ContractStateReader<C> {
    chain: Arc<C>,
    multicall: Multicall<C>,
    registry: Address,
}

impl<C: ChainClient> ContractStateReader<C> {
    pub fn new(chain: Arc<C>, multicall: Multicall<C>, registry: Address) -> Self {
        Self {
            chain,
            multicall,
            registry,
        }
    }

    /// Reads every pool through the two multicall phases. The result is
    /// aligned with `pools` (one entry per input, same order). `Err` means a
    /// batch-level failure - nothing partial is returned.
    pub async fn read_all(
        &self,
        pools: &[ResolvedPool],
        account: Option<Address>,
    ) -> Result<Vec<PoolReadState>, BatchError> {
        if pools.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 1: registry reads, 4 per pool, one aggregate
        let mut registry_calls = Vec::with_capacity(pools.len() * REGISTRY_CALLS_PER_POOL);
        for pool in pools {
            registry_calls.extend(self.registry_calls(pool.pair)?);
        }
        let registry_outcomes = self.multicall.run(registry_calls).await?;

        let mut rows = Vec::with_capacity(pools.len());
        for (i, pool) in pools.iter().enumerate() {
            let slots = &registry_outcomes[i * REGISTRY_CALLS_PER_POOL..][..REGISTRY_CALLS_PER_POOL];
            rows.push(RegistryRow::parse(pool, slots));
        }

        // Phase 2: staking reads for whitelisted pools only, one aggregate
        let user = account.unwrap_or_else(Address::zero);
        let whitelisted: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.is_whitelisted)
            .map(|(i, _)| i)
            .collect();

        let mut staking_calls = Vec::with_capacity(whitelisted.len() * STAKING_CALLS_PER_POOL);
        for &i in &whitelisted {
            staking_calls.extend(self.staking_calls(rows[i].staking_contract, user)?);
        }
        let staking_outcomes = self.multicall.run(staking_calls).await?;

        let mut results: Vec<PoolReadState> = rows
            .iter()
            .map(|_| PoolReadState::NotWhitelisted)
            .collect();
        for (slot, &i) in whitelisted.iter().enumerate() {
            let slots = &staking_outcomes[slot * STAKING_CALLS_PER_POOL..][..STAKING_CALLS_PER_POOL];
            results[i] = PoolReadState::Ready(rows[i].into_snapshot(slots));
        }

        debug!(
            "state reader: {} pools, {} whitelisted, account {:?}",
            pools.len(),
            whitelisted.len(),
            account
        );
        Ok(results)
    }

    /// Reads one pool with sequential direct calls - the degraded path when
    /// an aggregate itself keeps failing. Field-level reverts degrade to
    /// zero exactly like the batched path; a transport error aborts only
    /// this pool.
    pub async fn read_single(
        &self,
        pool: &ResolvedPool,
        account: Option<Address>,
    ) -> Result<PoolReadState, CallError> {
        let pair = pool.pair;

        let whitelisted = match self.call_registry_bool("isWhitelisted", pair).await {
            Ok(value) => value,
            Err(CallError::Revert(reason)) => {
                warn!("isWhitelisted reverted for {}: {reason}", pool.config.label());
                false
            }
            Err(e) => return Err(e),
        };
        if !whitelisted {
            return Ok(PoolReadState::NotWhitelisted);
        }

        let pool_weight = self.call_registry_uint("weights", pair).await?;
        let staking_contract = match self.call_registry_address("stakes", pair).await {
            Ok(addr) if addr != Address::zero() => addr,
            Ok(_) | Err(CallError::Revert(_)) => pool.config.staking_contract,
            Err(e) => return Err(e),
        };
        // Reverts for pairs without a wrapped-native leg; zero, not fatal
        let native_liquidity = self.call_registry_uint("getNativeLiquidity", pair).await?;

        let user = account.unwrap_or_else(Address::zero);
        let total_staked = self.call_staking_uint(staking_contract, "totalSupply", ()).await?;
        let reward_rate = self.call_staking_uint(staking_contract, "rewardRate", ()).await?;
        let period_finish = self.call_staking_uint(staking_contract, "periodFinish", ()).await?;
        let user_staked = self.call_staking_uint(staking_contract, "balanceOf", user).await?;
        let user_earned = self.call_staking_uint(staking_contract, "earned", user).await?;

        Ok(PoolReadState::Ready(PoolSnapshot {
            is_whitelisted: true,
            pool_weight,
            total_staked,
            reward_rate_per_second: reward_rate,
            period_finish_unix: clamp_to_u64(period_finish),
            user_staked,
            user_earned,
            native_liquidity,
            swap_fee_apr_bps: 0,
        }))
    }

    fn registry_calls(&self, pair: Address) -> Result<Vec<Call>, BatchError> {
        ["isWhitelisted", "weights", "stakes", "getNativeLiquidity"]
            .into_iter()
            .map(|name| {
                Ok(Call {
                    target: self.registry,
                    call_data: encode(&POOL_REGISTRY, name, pair)?,
                })
            })
            .collect()
    }

    fn staking_calls(&self, staking: Address, user: Address) -> Result<Vec<Call>, BatchError> {
        let mut calls = Vec::with_capacity(STAKING_CALLS_PER_POOL);
        for name in ["totalSupply", "rewardRate", "periodFinish"] {
            calls.push(Call {
                target: staking,
                call_data: encode(&STAKING_REWARDS, name, ())?,
            });
        }
        for name in ["balanceOf", "earned"] {
            calls.push(Call {
                target: staking,
                call_data: encode(&STAKING_REWARDS, name, user)?,
            });
        }
        Ok(calls)
    }

    async fn call_registry_bool(&self, name: &str, pair: Address) -> Result<bool, CallError> {
        let data = encode(&POOL_REGISTRY, name, pair)
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let bytes = self.chain.eth_call(self.registry, data).await?;
        POOL_REGISTRY
            .decode_output::<bool, _>(name, bytes)
            .map_err(|e| CallError::Revert(format!("decoding {name}: {e}")))
    }

    async fn call_registry_address(&self, name: &str, pair: Address) -> Result<Address, CallError> {
        let data = encode(&POOL_REGISTRY, name, pair)
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let bytes = self.chain.eth_call(self.registry, data).await?;
        POOL_REGISTRY
            .decode_output::<Address, _>(name, bytes)
            .map_err(|e| CallError::Revert(format!("decoding {name}: {e}")))
    }

    /// Registry uint read with revert-to-zero semantics.
    async fn call_registry_uint(&self, name: &str, pair: Address) -> Result<U256, CallError> {
        let data = encode(&POOL_REGISTRY, name, pair)
            .map_err(|e| CallError::Transport(e.to_string()))?;
        match self.chain.eth_call(self.registry, data).await {
            Ok(bytes) => Ok(POOL_REGISTRY
                .decode_output::<U256, _>(name, bytes)
                .unwrap_or_default()),
            Err(CallError::Revert(_)) => Ok(U256::zero()),
            Err(e) => Err(e),
        }
    }

    /// Staking uint read with revert-to-zero semantics.
    async fn call_staking_uint<A: ethers::abi::Tokenize>(
        &self,
        staking: Address,
        name: &str,
        args: A,
    ) -> Result<U256, CallError> {
        let data = encode(&STAKING_REWARDS, name, args)
            .map_err(|e| CallError::Transport(e.to_string()))?;
        match self.chain.eth_call(staking, data).await {
            Ok(bytes) => Ok(STAKING_REWARDS
                .decode_output::<U256, _>(name, bytes)
                .unwrap_or_default()),
            Err(CallError::Revert(_)) => Ok(U256::zero()),
            Err(e) => Err(e),
        }
    }
}

/// Registry-phase results for one pool, before the staking phase fills the
/// remaining fields.
#[derive(Debug, Clone, Copy)]
struct RegistryRow {
    is_whitelisted: bool,
    pool_weight: U256,
    staking_contract: Address,
    native_liquidity: U256,
}

impl RegistryRow {
    fn parse(pool: &ResolvedPool, slots: &[CallOutcome]) -> Self {
        // Slot order mirrors registry_calls(). A failed whitelist read is
        // treated as not whitelisted; a failed stakes read falls back to the
        // configured hint; failed uints degrade to zero.
        let is_whitelisted = decode_slot::<bool>(&POOL_REGISTRY, "isWhitelisted", &slots[0])
            .unwrap_or(false);
        let pool_weight =
            decode_slot::<U256>(&POOL_REGISTRY, "weights", &slots[1]).unwrap_or_default();
        let staking_contract = decode_slot::<Address>(&POOL_REGISTRY, "stakes", &slots[2])
            .filter(|addr| *addr != Address::zero())
            .unwrap_or(pool.config.staking_contract);
        let native_liquidity =
            decode_slot::<U256>(&POOL_REGISTRY, "getNativeLiquidity", &slots[3])
                .unwrap_or_default();

        Self {
            is_whitelisted,
            pool_weight,
            staking_contract,
            native_liquidity,
        }
    }

    fn into_snapshot(self, slots: &[CallOutcome]) -> PoolSnapshot {
        // Slot order mirrors staking_calls()
        PoolSnapshot {
            is_whitelisted: true,
            pool_weight: self.pool_weight,
            total_staked: decode_slot::<U256>(&STAKING_REWARDS, "totalSupply", &slots[0])
                .unwrap_or_default(),
            reward_rate_per_second: decode_slot::<U256>(&STAKING_REWARDS, "rewardRate", &slots[1])
                .unwrap_or_default(),
            period_finish_unix: clamp_to_u64(
                decode_slot::<U256>(&STAKING_REWARDS, "periodFinish", &slots[2])
                    .unwrap_or_default(),
            ),
            user_staked: decode_slot::<U256>(&STAKING_REWARDS, "balanceOf", &slots[3])
                .unwrap_or_default(),
            user_earned: decode_slot::<U256>(&STAKING_REWARDS, "earned", &slots[4])
                .unwrap_or_default(),
            native_liquidity: self.native_liquidity,
            swap_fee_apr_bps: 0,
        }
    }
}

fn encode<A: ethers::abi::Tokenize>(
    contract: &BaseContract,
    name: &str,
    args: A,
) -> Result<Bytes, BatchError> {
    contract
        .encode(name, args)
        .map_err(|e| BatchError(format!("encoding {name}: {e}")))
}

fn decode_slot<D: ethers::abi::Detokenize>(
    contract: &BaseContract,
    name: &str,
    outcome: &CallOutcome,
) -> Option<D> {
    let payload = outcome.payload()?;
    contract.decode_output::<D, _>(name, payload.clone()).ok()
}

fn clamp_to_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}
