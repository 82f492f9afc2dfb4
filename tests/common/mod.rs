//! Simulated chain for integration tests.
//!
//! Implements [`ChainClient`] over an in-memory registry, staking contracts
//! and pair factory, including the Multicall3 `aggregate3` surface, so the
//! whole fallback cascade can be exercised with injected failures and call
//! counting - no RPC endpoint and no outage simulation required.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, U256};
use farm_state_sdk::chain_client::{CallError, ChainClient};
use farm_state_sdk::contracts::{PAIR_FACTORY, POOL_REGISTRY, STAKING_REWARDS};
use farm_state_sdk::settings::{
    CacheSettings, Chain, Contracts, LogSettings, Metrics, Performance, PoolEntry, Rpc, Settings,
    SubgraphSettings,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn e18(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

fn selector(contract: &BaseContract, name: &str) -> [u8; 4] {
    contract
        .abi()
        .function(name)
        .expect("known function")
        .short_signature()
}

/// One simulated farm: registry row plus staking-contract state.
#[derive(Debug, Clone)]
pub struct SimFarm {
    pub pair: Address,
    pub staking: Address,
    pub whitelisted: bool,
    pub weight: U256,
    pub total_staked: U256,
    pub reward_rate: U256,
    pub period_finish: u64,
    /// `None` makes `getNativeLiquidity` revert, like a pair without a
    /// wrapped-native leg
    pub native_liquidity: Option<U256>,
    pub balances: HashMap<Address, U256>,
    pub earned: HashMap<Address, U256>,
}

impl SimFarm {
    pub fn new(pair: Address, staking: Address) -> Self {
        Self {
            pair,
            staking,
            whitelisted: true,
            weight: U256::from(100u64),
            total_staked: e18(1_000_000),
            reward_rate: e18(1),
            period_finish: 4_000_000_000,
            native_liquidity: Some(e18(500)),
            balances: HashMap::new(),
            earned: HashMap::new(),
        }
    }

    pub fn with_position(mut self, user: Address, staked: U256, earned: U256) -> Self {
        self.balances.insert(user, staked);
        self.earned.insert(user, earned);
        self
    }
}

pub struct SimulatedChain {
    chain_id: u64,
    pub multicall_address: Address,
    pub registry: Address,
    pub factory: Address,
    farms_by_pair: HashMap<Address, SimFarm>,
    staking_to_pair: HashMap<Address, Address>,
    factory_pairs: HashMap<(Address, Address), Address>,
    /// Batch-level outage: every aggregate3 call fails at transport level
    pub fail_aggregate: AtomicBool,
    /// Transport outage for direct (non-aggregate) calls
    pub fail_direct_calls: AtomicBool,
    /// Artificial latency per call, in milliseconds
    pub call_delay_ms: AtomicU64,
    pub aggregate_calls: AtomicU64,
    pub eth_calls: AtomicU64,
}

impl SimulatedChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            multicall_address: addr(0xA1),
            registry: addr(0xB1),
            factory: addr(0xC1),
            farms_by_pair: HashMap::new(),
            staking_to_pair: HashMap::new(),
            factory_pairs: HashMap::new(),
            fail_aggregate: AtomicBool::new(false),
            fail_direct_calls: AtomicBool::new(false),
            call_delay_ms: AtomicU64::new(0),
            aggregate_calls: AtomicU64::new(0),
            eth_calls: AtomicU64::new(0),
        }
    }

    pub fn add_farm(&mut self, farm: SimFarm) {
        self.staking_to_pair.insert(farm.staking, farm.pair);
        self.farms_by_pair.insert(farm.pair, farm);
    }

    /// Registers a factory mapping so pools without a configured pair
    /// address can resolve through `getPair`.
    pub fn add_factory_pair(&mut self, token0: Address, token1: Address, pair: Address) {
        self.factory_pairs.insert(order(token0, token1), pair);
    }

    /// Settings wired to this chain's contract addresses.
    pub fn settings(&self, pools: Vec<PoolEntry>) -> Settings {
        Settings {
            chain: Chain {
                chain_id: self.chain_id,
            },
            rpc: Rpc {
                http_urls: vec![],
                call_timeout_seconds: 5,
            },
            contracts: Contracts {
                multicall: format!("{:?}", self.multicall_address),
                pool_registry: format!("{:?}", self.registry),
                pair_factory: format!("{:?}", self.factory),
            },
            pools,
            cache: CacheSettings { ttl_seconds: 45 },
            performance: Performance::default(),
            subgraph: SubgraphSettings::default(),
            log: LogSettings::default(),
            metrics: Metrics::default(),
        }
    }

    fn dispatch(&self, target: Address, data: &[u8]) -> Result<Vec<u8>, String> {
        if data.len() < 4 {
            return Err("calldata too short".to_string());
        }
        let sel: [u8; 4] = data[..4].try_into().unwrap();

        if target == self.factory {
            if sel == selector(&PAIR_FACTORY, "getPair") {
                let (a, b) = decode_two_addresses(data)?;
                let pair = self
                    .factory_pairs
                    .get(&order(a, b))
                    .copied()
                    .unwrap_or_default();
                return Ok(abi::encode(&[Token::Address(pair)]));
            }
            return Err("unknown factory function".to_string());
        }

        if target == self.registry {
            let pair = decode_one_address(data)?;
            let farm = self.farms_by_pair.get(&pair);
            if sel == selector(&POOL_REGISTRY, "isWhitelisted") {
                let whitelisted = farm.map(|f| f.whitelisted).unwrap_or(false);
                return Ok(abi::encode(&[Token::Bool(whitelisted)]));
            }
            if sel == selector(&POOL_REGISTRY, "weights") {
                let weight = farm.map(|f| f.weight).unwrap_or_default();
                return Ok(abi::encode(&[Token::Uint(weight)]));
            }
            if sel == selector(&POOL_REGISTRY, "stakes") {
                let staking = farm.map(|f| f.staking).unwrap_or_default();
                return Ok(abi::encode(&[Token::Address(staking)]));
            }
            if sel == selector(&POOL_REGISTRY, "getNativeLiquidity") {
                return match farm.and_then(|f| f.native_liquidity) {
                    Some(value) => Ok(abi::encode(&[Token::Uint(value)])),
                    None => Err("execution reverted: no native leg".to_string()),
                };
            }
            return Err("unknown registry function".to_string());
        }

        if let Some(pair) = self.staking_to_pair.get(&target) {
            let farm = self
                .farms_by_pair
                .get(pair)
                .ok_or_else(|| "farm missing".to_string())?;
            if sel == selector(&STAKING_REWARDS, "totalSupply") {
                return Ok(abi::encode(&[Token::Uint(farm.total_staked)]));
            }
            if sel == selector(&STAKING_REWARDS, "rewardRate") {
                return Ok(abi::encode(&[Token::Uint(farm.reward_rate)]));
            }
            if sel == selector(&STAKING_REWARDS, "periodFinish") {
                return Ok(abi::encode(&[Token::Uint(U256::from(farm.period_finish))]));
            }
            if sel == selector(&STAKING_REWARDS, "balanceOf") {
                let user = decode_one_address(data)?;
                let staked = farm.balances.get(&user).copied().unwrap_or_default();
                return Ok(abi::encode(&[Token::Uint(staked)]));
            }
            if sel == selector(&STAKING_REWARDS, "earned") {
                let user = decode_one_address(data)?;
                let earned = farm.earned.get(&user).copied().unwrap_or_default();
                return Ok(abi::encode(&[Token::Uint(earned)]));
            }
            return Err("unknown staking function".to_string());
        }

        Err(format!("no code at {target:?}"))
    }

    fn run_aggregate(&self, data: &[u8]) -> Result<Bytes, String> {
        let decoded = abi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ])))],
            &data[4..],
        )
        .map_err(|e| format!("bad aggregate3 calldata: {e}"))?;

        let calls = decoded
            .into_iter()
            .next()
            .and_then(Token::into_array)
            .ok_or_else(|| "aggregate3 calldata missing call array".to_string())?;

        let mut result_tokens = Vec::with_capacity(calls.len());
        for call in calls {
            let tuple = call.into_tuple().ok_or_else(|| "call slot is not a tuple".to_string())?;
            let target = tuple[0].clone().into_address().ok_or_else(|| "bad target".to_string())?;
            let inner_data = match &tuple[2] {
                Token::Bytes(bytes) => bytes.clone(),
                _ => return Err("bad call data".to_string()),
            };
            let slot = match self.dispatch(target, &inner_data) {
                Ok(bytes) => Token::Tuple(vec![Token::Bool(true), Token::Bytes(bytes)]),
                Err(_) => Token::Tuple(vec![Token::Bool(false), Token::Bytes(vec![])]),
            };
            result_tokens.push(slot);
        }

        Ok(Bytes::from(abi::encode(&[Token::Array(result_tokens)])))
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, CallError> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.call_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if to == self.multicall_address {
            self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_aggregate.load(Ordering::SeqCst) {
                return Err(CallError::Transport("injected aggregate outage".to_string()));
            }
            return self.run_aggregate(&data).map_err(CallError::Transport);
        }

        if self.fail_direct_calls.load(Ordering::SeqCst) {
            return Err(CallError::Transport("injected direct-call outage".to_string()));
        }
        match self.dispatch(to, &data) {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(reason) => Err(CallError::Revert(reason)),
        }
    }
}

pub fn pool_entry(
    symbols: (&str, &str),
    token0: Address,
    token1: Address,
    staking: Address,
    pair_hint: Option<Address>,
    reward_token: Address,
) -> PoolEntry {
    PoolEntry {
        token0_symbol: symbols.0.to_string(),
        token1_symbol: symbols.1.to_string(),
        token0: format!("{token0:?}"),
        token1: format!("{token1:?}"),
        staking_contract: format!("{staking:?}"),
        pair_address: pair_hint.map(|pair| format!("{pair:?}")),
        reward_token: format!("{reward_token:?}"),
    }
}

fn order(a: Address, b: Address) -> (Address, Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn decode_one_address(data: &[u8]) -> Result<Address, String> {
    abi::decode(&[ParamType::Address], &data[4..])
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| "missing address argument".to_string())
}

fn decode_two_addresses(data: &[u8]) -> Result<(Address, Address), String> {
    let mut tokens = abi::decode(&[ParamType::Address, ParamType::Address], &data[4..])
        .map_err(|e| e.to_string())?
        .into_iter();
    let a = tokens
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| "missing tokenA".to_string())?;
    let b = tokens
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| "missing tokenB".to_string())?;
    Ok((a, b))
}
