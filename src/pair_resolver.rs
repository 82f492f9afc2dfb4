//! Lazy LP pair address resolution.
//!
//! A pool configured without an explicit pair address gets one from the
//! factory's `getPair(tokenA, tokenB)` on first need. Resolved addresses are
//! cached for the lifetime of the resolver - a pair address never changes
//! once deployed on a chain, so there is no TTL here.

use crate::chain_client::{CallError, ChainClient};
use crate::contracts::PAIR_FACTORY;
use crate::types::PoolConfig;
use dashmap::DashMap;
use ethers::types::Address;
use log::{debug, warn};
use std::sync::Arc;

/// Session cache key: `(chain_id, token0, token1)` with normalized token
/// order so `(A, B)` and `(B, A)` hit the same slot.
type PairKey = (u64, Address, Address);

pub struct PairResolver<C> {
    chain: Arc<C>,
    factory: Address,
    resolved: DashMap<PairKey, Address>,
}

impl<C: ChainClient> PairResolver<C> {
    pub fn new(chain: Arc<C>, factory: Address) -> Self {
        Self {
            chain,
            factory,
            resolved: DashMap::new(),
        }
    }

    /// Resolves the LP pair address for a pool. The configured hint wins;
    /// otherwise the factory is asked once per session. `None` means the
    /// pool is unresolvable - missing configuration that retries cannot fix.
    pub async fn resolve(&self, config: &PoolConfig) -> Option<Address> {
        if let Some(hint) = config.pair_hint {
            return Some(hint);
        }

        let key = normalized_key(self.chain.chain_id(), config.token0, config.token1);
        if let Some(cached) = self.resolved.get(&key) {
            return Some(*cached);
        }

        let call_data = PAIR_FACTORY
            .encode("getPair", (config.token0, config.token1))
            .ok()?;
        let pair = match self.chain.eth_call(self.factory, call_data).await {
            Ok(bytes) => PAIR_FACTORY
                .decode_output::<Address, _>("getPair", bytes)
                .ok()?,
            Err(CallError::Revert(reason)) => {
                warn!("getPair reverted for {}: {reason}", config.label());
                return None;
            }
            Err(CallError::Transport(e)) => {
                warn!("getPair transport failure for {}: {e}", config.label());
                return None;
            }
        };

        if pair == Address::zero() {
            debug!("factory has no pair for {}", config.label());
            return None;
        }

        self.resolved.insert(key, pair);
        debug!("resolved pair {:?} for {}", pair, config.label());
        Some(pair)
    }

    /// Number of pairs resolved this session.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

fn normalized_key(chain_id: u64, a: Address, b: Address) -> PairKey {
    if a <= b {
        (chain_id, a, b)
    } else {
        (chain_id, b, a)
    }
}
