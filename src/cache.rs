//! Generic TTL cache shared across refresh cycles.
//!
//! Entries expire passively: `get` checks the deadline at read time, evicts
//! and reports a miss. A miss never triggers a fetch - fetch orchestration
//! lives in the orchestrator, the cache only stores.
//!
//! Keys are composed deterministically from chain, scope and the optional
//! pair/user dimensions, so per-user fields can never collide with
//! pool-wide fields and a targeted refresh can invalidate exactly the
//! entries it means to.

use crate::metrics;
use dashmap::DashMap;
use ethers::types::Address;
use std::time::{Duration, Instant};

/// What a cache entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// A full aggregation result
    Aggregate,
    /// One pool's pool-wide snapshot data
    PoolState,
    /// One account's stake/earned data for one pool
    UserPosition,
}

impl CacheScope {
    fn as_str(&self) -> &'static str {
        match self {
            CacheScope::Aggregate => "aggregate",
            CacheScope::PoolState => "pool_state",
            CacheScope::UserPosition => "user_position",
        }
    }
}

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chain_id: u64,
    pub scope: CacheScope,
    pub pair: Option<Address>,
    pub user: Option<Address>,
}

impl CacheKey {
    pub fn aggregate(chain_id: u64, user: Option<Address>) -> Self {
        Self {
            chain_id,
            scope: CacheScope::Aggregate,
            pair: None,
            user,
        }
    }

    pub fn pool_state(chain_id: u64, pair: Address) -> Self {
        Self {
            chain_id,
            scope: CacheScope::PoolState,
            pair: Some(pair),
            user: None,
        }
    }

    pub fn user_position(chain_id: u64, pair: Address, user: Address) -> Self {
        Self {
            chain_id,
            scope: CacheScope::UserPosition,
            pair: Some(pair),
            user: Some(user),
        }
    }
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Expiring key/value store. Values are replaced wholesale on insert;
/// readers never observe a partially written entry.
pub struct TtlCache<T> {
    entries: DashMap<CacheKey, CacheEntry<T>>,
    default_ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Returns the cached value, or `None` on miss or passive expiry.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        // The read guard must be released before evicting, so the expiry
        // check and the removal are two steps.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                metrics::increment_cache_hit(key.scope.as_str());
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        metrics::increment_cache_miss(key.scope.as_str());
        None
    }

    pub fn insert(&self, key: CacheKey, value: T) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: CacheKey, value: T, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        metrics::set_cache_size(self.entries.len() as f64);
    }

    /// Forced invalidation of one key, e.g. on user-triggered refresh.
    pub fn remove(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drops every entry of the given scope on a chain.
    pub fn invalidate_scope(&self, chain_id: u64, scope: CacheScope) {
        self.entries
            .retain(|key, _| !(key.chain_id == chain_id && key.scope == scope));
    }

    /// Drops every entry referencing `user` on a chain, leaving pool-wide
    /// entries untouched.
    pub fn invalidate_user(&self, chain_id: u64, user: Address) {
        self.entries
            .retain(|key, _| !(key.chain_id == chain_id && key.user == Some(user)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
