//! TTL cache behavior: passive expiry, forced invalidation, key isolation.

use ethers::types::Address;
use farm_state_sdk::cache::{CacheKey, CacheScope, TtlCache};
use std::time::Duration;

#[test]
fn fresh_entry_is_a_hit() {
    let cache = TtlCache::new(Duration::from_secs(45));
    let key = CacheKey::aggregate(43114, None);
    cache.insert(key.clone(), 7u32);
    assert_eq!(cache.get(&key), Some(7));
}

#[test]
fn expired_entry_misses_without_explicit_delete() {
    let cache = TtlCache::new(Duration::from_secs(45));
    let key = CacheKey::aggregate(43114, None);
    cache.insert_with_ttl(key.clone(), 7u32, Duration::from_millis(30));

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.get(&key), None, "entry must expire passively");
    assert!(cache.is_empty(), "expired entry is evicted on read");
}

#[test]
fn remove_forces_a_miss_before_expiry() {
    let cache = TtlCache::new(Duration::from_secs(45));
    let key = CacheKey::aggregate(43114, None);
    cache.insert(key.clone(), 7u32);
    cache.remove(&key);
    assert_eq!(cache.get(&key), None);
}

#[test]
fn scope_invalidation_only_touches_matching_entries() {
    let cache = TtlCache::new(Duration::from_secs(45));
    let pair = Address::repeat_byte(0x11);
    let user = Address::repeat_byte(0x22);
    cache.insert(CacheKey::pool_state(1, pair), 1u32);
    cache.insert(CacheKey::user_position(1, pair, user), 2u32);
    cache.insert(CacheKey::pool_state(2, pair), 3u32);

    cache.invalidate_scope(1, CacheScope::PoolState);
    assert_eq!(cache.get(&CacheKey::pool_state(1, pair)), None);
    assert_eq!(cache.get(&CacheKey::user_position(1, pair, user)), Some(2));
    assert_eq!(cache.get(&CacheKey::pool_state(2, pair)), Some(3));
}
