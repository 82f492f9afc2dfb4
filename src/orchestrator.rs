//! Aggregation orchestrator.
//!
//! Coordinates one refresh cycle per cache key through the fallback
//! cascade:
//!
//! ```text
//! Idle → TrySubgraph → TryMulticall → TryIndividualCalls → Done
//! ```
//!
//! Any stage may finalize pools and short-circuit the rest. No stage
//! failure is fatal - the worst outcome for a pool is the explicit
//! unavailable sentinel, so the result always carries exactly one entry per
//! configured pool. Only an empty pool configuration is a hard error.

use crate::cache::{CacheKey, TtlCache};
use crate::chain_client::ChainClient;
use crate::metrics;
use crate::multicall::Multicall;
use crate::pair_resolver::PairResolver;
use crate::reward_math;
use crate::settings::Settings;
use crate::state_reader::{ContractStateReader, PoolReadState, ResolvedPool};
use crate::subgraph::SubgraphClient;
use crate::types::{
    AggregationResult, PoolConfig, PoolSnapshot, PoolView, SourceBreakdown, UnavailableReason,
};
use anyhow::Context;
use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use ethers::types::Address;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors crossing the public aggregation boundary. Partial-data problems
/// never do - they degrade inside the cascade instead.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("no pools configured")]
    NoPoolsConfigured,
    #[error("refresh superseded by a newer chain/account context")]
    Superseded,
}

/// Tag identifying which chain/account a refresh cycle is computing for.
/// A context change while a cycle is in flight makes its result stale on
/// arrival: discarded, not last-writer-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RefreshContext {
    chain_id: u64,
    account: Option<Address>,
}

/// Cascade stage, for logging and tests via the stage transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    TrySubgraph,
    TryMulticall,
    TryIndividualCalls,
    Done,
}

/// Per-pool progress through a cycle.
enum Slot {
    Pending(ResolvedPool),
    Done(PoolView),
}

/// Top-level LP-staking aggregation engine.
///
/// Owns the whole read path: pair resolution, the subgraph accelerator, the
/// batched and per-pool chain readers, the TTL cache and the published
/// current result.
pub struct FarmAggregator<C> {
    chain: Arc<C>,
    reader: ContractStateReader<C>,
    pair_resolver: PairResolver<C>,
    subgraph: Option<Arc<SubgraphClient>>,
    cache: TtlCache<Arc<AggregationResult>>,
    pools: Vec<PoolConfig>,
    fallback_concurrency: usize,
    refresh_locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    active_context: ArcSwap<RefreshContext>,
    current: ArcSwapOption<AggregationResult>,
}

impl<C: ChainClient + 'static> FarmAggregator<C> {
    pub fn new(chain: Arc<C>, settings: &Settings) -> anyhow::Result<Self> {
        let multicall_address: Address = settings
            .contracts
            .multicall
            .parse()
            .context("contracts.multicall address")?;
        let registry: Address = settings
            .contracts
            .pool_registry
            .parse()
            .context("contracts.pool_registry address")?;
        let factory: Address = settings
            .contracts
            .pair_factory
            .parse()
            .context("contracts.pair_factory address")?;
        let pools = settings.pool_configs()?;

        let multicall = Multicall::new(
            chain.clone(),
            multicall_address,
            settings.performance.multicall_batch_size,
        )
        .with_retries(settings.performance.multicall_max_retries);

        let subgraph = if settings.subgraph.url.is_empty() {
            None
        } else {
            Some(Arc::new(SubgraphClient::new(&settings.subgraph)?))
        };

        let chain_id = settings.chain.chain_id;
        Ok(Self {
            reader: ContractStateReader::new(chain.clone(), multicall, registry),
            pair_resolver: PairResolver::new(chain.clone(), factory),
            subgraph,
            cache: TtlCache::new(Duration::from_secs(settings.cache.ttl_seconds)),
            pools,
            fallback_concurrency: settings.performance.fallback_concurrency.max(1),
            refresh_locks: DashMap::new(),
            active_context: ArcSwap::from_pointee(RefreshContext {
                chain_id,
                account: None,
            }),
            current: ArcSwapOption::empty(),
            chain,
        })
    }

    /// Returns the aggregation result for `account`, served from cache when
    /// fresh. A refresh already in flight for the same key is joined, not
    /// duplicated - the second caller waits and reads the first one's
    /// result without issuing another RPC batch.
    pub async fn aggregate(
        &self,
        account: Option<Address>,
    ) -> Result<Arc<AggregationResult>, AggregationError> {
        if self.pools.is_empty() {
            return Err(AggregationError::NoPoolsConfigured);
        }

        let chain_id = self.chain.chain_id();
        let context = RefreshContext { chain_id, account };
        self.active_context.store(Arc::new(context.clone()));

        let key = CacheKey::aggregate(chain_id, account);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        // Whoever held the lock first has filled the cache by now
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let started = Instant::now();
        let result = Arc::new(self.run_cycle(account).await);
        metrics::record_refresh_duration(started.elapsed());

        if **self.active_context.load() != context {
            debug!(?context, "discarding stale aggregation result");
            return Err(AggregationError::Superseded);
        }

        self.cache.insert(key, result.clone());
        self.current.store(Some(result.clone()));
        Ok(result)
    }

    /// Manual refresh: clears exactly the entries belonging to this key and
    /// recomputes from the start of the cascade.
    pub async fn refresh(
        &self,
        account: Option<Address>,
    ) -> Result<Arc<AggregationResult>, AggregationError> {
        let chain_id = self.chain.chain_id();
        self.cache.remove(&CacheKey::aggregate(chain_id, account));
        if let Some(user) = account {
            self.cache.invalidate_user(chain_id, user);
        }
        self.aggregate(account).await
    }

    /// Most recently published result, if any cycle has completed.
    pub fn current(&self) -> Option<Arc<AggregationResult>> {
        self.current.load_full()
    }

    /// Switches the indexed secondary source on or off for subsequent
    /// cycles.
    pub fn set_secondary_source_enabled(&self, enabled: bool) {
        if let Some(subgraph) = &self.subgraph {
            subgraph.set_enabled(enabled);
            info!(enabled, "secondary source toggled");
        }
    }

    /// One full cascade. Infallible: every pool ends up either finalized
    /// with data or as the unavailable sentinel.
    async fn run_cycle(&self, account: Option<Address>) -> AggregationResult {
        let chain_id = self.chain.chain_id();
        let now_unix = chrono::Utc::now().timestamp().max(0) as u64;
        let mut stage = Stage::Idle;
        let mut sources = SourceBreakdown::default();

        // Pair resolution; pools without one are unavailable right away,
        // retrying cannot fix missing configuration
        let resolve_futures: Vec<_> = self
            .pools
            .iter()
            .map(|config| Box::pin(self.pair_resolver.resolve(config)))
            .collect();
        let resolved: Vec<Option<Address>> = stream::iter(resolve_futures)
            .buffered(self.fallback_concurrency)
            .collect()
            .await;

        let mut slots: Vec<Slot> = self
            .pools
            .iter()
            .zip(resolved)
            .map(|(config, pair)| match pair {
                Some(pair) => Slot::Pending(ResolvedPool {
                    config: config.clone(),
                    pair,
                }),
                None => Slot::Done(PoolView::unavailable(
                    config.clone(),
                    UnavailableReason::MissingPairAddress,
                )),
            })
            .collect();

        if let Some(subgraph) = self.subgraph.as_ref().filter(|s| s.is_active()) {
            stage = self.advance(stage, Stage::TrySubgraph);
            self.try_subgraph(subgraph, &mut slots, account, now_unix, &mut sources)
                .await;
        }

        let pending: Vec<usize> = pending_indices(&slots);
        if !pending.is_empty() {
            stage = self.advance(stage, Stage::TryMulticall);
            let unresolved: Vec<ResolvedPool> = pending
                .iter()
                .map(|&i| match &slots[i] {
                    Slot::Pending(pool) => pool.clone(),
                    Slot::Done(_) => unreachable!("pending index points at finalized slot"),
                })
                .collect();

            match self.reader.read_all(&unresolved, account).await {
                Ok(states) => {
                    for (state, &i) in states.into_iter().zip(&pending) {
                        self.finalize_chain_read(&mut slots[i], state, now_unix, &mut sources, false);
                    }
                }
                Err(e) => {
                    warn!("multicall phase degraded, retrying per pool: {e}");
                    metrics::increment_fallback_individual();
                    stage = self.advance(stage, Stage::TryIndividualCalls);
                    self.try_individual_calls(&unresolved, &pending, &mut slots, account, now_unix, &mut sources)
                        .await;
                }
            }
        }

        let _ = self.advance(stage, Stage::Done);

        let pools: Vec<PoolView> = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Done(view) => view,
                Slot::Pending(pool) => {
                    PoolView::unavailable(pool.config, UnavailableReason::ReadFailed)
                }
            })
            .collect();

        sources.unavailable = pools.iter().filter(|view| !view.is_available()).count();
        metrics::set_pools_unavailable(sources.unavailable as f64);
        debug_assert_eq!(pools.len(), self.pools.len());

        AggregationResult {
            chain_id,
            account,
            pools,
            sources,
        }
    }

    /// Finalizes every pending pool the subgraph fully and freshly covers;
    /// the rest fall through to the chain. Whitelisting stays an on-chain
    /// decision - a farm the subgraph reports as non-whitelisted is left for
    /// the registry to confirm.
    async fn try_subgraph(
        &self,
        subgraph: &Arc<SubgraphClient>,
        slots: &mut [Slot],
        account: Option<Address>,
        now_unix: u64,
        sources: &mut SourceBreakdown,
    ) {
        let pairs: Vec<Address> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Pending(pool) => Some(pool.pair),
                Slot::Done(_) => None,
            })
            .collect();

        let farms = match subgraph.fetch_farms(&pairs).await {
            Ok(farms) => farms,
            Err(e) => {
                warn!("subgraph unavailable this cycle: {e:#}");
                return;
            }
        };

        let positions = match account {
            Some(user) => match subgraph.fetch_positions(user, &pairs).await {
                Ok(positions) => positions,
                Err(e) => {
                    // Pool data without user data would silently zero the
                    // account's stake; defer the whole cycle to the chain
                    warn!("subgraph positions unavailable, deferring to chain: {e:#}");
                    return;
                }
            },
            None => HashMap::new(),
        };

        for slot in slots.iter_mut() {
            let (config, pair) = match slot {
                Slot::Pending(pool) => (pool.config.clone(), pool.pair),
                Slot::Done(_) => continue,
            };
            let Some(farm) = farms.get(&pair) else {
                continue;
            };
            if !farm.is_whitelisted || !subgraph.is_fresh(farm, now_unix) {
                continue;
            }

            let (user_staked, user_earned) = positions
                .get(&pair)
                .map(|position| (position.staked, position.earned))
                .unwrap_or_default();
            let snapshot = PoolSnapshot {
                is_whitelisted: true,
                pool_weight: farm.pool_weight,
                total_staked: farm.total_staked,
                reward_rate_per_second: farm.reward_rate_per_second,
                period_finish_unix: farm.period_finish_unix,
                user_staked,
                user_earned,
                native_liquidity: farm.native_liquidity,
                swap_fee_apr_bps: farm.swap_fee_apr_bps,
            };
            let metrics = reward_math::compute_metrics(&snapshot, now_unix);
            *slot = Slot::Done(PoolView::available(config, snapshot, metrics));
            sources.from_subgraph += 1;
        }
    }

    /// Per-pool degraded path with bounded parallelism, so one bad pool
    /// cannot block the rest.
    async fn try_individual_calls(
        &self,
        unresolved: &[ResolvedPool],
        pending: &[usize],
        slots: &mut [Slot],
        account: Option<Address>,
        now_unix: u64,
        sources: &mut SourceBreakdown,
    ) {
        let read_futures: Vec<_> = unresolved
            .iter()
            .zip(pending.iter().copied())
            .map(|(pool, i)| Box::pin(async move { (i, self.reader.read_single(pool, account).await) }))
            .collect();
        let reads: Vec<(usize, Result<PoolReadState, _>)> = stream::iter(read_futures)
            .buffer_unordered(self.fallback_concurrency)
            .collect()
            .await;

        for (i, read) in reads {
            match read {
                Ok(state) => {
                    self.finalize_chain_read(&mut slots[i], state, now_unix, sources, true)
                }
                Err(e) => {
                    let config = match &slots[i] {
                        Slot::Pending(pool) => pool.config.clone(),
                        Slot::Done(_) => continue,
                    };
                    warn!("pool {} unavailable after all strategies: {e}", config.label());
                    slots[i] =
                        Slot::Done(PoolView::unavailable(config, UnavailableReason::ReadFailed));
                }
            }
        }
    }

    fn finalize_chain_read(
        &self,
        slot: &mut Slot,
        state: PoolReadState,
        now_unix: u64,
        sources: &mut SourceBreakdown,
        individual: bool,
    ) {
        let config = match slot {
            Slot::Pending(pool) => pool.config.clone(),
            Slot::Done(_) => return,
        };
        *slot = match state {
            PoolReadState::Ready(snapshot) => {
                let metrics = reward_math::compute_metrics(&snapshot, now_unix);
                if individual {
                    sources.from_individual_calls += 1;
                } else {
                    sources.from_multicall += 1;
                }
                Slot::Done(PoolView::available(config, snapshot, metrics))
            }
            PoolReadState::NotWhitelisted => Slot::Done(PoolView::unavailable(
                config,
                UnavailableReason::NotWhitelisted,
            )),
        };
    }

    fn advance(&self, from: Stage, to: Stage) -> Stage {
        debug!(?from, ?to, "aggregation stage transition");
        to
    }
}

fn pending_indices(slots: &[Slot]) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| matches!(slot, Slot::Pending(_)).then_some(i))
        .collect()
}
