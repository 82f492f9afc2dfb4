//! # Farm State SDK
//!
//! A Rust library for LP-staking state aggregation and caching on EVM
//! chains. The SDK turns the dozens of raw contract reads behind a fleet of
//! staking-reward pools into consistent, low-latency view-models: stake
//! balances, reward rates, APRs and TVL.
//!
//! ## Overview
//!
//! The engine reads each pool through a fallback cascade and always returns
//! one view per configured pool:
//!
//! - **Batching**: registry and staking reads are packed into Multicall3
//!   aggregates, two round trips for the whole pool set.
//! - **Reconciliation**: an optional indexed subgraph serves the same fields
//!   pre-aggregated and is preferred while healthy, cutting RPC load.
//! - **Degradation**: a failed aggregate degrades to bounded-parallel
//!   per-pool reads; a pool that every strategy misses is rendered as an
//!   explicit unavailable sentinel instead of being dropped.
//! - **Caching**: results live in a TTL cache keyed by chain, scope, pair
//!   and account, with passive expiry and targeted invalidation.
//!
//! ## Architecture
//!
//! ```text
//! pool config ─┐
//!              ├─> pair resolution ─> subgraph / multicall / per-pool reads
//! chain client ┘                          │
//!                                reward metric derivation
//!                                          │
//!                                   TTL cache ─> consumer
//! ```

// Core Types
/// Pool configuration, snapshots, derived metrics and aggregation results
pub mod types;

// Chain Access
/// Read-only chain access trait and the ethers-backed implementation
pub mod chain_client;
/// Contract ABIs (read-only view surfaces)
pub mod contracts;
/// Multicall batch executor
pub mod multicall;

// Aggregation Pipeline
/// Lazy LP pair address resolution
pub mod pair_resolver;
/// Two-phase registry/staking state reads
pub mod state_reader;
/// Indexed secondary source client
pub mod subgraph;
/// Fallback orchestration and result publication
pub mod orchestrator;

// Derived Data & Storage
/// Pure reward metric derivation
pub mod reward_math;
/// Generic TTL cache
pub mod cache;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use chain_client::{CallError, ChainClient, RpcChainClient};
pub use multicall::{Call, CallOutcome, Multicall};
pub use orchestrator::{AggregationError, FarmAggregator};
pub use settings::Settings;
pub use types::{AggregationResult, PoolConfig, PoolSnapshot, PoolView};
