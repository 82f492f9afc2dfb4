// src/metrics.rs

#[cfg(feature = "observability")]
pub use ::metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

// NOTE: When the observability feature is disabled, provide stub macros so
// call sites compile to nothing.
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initializes the descriptions for all metrics in the crate.
/// Call once at startup when the Prometheus exporter is installed.
pub fn describe_metrics() {
    describe_counter!(
        "farm_cache_hits_total",
        Unit::Count,
        "Total cache hits, labeled by cache scope."
    );
    describe_counter!(
        "farm_cache_miss_total",
        Unit::Count,
        "Total cache misses (including passive expiries), labeled by cache scope."
    );
    describe_gauge!("farm_cache_size", "Current number of live cache entries.");
    describe_histogram!(
        "farm_multicall_batch_size",
        "Distribution of multicall batch sizes."
    );
    describe_histogram!(
        "farm_refresh_duration_seconds",
        Unit::Seconds,
        "End-to-end duration of one aggregation refresh cycle."
    );
    describe_counter!(
        "farm_fallback_individual_total",
        Unit::Count,
        "Times a batch-level multicall failure degraded to per-pool calls."
    );
    describe_counter!(
        "farm_subgraph_requests_total",
        Unit::Count,
        "Total subgraph queries issued, labeled by kind."
    );
    describe_counter!(
        "farm_subgraph_failures_total",
        Unit::Count,
        "Total subgraph query failures."
    );
    describe_gauge!(
        "farm_pools_unavailable",
        "Pools rendered unavailable in the last aggregation cycle."
    );
}

// --- Helper functions to update metrics ---

pub fn increment_cache_hit(scope: &str) {
    counter!("farm_cache_hits_total", 1, "scope" => scope.to_string());
}

pub fn increment_cache_miss(scope: &str) {
    counter!("farm_cache_miss_total", 1, "scope" => scope.to_string());
}

pub fn set_cache_size(size: f64) {
    gauge!("farm_cache_size", size);
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("farm_multicall_batch_size", size);
}

pub fn record_refresh_duration(duration: std::time::Duration) {
    histogram!("farm_refresh_duration_seconds", duration.as_secs_f64());
}

pub fn increment_fallback_individual() {
    counter!("farm_fallback_individual_total", 1);
}

pub fn increment_subgraph_request(kind: &'static str) {
    counter!("farm_subgraph_requests_total", 1, "kind" => kind);
}

pub fn increment_subgraph_failure() {
    counter!("farm_subgraph_failures_total", 1);
}

pub fn set_pools_unavailable(count: f64) {
    gauge!("farm_pools_unavailable", count);
}
