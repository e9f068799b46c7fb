// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

// NOTE: When the observability feature is disabled, provide stub implementations
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
use crate::{counter, describe_counter, describe_gauge, gauge};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "cache_hits_total",
        "Total cache hits, labeled by cache name."
    );
    describe_counter!(
        "cache_miss_total",
        "Total cache misses, labeled by cache name."
    );
    describe_counter!(
        "cache_put_errors_total",
        "Total failed cache writes (fire-and-forget, never propagated)."
    );
    describe_counter!(
        "rpc_pool_read_failures_total",
        "Total pool reads that failed atomically, labeled by chain."
    );
    describe_counter!(
        "subgraph_requests_total",
        "Total GraphQL requests, labeled by result (ok, transport_error, graphql_error)."
    );
    describe_counter!(
        "subgraph_unhealthy_total",
        "Total health checks that refused the subgraph, labeled by reason."
    );
    describe_gauge!(
        "warm_tasks_successful",
        "Successful tasks in the last warm cycle."
    );
    describe_gauge!(
        "warm_tasks_failed",
        "Failed tasks in the last warm cycle."
    );
    describe_gauge!(
        "price_cache_size",
        "Entries currently held by the in-memory price cache."
    );
}

// --- Helper functions to update metrics ---

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_put_error() {
    counter!("cache_put_errors_total", 1);
}

pub fn increment_pool_read_failure(chain: &str) {
    counter!("rpc_pool_read_failures_total", 1, "chain" => chain.to_string());
}

pub fn increment_subgraph_request(result: &'static str) {
    counter!("subgraph_requests_total", 1, "result" => result);
}

pub fn increment_subgraph_unhealthy(reason: &'static str) {
    counter!("subgraph_unhealthy_total", 1, "reason" => reason);
}

pub fn record_warm_cycle(successful: usize, failed: usize) {
    gauge!("warm_tasks_successful", successful as f64);
    gauge!("warm_tasks_failed", failed as f64);
}

pub fn set_price_cache_size(size: f64) {
    gauge!("price_cache_size", size);
}
