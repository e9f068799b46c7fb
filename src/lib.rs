//! # LB Aggregator SDK
//!
//! A Rust library for aggregating, reconciling and caching Liquidity Book
//! pool state on BNB Smart Chain. The SDK joins two disjoint data sources -
//! a direct chain RPC connection and an indexed subgraph - into one
//! consistent, cache-backed view.
//!
//! ## Overview
//!
//! - **Chain reading**: atomic multi-field pool reads, factory pagination,
//!   bounded event-log scans for user bin positions
//! - **Subgraph querying**: typed GraphQL queries with a freshness/error
//!   health gate deciding whether indexed data may be served at all
//! - **Reconciliation**: stablecoin price correction and TVL recomputation
//!   from reserves and corrected prices
//! - **Caching**: per-data-class TTL policy over a durable KV seam, with a
//!   background warm scheduler for critical payloads
//!
//! ## Architecture
//!
//! The [`Aggregator`] orchestrates per request: the health gate admits or
//! refuses the subgraph, direct chain reads cover the fallback where they
//! exist, and the two sources are never mixed inside one record. Every
//! served payload carries the source that produced it.

// Core Types
/// Domain records (pools, tokens, positions, health)
pub mod types;
/// Configuration management
pub mod settings;

// Data Sources
/// RPC-backed contract reader for LB pairs
pub mod chain_reader;
/// GraphQL subgraph client and health gate
pub mod subgraph;

// Reconciliation
/// Stablecoin price correction and TVL recomputation
pub mod price_correction;
/// Request orchestration and source fallback
pub mod aggregator;

// Caching
/// Key builder, TTL policy and the KV store seam
pub mod cache;
/// Event-driven cache invalidation patterns
pub mod invalidation;
/// Background warm scheduler
pub mod warmer;
/// Redis-backed KV store (optional, feature-gated)
#[cfg(feature = "redis")]
pub mod redis_store;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Smart contract ABIs (read-only)
pub mod contracts;
/// Block-range and time helpers
pub mod utils;

// Re-exports for convenience
pub use aggregator::{Aggregator, AggregatorError, Served, ServedSource};
pub use cache::{CacheStore, CacheTtl, KvStore, MemoryKvStore};
pub use chain_reader::{ChainReader, RpcError};
pub use invalidation::{CacheInvalidator, DomainEvent};
pub use price_correction::{correct_token_price, recalculate_tvl};
pub use settings::Settings;
pub use subgraph::SubgraphClient;
pub use types::{HealthStatus, Pool24hStats, PoolRecord, TokenInfo};
pub use warmer::CacheWarmer;
