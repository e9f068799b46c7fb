//! # Cache Warmer Service
//!
//! Continuous service that precomputes the critical DEX payloads (health,
//! pool listings, token summaries, subgraph meta) into the KV cache on a
//! fixed interval, so readers never hit a cold cache.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin cache_warmer            # run forever
//! cargo run --bin cache_warmer -- --once  # single warm cycle
//! ```
//!
//! Press Ctrl+C to stop gracefully.

use anyhow::Result;
use clap::Parser;
use lb_aggregator_sdk::{
    aggregator::Aggregator,
    cache::{CacheStore, MemoryKvStore},
    chain_reader::ChainReader,
    settings::Settings,
    subgraph::SubgraphClient,
    warmer::CacheWarmer,
};
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cache_warmer", about = "Warm critical DEX cache entries")]
struct Args {
    /// Run a single warm cycle and exit
    #[arg(long)]
    once: bool,
    /// Override the warm interval from configuration (seconds)
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    println!("🚀 Starting Cache Warmer Service");

    // 1. Load settings
    let settings = Settings::new()?;
    println!("✅ Settings loaded");

    // 2. Durable KV store: Redis when configured and compiled in, otherwise in-memory
    let cache = build_cache_store(&settings).await;

    // 3. Data sources
    let chain_reader = Arc::new(ChainReader::from_settings(&settings)?);
    println!("✅ Chain reader created ({} chains)", settings.chains.len());
    let subgraph = Arc::new(SubgraphClient::from_settings(&settings.subgraph));
    println!("✅ Subgraph client created ({})", settings.subgraph.endpoint);

    // 4. Aggregator + warmer
    let aggregator = Arc::new(Aggregator::new(subgraph, chain_reader, cache));
    let warm_interval = Duration::from_secs(
        args.interval.unwrap_or(settings.cache.warm_interval_seconds),
    );
    let warmer = Arc::new(CacheWarmer::new(
        aggregator,
        settings.warming.clone(),
        warm_interval,
    ));

    if args.once {
        let summary = warmer.warm_critical_endpoints().await;
        println!(
            "✅ Warm cycle finished: {} successful, {} failed",
            summary.successful, summary.failed
        );
        return Ok(());
    }

    println!("🔄 Warming every {:?}, press Ctrl+C to stop...\n", warm_interval);
    let warm_handle = tokio::spawn(warmer.run_periodic());

    signal::ctrl_c().await?;
    println!("\n🛑 Shutdown signal received, stopping tasks...");
    warm_handle.abort();
    println!("✅ Shutdown complete");

    Ok(())
}

async fn build_cache_store(settings: &Settings) -> CacheStore {
    #[cfg(feature = "redis")]
    if let Some(url) = &settings.cache.redis_url {
        match lb_aggregator_sdk::redis_store::RedisKvStore::connect(url).await {
            Ok(store) => {
                println!("✅ Redis KV store connected ({})", url);
                return CacheStore::new(Arc::new(store))
                    .with_min_ttl(settings.cache.min_ttl_seconds);
            }
            Err(e) => {
                println!("⚠️  Redis unavailable ({}), falling back to in-memory store", e);
            }
        }
    }
    println!("✅ In-memory KV store ready");
    CacheStore::new(Arc::new(MemoryKvStore::new())).with_min_ttl(settings.cache.min_ttl_seconds)
}
