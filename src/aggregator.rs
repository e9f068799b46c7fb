// src/aggregator.rs
//
// Orchestrates the subgraph client, chain reader and cache for each request.
// Source selection is an explicit state machine: try the subgraph while the
// health gate admits it, fall back to direct chain reads where implemented,
// and otherwise surface an unavailable condition. Subgraph and chain data are
// never merged into one record - a chain read at block N combined with
// subgraph pricing synced to block M would not be internally consistent.

use crate::cache::{self, CacheStore, CacheTtl};
use crate::chain_reader::{parse_address, ChainReader, RpcError};
use crate::price_correction::recalculate_tvl;
use crate::subgraph::{LbPairDayData, SubgraphClient, SubgraphMeta, SubgraphPool};
use crate::types::{
    DexAnalytics, HealthStatus, LiquidityPosition, Pool24hStats, PoolOnChain, PoolRecord,
    TokenInfo, TokenSummary, UserBinLiquidity,
};
use crate::utils::unix_now;
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("data unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Which upstream produced a response. Recorded on every served payload so
/// the fallback path stays auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedSource {
    Subgraph,
    Chain,
}

/// A payload tagged with the source that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Served<T> {
    pub data: T,
    pub source: ServedSource,
}

/// Fallback progression for one request. Each state has exactly one exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataSource {
    TrySubgraph,
    TryFallback,
    Exhausted,
}

/// Central orchestrator. Constructed once per process and passed by
/// reference into callers; holds no request-scoped state.
pub struct Aggregator {
    subgraph: Arc<SubgraphClient>,
    chain: Arc<ChainReader>,
    cache: CacheStore,
}

impl Aggregator {
    pub fn new(subgraph: Arc<SubgraphClient>, chain: Arc<ChainReader>, cache: CacheStore) -> Self {
        Self {
            subgraph,
            chain,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Subgraph admission verdict, cached briefly so bursts of requests do
    /// not hammer the meta query.
    pub async fn check_health(&self) -> HealthStatus {
        let key = cache::health_key();
        if let Some(cached) = self.cache.get_json::<HealthStatus>(&key).await {
            return cached;
        }
        let status = self.subgraph.check_health().await;
        self.cache.put_json(&key, &status, CacheTtl::HEALTH).await;
        status
    }

    /// Raw subgraph sync metadata, cached under the metadata TTL class.
    pub async fn get_subgraph_meta(&self) -> Result<Option<SubgraphMeta>, AggregatorError> {
        let key = cache::request_key(cache::prefix::API, "/subgraph/meta", None);
        if let Some(cached) = self.cache.get_json::<Option<SubgraphMeta>>(&key).await {
            return Ok(cached);
        }
        let meta = self
            .subgraph
            .get_meta()
            .await
            .map_err(|e| AggregatorError::Unavailable(e.to_string()))?;
        self.cache.put_json(&key, &meta, CacheTtl::METADATA).await;
        Ok(meta)
    }

    /// Pool listing with subgraph-first sourcing and chain fallback.
    pub async fn get_pools(
        &self,
        chain: &str,
        first: u64,
        skip: u64,
        order_by: &str,
        order_direction: &str,
    ) -> Result<Served<Vec<PoolRecord>>, AggregatorError> {
        let action = format!("list:{}:{}:{}:{}", first, skip, order_by, order_direction);
        let key = cache::pool_key(chain, None, Some(&action));
        if let Some(cached) = self.cache.get_json::<Served<Vec<PoolRecord>>>(&key).await {
            return Ok(cached);
        }

        let mut state = DataSource::TrySubgraph;
        loop {
            match state {
                DataSource::TrySubgraph => {
                    let health = self.check_health().await;
                    if health.healthy {
                        let pools = self
                            .subgraph
                            .get_pools(first, skip, order_by, order_direction)
                            .await;
                        let records = pools.iter().map(map_subgraph_pool).collect();
                        let served = Served {
                            data: records,
                            source: ServedSource::Subgraph,
                        };
                        self.cache.put_json(&key, &served, CacheTtl::POOLS).await;
                        return Ok(served);
                    }
                    warn!(
                        "Subgraph refused for pool listing: {}",
                        health.error.as_deref().unwrap_or("unknown")
                    );
                    state = DataSource::TryFallback;
                }
                DataSource::TryFallback => match self.chain.get_all_pools(chain, skip, first).await {
                    Ok(batch) => {
                        let records = batch.pools.iter().map(map_onchain_pool).collect();
                        let served = Served {
                            data: records,
                            source: ServedSource::Chain,
                        };
                        self.cache.put_json(&key, &served, CacheTtl::POOLS).await;
                        return Ok(served);
                    }
                    Err(e) => {
                        warn!("Chain fallback for pool listing failed: {}", e);
                        state = DataSource::Exhausted;
                    }
                },
                DataSource::Exhausted => {
                    return Err(AggregatorError::Unavailable(
                        "subgraph unhealthy and chain fallback failed".to_string(),
                    ))
                }
            }
        }
    }

    /// Single pool by pair address, subgraph-first with chain fallback.
    pub async fn get_pool(
        &self,
        chain: &str,
        pair_address: &str,
    ) -> Result<Served<Option<PoolRecord>>, AggregatorError> {
        let address = parse_address(pair_address)?;

        let key = cache::pool_key(chain, Some(pair_address), Some("detail"));
        if let Some(cached) = self.cache.get_json::<Served<Option<PoolRecord>>>(&key).await {
            return Ok(cached);
        }

        let mut state = DataSource::TrySubgraph;
        loop {
            match state {
                DataSource::TrySubgraph => {
                    let health = self.check_health().await;
                    if health.healthy {
                        let pool = self.subgraph.get_pool(pair_address).await;
                        let served = Served {
                            data: pool.as_ref().map(map_subgraph_pool),
                            source: ServedSource::Subgraph,
                        };
                        self.cache.put_json(&key, &served, CacheTtl::POOLS).await;
                        return Ok(served);
                    }
                    state = DataSource::TryFallback;
                }
                DataSource::TryFallback => match self.chain.get_pool_data(chain, address).await {
                    Ok(pool) => {
                        let served = Served {
                            data: Some(map_onchain_pool(&pool)),
                            source: ServedSource::Chain,
                        };
                        self.cache.put_json(&key, &served, CacheTtl::POOLS).await;
                        return Ok(served);
                    }
                    Err(e) => {
                        warn!("Chain fallback for pool {} failed: {}", pair_address, e);
                        state = DataSource::Exhausted;
                    }
                },
                DataSource::Exhausted => {
                    return Err(AggregatorError::Unavailable(
                        "subgraph unhealthy and chain fallback failed".to_string(),
                    ))
                }
            }
        }
    }

    /// Rolling 24h pool stats. Subgraph-only: there is no chain-side
    /// equivalent, so an unhealthy subgraph surfaces as unavailable.
    pub async fn get_pool_24h_stats(&self, pair_address: &str) -> Result<Pool24hStats, AggregatorError> {
        parse_address(pair_address)?;

        let key = cache::analytics_key(pair_address, Some("24h"));
        if let Some(cached) = self.cache.get_json::<Pool24hStats>(&key).await {
            return Ok(cached);
        }

        let health = self.check_health().await;
        if !health.healthy {
            return Err(AggregatorError::Unavailable(
                health.error.unwrap_or_else(|| "subgraph unhealthy".to_string()),
            ));
        }

        let stats = self.subgraph.get_pool_24h_stats(pair_address).await;
        self.cache.put_json(&key, &stats, CacheTtl::ANALYTICS).await;
        Ok(stats)
    }

    /// A user's indexed liquidity positions. Subgraph-only.
    pub async fn get_user_positions(
        &self,
        user_address: &str,
        first: u64,
    ) -> Result<Vec<LiquidityPosition>, AggregatorError> {
        parse_address(user_address)?;

        let key = cache::user_key(user_address, None, None, Some("positions"));
        if let Some(cached) = self.cache.get_json::<Vec<LiquidityPosition>>(&key).await {
            return Ok(cached);
        }

        let health = self.check_health().await;
        if !health.healthy {
            return Err(AggregatorError::Unavailable(
                health.error.unwrap_or_else(|| "subgraph unhealthy".to_string()),
            ));
        }

        let positions: Vec<LiquidityPosition> = self
            .subgraph
            .get_user_positions(user_address, first)
            .await
            .iter()
            .map(|p| LiquidityPosition {
                pool_id: p.lb_pair.id.to_lowercase(),
                pool_name: p.lb_pair.name.clone().unwrap_or_else(|| {
                    format!("{}/{}", p.lb_pair.token_x.symbol, p.lb_pair.token_y.symbol)
                }),
                token_x: TokenInfo::from(&p.lb_pair.token_x),
                token_y: TokenInfo::from(&p.lb_pair.token_y),
                total_value_locked_usd: p.lb_pair.total_value_locked_usd.clone(),
                bin_count: parse_u64(p.bins_count.as_deref()),
                bins: p
                    .user_bin_liquidities
                    .iter()
                    .map(|b| UserBinLiquidity {
                        bin_id: b.bin_id.parse().unwrap_or(0),
                        liquidity: b.liquidity.clone(),
                        timestamp: b.timestamp.parse().unwrap_or(0),
                    })
                    .collect(),
                timestamp: p.timestamp.parse().unwrap_or(0),
            })
            .collect();

        self.cache.put_json(&key, &positions, CacheTtl::USER_DATA).await;
        Ok(positions)
    }

    /// Bins a user currently holds in a pool. Chain-only: derived from
    /// transfer logs validated against live balances, no gate involved.
    pub async fn get_user_bin_ids(
        &self,
        chain: &str,
        user_address: &str,
        pool_address: &str,
    ) -> Result<Vec<u32>, AggregatorError> {
        let user = parse_address(user_address)?;
        let pool = parse_address(pool_address)?;

        let key = cache::user_key(user_address, Some(chain), Some(pool_address), Some("bin-ids"));
        if let Some(cached) = self.cache.get_json::<Vec<u32>>(&key).await {
            return Ok(cached);
        }

        let bin_ids = self.chain.get_user_bin_ids(chain, user, pool).await?;
        self.cache.put_json(&key, &bin_ids, CacheTtl::USER_DATA).await;
        Ok(bin_ids)
    }

    /// Pool search by token symbol or name fragment. Subgraph-only.
    pub async fn search_pools(
        &self,
        search_term: &str,
        first: u64,
    ) -> Result<Vec<PoolRecord>, AggregatorError> {
        let health = self.check_health().await;
        if !health.healthy {
            return Err(AggregatorError::Unavailable(
                health.error.unwrap_or_else(|| "subgraph unhealthy".to_string()),
            ));
        }
        let pools = self.subgraph.search_pools(search_term, first).await;
        Ok(pools.iter().map(map_subgraph_pool).collect())
    }

    /// Exchange-wide analytics with the day-bucket join. Volumes and fees
    /// come from each pool's most recent day bucket; TVL is recomputed from
    /// corrected prices rather than trusted from the subgraph.
    pub async fn get_analytics(&self, chain: &str) -> Result<DexAnalytics, AggregatorError> {
        let key = cache::analytics_key(chain, None);
        if let Some(cached) = self.cache.get_json::<DexAnalytics>(&key).await {
            return Ok(cached);
        }

        let health = self.check_health().await;
        if !health.healthy {
            return Err(AggregatorError::Unavailable(
                health.error.unwrap_or_else(|| "subgraph unhealthy".to_string()),
            ));
        }

        let pools = self
            .subgraph
            .get_pools(1000, 0, "totalValueLockedUSD", "desc")
            .await;
        let day_datas = self.subgraph.get_pools_day_data(1000, 0).await;
        let records: Vec<PoolRecord> = pools.iter().map(map_subgraph_pool).collect();
        let analytics = build_analytics(chain, &records, day_datas);

        self.cache.put_json(&key, &analytics, CacheTtl::ANALYTICS).await;
        Ok(analytics)
    }

    /// Per-token aggregates extracted from the pool set. Subgraph-only.
    pub async fn get_tokens_summary(
        &self,
        chain: &str,
        first: usize,
        skip: usize,
    ) -> Result<Vec<TokenSummary>, AggregatorError> {
        let key = cache::request_key(
            cache::prefix::API,
            &format!("/tokens/{}", chain),
            Some(&format!("first={}&skip={}", first, skip)),
        );
        if let Some(cached) = self.cache.get_json::<Vec<TokenSummary>>(&key).await {
            return Ok(cached);
        }

        let health = self.check_health().await;
        if !health.healthy {
            return Err(AggregatorError::Unavailable(
                health.error.unwrap_or_else(|| "subgraph unhealthy".to_string()),
            ));
        }

        let pools = self.subgraph.get_pools(1000, 0, "timestamp", "desc").await;
        let records: Vec<PoolRecord> = pools.iter().map(map_subgraph_pool).collect();
        let mut tokens = summarize_tokens(&records);
        let page: Vec<TokenSummary> = tokens.drain(..).skip(skip).take(first).collect();

        self.cache.put_json(&key, &page, CacheTtl::STATIC).await;
        Ok(page)
    }
}

fn parse_u64(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn parse_f64(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0.0)
}

/// Maps an indexed pool into a reconciled record. The corrected TVL replaces
/// the subgraph's raw field; raw per-side prices are kept for callers.
pub fn map_subgraph_pool(pool: &SubgraphPool) -> PoolRecord {
    let token_x = TokenInfo::from(&pool.token_x);
    let token_y = TokenInfo::from(&pool.token_y);
    let mut record = PoolRecord {
        id: pool.id.to_lowercase(),
        name: pool
            .name
            .clone()
            .unwrap_or_else(|| format!("{}/{}", token_x.symbol, token_y.symbol)),
        token_x,
        token_y,
        bin_step: pool.bin_step.parse().unwrap_or(0),
        active_id: pool.active_id,
        reserve_x: pool.reserve_x.clone(),
        reserve_y: pool.reserve_y.clone(),
        total_value_locked_usd: pool.total_value_locked_usd.clone(),
        volume_usd: pool.volume_usd.clone(),
        fees_usd: pool.fees_usd.clone(),
        tx_count: parse_u64(pool.tx_count.as_deref()),
        liquidity_provider_count: parse_u64(pool.liquidity_provider_count.as_deref()),
        token_x_price_usd: pool.token_x_price_usd.clone(),
        token_y_price_usd: pool.token_y_price_usd.clone(),
        timestamp: pool
            .timestamp
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    };
    record.total_value_locked_usd = Some(recalculate_tvl(&record).to_string());
    record
}

/// Maps an atomic chain read into a record. No USD pricing is attached
/// beyond the stablecoin correction, and nothing from the subgraph is mixed in.
pub fn map_onchain_pool(pool: &PoolOnChain) -> PoolRecord {
    let token_x = TokenInfo {
        address: format!("{:?}", pool.token_x.address),
        symbol: pool.token_x.symbol.clone(),
        name: pool.token_x.name.clone(),
        decimals: pool.token_x.decimals,
    };
    let token_y = TokenInfo {
        address: format!("{:?}", pool.token_y.address),
        symbol: pool.token_y.symbol.clone(),
        name: pool.token_y.name.clone(),
        decimals: pool.token_y.decimals,
    };
    let mut record = PoolRecord {
        id: format!("{:?}", pool.pair_address),
        name: format!("{}/{}", token_x.symbol, token_y.symbol),
        token_x,
        token_y,
        bin_step: pool.bin_step as u32,
        active_id: pool.active_id,
        reserve_x: pool.reserve_x.to_string(),
        reserve_y: pool.reserve_y.to_string(),
        total_value_locked_usd: None,
        volume_usd: None,
        fees_usd: None,
        tx_count: 0,
        liquidity_provider_count: 0,
        token_x_price_usd: None,
        token_y_price_usd: None,
        timestamp: unix_now(),
    };
    record.total_value_locked_usd = Some(recalculate_tvl(&record).to_string());
    record
}

/// First-seen-wins map from pool id to its most recent day bucket. The
/// input is ordered newest-day-first, so later buckets for an already seen
/// pool are ignored.
pub fn first_day_bucket_per_pool(day_datas: Vec<LbPairDayData>) -> IndexMap<String, LbPairDayData> {
    let mut map = IndexMap::new();
    for day_data in day_datas {
        let pool_id = day_data.lb_pair.id.to_lowercase();
        map.entry(pool_id).or_insert(day_data);
    }
    map
}

/// Exchange totals from the pool set joined with per-pool day buckets.
pub fn build_analytics(
    chain: &str,
    pools: &[PoolRecord],
    day_datas: Vec<LbPairDayData>,
) -> DexAnalytics {
    let day_buckets = first_day_bucket_per_pool(day_datas);

    let mut analytics = DexAnalytics {
        chain: chain.to_string(),
        total_value_locked_usd: 0.0,
        volume_24h_usd: 0.0,
        fees_24h_usd: 0.0,
        tx_count: 0,
        total_pools: pools.len(),
        active_pools: 0,
        unique_tokens: 0,
        timestamp: unix_now(),
    };

    let mut tokens = std::collections::HashSet::new();
    for pool in pools {
        analytics.total_value_locked_usd += recalculate_tvl(pool);
        analytics.tx_count += pool.tx_count;
        if pool.is_active() {
            analytics.active_pools += 1;
        }
        tokens.insert(pool.token_x.address.clone());
        tokens.insert(pool.token_y.address.clone());

        if let Some(bucket) = day_buckets.get(&pool.id) {
            analytics.volume_24h_usd += parse_f64(bucket.volume_usd.as_deref());
            analytics.fees_24h_usd += parse_f64(bucket.fees_usd.as_deref());
        }
    }
    analytics.unique_tokens = tokens.len();
    analytics
}

/// Splits each pool's figures evenly across its two sides and aggregates per
/// token, ordered by locked value descending.
pub fn summarize_tokens(pools: &[PoolRecord]) -> Vec<TokenSummary> {
    let mut by_token: HashMap<String, TokenSummary> = HashMap::new();

    for pool in pools {
        let tvl = recalculate_tvl(pool);
        let volume = parse_f64(pool.volume_usd.as_deref());
        for token in [&pool.token_x, &pool.token_y] {
            let entry = by_token
                .entry(token.address.clone())
                .or_insert_with(|| TokenSummary {
                    address: token.address.clone(),
                    symbol: token.symbol.clone(),
                    name: token.name.clone(),
                    decimals: token.decimals,
                    total_value_locked_usd: 0.0,
                    volume_usd: 0.0,
                    tx_count: 0,
                    pool_count: 0,
                });
            entry.total_value_locked_usd += tvl / 2.0;
            entry.volume_usd += volume / 2.0;
            entry.tx_count += pool.tx_count / 2;
            entry.pool_count += 1;
        }
    }

    let mut tokens: Vec<TokenSummary> = by_token.into_values().collect();
    tokens.sort_by(|a, b| {
        b.total_value_locked_usd
            .partial_cmp(&a.total_value_locked_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subgraph::{SubgraphToken, SwapPairRef};

    fn subgraph_token(id: &str, symbol: &str) -> SubgraphToken {
        SubgraphToken {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: "18".to_string(),
            volume_usd: None,
            total_value_locked_usd: None,
            tx_count: None,
        }
    }

    fn subgraph_pool(id: &str) -> SubgraphPool {
        SubgraphPool {
            id: id.to_string(),
            name: None,
            token_x: subgraph_token("0xA1", "USDC"),
            token_y: subgraph_token("0xB2", "WBNB"),
            reserve_x: "1000".to_string(),
            reserve_y: "2000".to_string(),
            total_value_locked_usd: Some("9999".to_string()),
            volume_usd: Some("100".to_string()),
            fees_usd: Some("1".to_string()),
            tx_count: Some("7".to_string()),
            bin_step: "25".to_string(),
            active_id: 8_388_608,
            token_x_price_usd: Some("0.99".to_string()),
            token_y_price_usd: Some("2".to_string()),
            liquidity_provider_count: Some("3".to_string()),
            timestamp: Some("1700000000".to_string()),
        }
    }

    fn day_data(pool_id: &str, date: i64, volume: &str) -> LbPairDayData {
        LbPairDayData {
            date,
            lb_pair: SwapPairRef {
                id: pool_id.to_string(),
            },
            volume_usd: Some(volume.to_string()),
            fees_usd: Some("1".to_string()),
            tx_count: None,
        }
    }

    #[test]
    fn test_map_subgraph_pool_recomputes_tvl() {
        let record = map_subgraph_pool(&subgraph_pool("0xPOOL"));
        // USDC side corrected to $1: 1000*1 + 2000*2, not the reported 9999
        assert_eq!(record.total_value_locked_usd.as_deref(), Some("5000"));
        assert_eq!(record.id, "0xpool");
        assert_eq!(record.name, "USDC/WBNB");
        assert_eq!(record.bin_step, 25);
        assert_eq!(record.tx_count, 7);
        assert_eq!(record.liquidity_provider_count, 3);
    }

    #[test]
    fn test_first_day_bucket_is_first_seen_wins() {
        let buckets = first_day_bucket_per_pool(vec![
            day_data("0xAAA", 200, "500"),
            day_data("0xaaa", 100, "900"),
            day_data("0xbbb", 200, "50"),
        ]);
        assert_eq!(buckets.len(), 2);
        // The later bucket for an already seen pool id is ignored
        assert_eq!(buckets["0xaaa"].date, 200);
        assert_eq!(buckets["0xaaa"].volume_usd.as_deref(), Some("500"));
    }

    #[test]
    fn test_build_analytics_joins_day_buckets() {
        let pools = vec![map_subgraph_pool(&subgraph_pool("0xaaa"))];
        let analytics = build_analytics(
            "bsc",
            &pools,
            vec![day_data("0xAAA", 200, "500"), day_data("0xaaa", 100, "900")],
        );
        assert_eq!(analytics.total_pools, 1);
        assert_eq!(analytics.active_pools, 1);
        assert_eq!(analytics.unique_tokens, 2);
        assert_eq!(analytics.volume_24h_usd, 500.0);
        assert_eq!(analytics.total_value_locked_usd, 5000.0);
    }

    #[test]
    fn test_summarize_tokens_splits_pool_figures() {
        let pools = vec![map_subgraph_pool(&subgraph_pool("0xaaa"))];
        let tokens = summarize_tokens(&pools);
        assert_eq!(tokens.len(), 2);
        // Each side carries half the pool's corrected TVL
        assert_eq!(tokens[0].total_value_locked_usd, 2500.0);
        assert_eq!(tokens[0].pool_count, 1);
        assert_eq!(tokens[0].tx_count, 3);
    }

    #[test]
    fn test_served_source_roundtrip() {
        let served = Served {
            data: vec![1u32, 2],
            source: ServedSource::Chain,
        };
        let raw = serde_json::to_string(&served).unwrap();
        let back: Served<Vec<u32>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.source, ServedSource::Chain);
        assert_eq!(back.data, vec![1, 2]);
    }
}
