// src/cache.rs
//
// Key construction, TTL policy and the durable KV seam. The store is
// best-effort: reads that fail count as misses and writes never propagate
// errors into the hot path.

use crate::metrics;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache key prefixes for the different data families.
pub mod prefix {
    pub const API: &str = "dex-api";
    pub const USER: &str = "dex-user";
    pub const POOL: &str = "dex-pool";
    pub const ANALYTICS: &str = "dex-analytics";
    pub const PRICE: &str = "dex-price";
    pub const HEALTH: &str = "dex-health";
}

/// TTL table in seconds, one entry per data class.
pub struct CacheTtl;

impl CacheTtl {
    /// Static data that rarely changes (tokens, vault strategies)
    pub const STATIC: u64 = 24 * 60 * 60;
    /// Pool data that changes moderately
    pub const POOLS: u64 = 5 * 60;
    /// Price data that changes frequently
    pub const PRICE: u64 = 60;
    /// User-specific data (KV minimum)
    pub const USER_DATA: u64 = 60;
    /// Analytics data
    pub const ANALYTICS: u64 = 60 * 60;
    /// Health check data (KV minimum)
    pub const HEALTH: u64 = 60;
    /// Subgraph metadata
    pub const METADATA: u64 = 10 * 60;
    /// Vault data
    pub const VAULTS: u64 = 5 * 60;
    /// Farm data
    pub const FARMS: u64 = 2 * 60;
    /// Rewards data (changes every block, but floored by the store)
    pub const REWARDS: u64 = 60;
    /// Hard floor imposed by the durable KV store
    pub const MIN: u64 = 60;
}

/// Builds `{prefix}:{path}[:{query}]`, lower-cased for deterministic hits.
pub fn request_key(prefix: &str, path: &str, query: Option<&str>) -> String {
    let mut key = format!("{}:{}", prefix, path);
    if let Some(q) = query {
        if !q.is_empty() {
            key.push(':');
            key.push_str(q);
        }
    }
    key.to_lowercase()
}

/// Derives a cache key from a full request URL (path + query string).
pub fn request_key_from_url(prefix: &str, raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url).ok()?;
    let query = parsed.query().map(|q| q.to_string());
    Some(request_key(prefix, parsed.path(), query.as_deref()))
}

/// Cache key for pool data: `dex-pool:{chain}[:{pool}[:{action}]]`.
pub fn pool_key(chain: &str, pool: Option<&str>, action: Option<&str>) -> String {
    let mut key = format!("{}:{}", prefix::POOL, chain);
    if let Some(p) = pool {
        key.push(':');
        key.push_str(p);
    }
    if let Some(a) = action {
        key.push(':');
        key.push_str(a);
    }
    key.to_lowercase()
}

/// Cache key for user data: `dex-user:{user}[:{chain}[:{pool}[:{action}]]]`.
pub fn user_key(user: &str, chain: Option<&str>, pool: Option<&str>, action: Option<&str>) -> String {
    let mut key = format!("{}:{}", prefix::USER, user);
    for part in [chain, pool, action].into_iter().flatten() {
        key.push(':');
        key.push_str(part);
    }
    key.to_lowercase()
}

/// Cache key for price data: `dex-price:latest[:{token}[:{chain}]]`.
pub fn price_key(token: Option<&str>, chain: Option<&str>) -> String {
    let mut key = format!("{}:latest", prefix::PRICE);
    for part in [token, chain].into_iter().flatten() {
        key.push(':');
        key.push_str(part);
    }
    key.to_lowercase()
}

/// Cache key for analytics data: `dex-analytics:{chain}[:{timeframe}]`.
pub fn analytics_key(chain: &str, timeframe: Option<&str>) -> String {
    let mut key = format!("{}:{}", prefix::ANALYTICS, chain);
    if let Some(t) = timeframe {
        key.push(':');
        key.push_str(t);
    }
    key.to_lowercase()
}

/// Cache key for the subgraph health verdict.
pub fn health_key() -> String {
    format!("{}:status", prefix::HEALTH)
}

/// Durable KV seam: `get`/`put` with TTL plus explicit `delete` for the
/// invalidation patterns. Implementations must treat `put` as full-value
/// replacement (last writer wins).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process KV store. Expiry is checked lazily on read; there is no
/// background eviction task.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Stale entry, drop it on the way out
        self.entries.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Typed facade over a [`KvStore`]. Serializes payloads as JSON, clamps TTLs
/// to the store floor and swallows write errors.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KvStore>,
    min_ttl_seconds: u64,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            min_ttl_seconds: CacheTtl::MIN,
        }
    }

    pub fn with_min_ttl(mut self, min_ttl_seconds: u64) -> Self {
        self.min_ttl_seconds = min_ttl_seconds;
        self
    }

    /// Effective TTL after applying the store floor.
    pub fn clamp_ttl(&self, ttl_seconds: u64) -> u64 {
        ttl_seconds.max(self.min_ttl_seconds)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    metrics::increment_cache_hit("kv");
                    debug!("Cache HIT: {}", key);
                    Some(value)
                }
                Err(e) => {
                    // A corrupt payload is a miss; the next compute overwrites it.
                    warn!("Failed to decode cached value for {}: {}", key, e);
                    metrics::increment_cache_miss("kv");
                    None
                }
            },
            Ok(None) => {
                metrics::increment_cache_miss("kv");
                debug!("Cache MISS: {}", key);
                None
            }
            Err(e) => {
                warn!("KV read failed for {}: {}", key, e);
                metrics::increment_cache_miss("kv");
                None
            }
        }
    }

    /// Fire-and-forget write. Errors are logged and counted, never returned.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let ttl = self.clamp_ttl(ttl_seconds);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache value for {}: {}", key, e);
                metrics::increment_cache_put_error();
                return;
            }
        };
        if let Err(e) = self.store.put(key, raw, ttl).await {
            warn!("KV write failed for {}: {}", key, e);
            metrics::increment_cache_put_error();
        } else {
            debug!("Cached response: {} (TTL: {}s)", key, ttl);
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("KV delete failed for {}: {}", key, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key_format() {
        assert_eq!(
            request_key(prefix::API, "/v1/api/dex/pools/bsc", None),
            "dex-api:/v1/api/dex/pools/bsc"
        );
        assert_eq!(
            request_key(prefix::API, "/v1/api/dex/pools", Some("page=1&limit=20")),
            "dex-api:/v1/api/dex/pools:page=1&limit=20"
        );
    }

    #[test]
    fn test_keys_are_case_normalized() {
        assert_eq!(
            pool_key("BSC", Some("0xABC"), None),
            pool_key("bsc", Some("0xabc"), None)
        );
        assert_eq!(
            user_key("0xDeAdBeEf", Some("BSC"), None, Some("Rewards")),
            "dex-user:0xdeadbeef:bsc:rewards"
        );
        assert_eq!(price_key(Some("0xAbC"), Some("BSC")), "dex-price:latest:0xabc:bsc");
        assert_eq!(analytics_key("BSC", Some("1D")), "dex-analytics:bsc:1d");
    }

    #[test]
    fn test_request_key_from_url() {
        let key = request_key_from_url(
            prefix::API,
            "https://api.example.com/v1/api/dex/Pools/BSC?Page=2&limit=50",
        )
        .unwrap();
        assert_eq!(key, "dex-api:/v1/api/dex/pools/bsc:page=2&limit=50");
        assert!(request_key_from_url(prefix::API, "not a url").is_none());
    }

    #[test]
    fn test_ttl_clamp_floor() {
        let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(cache.clamp_ttl(10), CacheTtl::MIN);
        assert_eq!(cache.clamp_ttl(300), 300);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryKvStore::new();
        store.put("k", "v".to_string(), 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_lazy_expiry() {
        let store = MemoryKvStore::new();
        store.put("k", "v".to_string(), 0).await.unwrap();
        // TTL of zero expires immediately; the entry is evicted on read.
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_json_overwrites_previous_value() {
        let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));
        cache.put_json("key", &1u32, 60).await;
        cache.put_json("key", &2u32, 60).await;
        assert_eq!(cache.get_json::<u32>("key").await, Some(2));
    }
}
