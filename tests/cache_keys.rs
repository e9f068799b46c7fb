// Cache key construction and TTL policy, exercised through the public API.

use lb_aggregator_sdk::cache::{self, CacheStore, CacheTtl, MemoryKvStore};
use lb_aggregator_sdk::invalidation::DomainEvent;
use std::sync::Arc;

#[test]
fn pool_keys_are_deterministic_and_case_normalized() {
    let a = cache::pool_key("BSC", Some("0xABC"), None);
    let b = cache::pool_key("bsc", Some("0xabc"), None);
    assert_eq!(a, b);
    assert_eq!(a, "dex-pool:bsc:0xabc");

    // Same inputs always produce the same key
    for _ in 0..3 {
        assert_eq!(cache::pool_key("bsc", Some("0xabc"), Some("detail")), "dex-pool:bsc:0xabc:detail");
    }
}

#[test]
fn request_keys_embed_path_and_query() {
    assert_eq!(
        cache::request_key(cache::prefix::API, "/v1/api/dex/pools/bsc", Some("page=1&limit=20")),
        "dex-api:/v1/api/dex/pools/bsc:page=1&limit=20"
    );
    // Empty query strings are omitted entirely
    assert_eq!(
        cache::request_key(cache::prefix::API, "/v1/api/dex/pools/bsc", Some("")),
        "dex-api:/v1/api/dex/pools/bsc"
    );
}

#[test]
fn url_derived_keys_match_manual_keys() {
    let from_url = cache::request_key_from_url(
        cache::prefix::API,
        "https://api.example.com/v1/api/dex/pools/bsc?page=1&limit=20",
    )
    .unwrap();
    let manual = cache::request_key(cache::prefix::API, "/v1/api/dex/pools/bsc", Some("page=1&limit=20"));
    assert_eq!(from_url, manual);
}

#[test]
fn ttl_table_matches_data_classes() {
    assert_eq!(CacheTtl::STATIC, 86_400);
    assert_eq!(CacheTtl::POOLS, 300);
    assert_eq!(CacheTtl::PRICE, 60);
    assert_eq!(CacheTtl::USER_DATA, 60);
    assert_eq!(CacheTtl::ANALYTICS, 3_600);
    assert_eq!(CacheTtl::METADATA, 600);
    assert_eq!(CacheTtl::VAULTS, 300);
    assert_eq!(CacheTtl::FARMS, 120);
    assert_eq!(CacheTtl::REWARDS, 60);
}

#[test]
fn store_floor_clamps_short_ttls() {
    let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));
    assert_eq!(cache.clamp_ttl(1), CacheTtl::MIN);
    assert_eq!(cache.clamp_ttl(59), CacheTtl::MIN);
    assert_eq!(cache.clamp_ttl(60), 60);
    assert_eq!(cache.clamp_ttl(86_400), 86_400);
}

#[tokio::test]
async fn invalidation_purges_only_mapped_keys() {
    let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));

    let pools_key = "dex-api:/v1/api/dex/pools/bsc";
    let unrelated_key = "dex-api:/v1/api/dex/farms/bsc";
    cache.put_json(pools_key, &"pools", 300).await;
    cache.put_json(unrelated_key, &"farms", 300).await;

    let invalidator = lb_aggregator_sdk::CacheInvalidator::new(cache.clone());
    invalidator
        .invalidate(&DomainEvent::NewPool {
            chain: "bsc".into(),
        })
        .await;

    assert_eq!(cache.get_json::<String>(pools_key).await, None);
    assert_eq!(cache.get_json::<String>(unrelated_key).await, Some("farms".into()));
}
