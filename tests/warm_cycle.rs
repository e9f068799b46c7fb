// Warm cycle isolation: a failing task never blocks its siblings, and every
// successful task's payload lands in the cache.

use anyhow::anyhow;
use futures::future::BoxFuture;
use itertools::Itertools;
use lb_aggregator_sdk::cache::{CacheStore, KvStore, MemoryKvStore};
use lb_aggregator_sdk::warmer::{run_warm_tasks, WarmTask};
use std::sync::Arc;

fn put_task(cache: CacheStore, label: &'static str, key: &'static str) -> WarmTask {
    let fut: BoxFuture<'static, anyhow::Result<()>> = Box::pin(async move {
        cache.put_json(key, &format!("payload-{}", label), 300).await;
        Ok(())
    });
    (label, fut)
}

#[tokio::test]
async fn one_rejected_task_leaves_the_other_three_cached() {
    let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));

    let failing: WarmTask = ("pools", Box::pin(async { Err(anyhow!("subgraph 502")) }));
    let tasks = vec![
        put_task(cache.clone(), "health", "dex-health:status"),
        failing,
        put_task(cache.clone(), "tokens", "dex-api:/tokens/bsc"),
        put_task(cache.clone(), "meta", "dex-api:/subgraph/meta"),
    ];

    let summary = run_warm_tasks(tasks).await;
    assert_eq!(summary.successful, 3);
    assert_eq!(summary.failed, 1);

    // The three surviving payloads are all readable
    let cached = [
        "dex-health:status",
        "dex-api:/tokens/bsc",
        "dex-api:/subgraph/meta",
    ]
    .iter()
    .map(|key| {
        let cache = cache.clone();
        async move { cache.get_json::<String>(key).await }
    })
    .collect_vec();
    for fut in cached {
        assert!(fut.await.is_some());
    }
}

#[tokio::test]
async fn warm_payloads_expire_after_their_ttl() {
    let store = Arc::new(MemoryKvStore::new());

    // Write directly to the store to use a sub-floor TTL
    store.put("k", "v".to_string(), 1).await.unwrap();
    assert!(store.get("k").await.unwrap().is_some());

    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;
    assert!(store.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn warm_cycle_overwrites_previous_payloads() {
    let cache = CacheStore::new(Arc::new(MemoryKvStore::new()));

    cache.put_json("dex-health:status", &"stale", 300).await;
    let summary = run_warm_tasks(vec![put_task(
        cache.clone(),
        "health",
        "dex-health:status",
    )])
    .await;

    assert_eq!(summary.successful, 1);
    assert_eq!(
        cache.get_json::<String>("dex-health:status").await,
        Some("payload-health".into())
    );
}
