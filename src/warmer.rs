// src/warmer.rs
//
// Warm scheduler. On a fixed interval the critical payloads (health, pool
// listings under their common page/sort variants, token summaries, subgraph
// meta) are recomputed through the aggregator, which writes each one into the
// cache. Tasks run under a fault-isolated join: one failing task never blocks
// its siblings, and cycle failures are counted and logged, never escalated.

use crate::aggregator::Aggregator;
use crate::metrics;
use crate::settings::WarmingSettings;
use anyhow::Result;
use futures::future::join_all;
use futures::future::BoxFuture;
use log::{info, warn};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Outcome of one warm cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmSummary {
    pub successful: usize,
    pub failed: usize,
}

/// A labeled warm task. The label is only used for logging.
pub type WarmTask = (&'static str, BoxFuture<'static, Result<()>>);

/// Runs every task to completion regardless of sibling failures and reports
/// how many succeeded.
pub async fn run_warm_tasks(tasks: Vec<WarmTask>) -> WarmSummary {
    let (labels, futures): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(futures).await;

    let mut summary = WarmSummary {
        successful: 0,
        failed: 0,
    };
    for (label, result) in labels.into_iter().zip(results) {
        match result {
            Ok(()) => {
                summary.successful += 1;
                info!("Warmed: {}", label);
            }
            Err(e) => {
                summary.failed += 1;
                warn!("Failed to warm {}: {}", label, e);
            }
        }
    }
    summary
}

/// Precomputes critical payloads into the cache on a fixed interval.
pub struct CacheWarmer {
    aggregator: Arc<Aggregator>,
    settings: WarmingSettings,
    warm_interval: Duration,
}

impl CacheWarmer {
    pub fn new(aggregator: Arc<Aggregator>, settings: WarmingSettings, warm_interval: Duration) -> Self {
        Self {
            aggregator,
            settings,
            warm_interval,
        }
    }

    fn critical_tasks(&self) -> Vec<WarmTask> {
        let chain = self.settings.chain.clone();
        let page_size = self.settings.page_size;

        let health = {
            let aggregator = self.aggregator.clone();
            Box::pin(async move {
                aggregator.check_health().await;
                Ok(())
            }) as BoxFuture<'static, Result<()>>
        };
        let pools_by_tvl = {
            let aggregator = self.aggregator.clone();
            let chain = chain.clone();
            Box::pin(async move {
                aggregator
                    .get_pools(&chain, page_size, 0, "totalValueLockedUSD", "desc")
                    .await?;
                Ok(())
            }) as BoxFuture<'static, Result<()>>
        };
        let pools_by_volume = {
            let aggregator = self.aggregator.clone();
            let chain = chain.clone();
            Box::pin(async move {
                aggregator
                    .get_pools(&chain, page_size, 0, "volumeUSD", "desc")
                    .await?;
                Ok(())
            }) as BoxFuture<'static, Result<()>>
        };
        let tokens = {
            let aggregator = self.aggregator.clone();
            let chain = chain.clone();
            Box::pin(async move {
                aggregator.get_tokens_summary(&chain, 50, 0).await?;
                Ok(())
            }) as BoxFuture<'static, Result<()>>
        };
        let meta = {
            let aggregator = self.aggregator.clone();
            Box::pin(async move {
                aggregator.get_subgraph_meta().await?;
                Ok(())
            }) as BoxFuture<'static, Result<()>>
        };

        vec![
            ("health", health),
            ("pools:tvl", pools_by_tvl),
            ("pools:volume", pools_by_volume),
            ("tokens", tokens),
            ("subgraph-meta", meta),
        ]
    }

    /// One warm cycle over the critical payload list.
    pub async fn warm_critical_endpoints(&self) -> WarmSummary {
        info!("Starting cache warming...");
        let summary = run_warm_tasks(self.critical_tasks()).await;
        metrics::record_warm_cycle(summary.successful, summary.failed);
        info!(
            "Cache warming completed: {} successful, {} failed",
            summary.successful, summary.failed
        );
        summary
    }

    /// Runs warm cycles until the task is aborted. Failures within a cycle
    /// are already contained; a fully failed cycle only logs and waits for
    /// the next tick.
    pub async fn run_periodic(self: Arc<Self>) {
        if !self.settings.enabled {
            info!("Cache warming disabled, scheduler not started");
            return;
        }
        let mut ticker = interval(self.warm_interval);
        loop {
            ticker.tick().await;
            let summary = self.warm_critical_endpoints().await;
            if summary.successful == 0 && summary.failed > 0 {
                warn!("Warm cycle produced no successful tasks");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_one_failure_does_not_block_siblings() {
        let tasks: Vec<WarmTask> = vec![
            ("a", Box::pin(async { Ok(()) })),
            ("b", Box::pin(async { Err(anyhow!("boom")) })),
            ("c", Box::pin(async { Ok(()) })),
            ("d", Box::pin(async { Ok(()) })),
        ];
        let summary = run_warm_tasks(tasks).await;
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_empty_cycle() {
        let summary = run_warm_tasks(Vec::new()).await;
        assert_eq!(summary, WarmSummary { successful: 0, failed: 0 });
    }
}
