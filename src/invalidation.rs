// src/invalidation.rs
//
// Declarative cache invalidation. Write-path collaborators report a domain
// event; each event maps to an ordered list of key templates to purge. The
// core never triggers these automatically - entries otherwise age out via TTL.

use crate::cache::CacheStore;
use log::info;

/// Key templates purged when a new pool is created.
const NEW_POOL_PATTERNS: &[&str] = &[
    "dex-api:/v1/api/dex/pools/{chain}",
    "dex-api:/v1/api/dex/tokens/{chain}",
    "dex-api:/v1/api/dex/analytics/{chain}",
];

/// Key templates purged when liquidity is added or removed.
const LIQUIDITY_CHANGE_PATTERNS: &[&str] = &[
    "dex-api:/v1/api/dex/pools/{chain}/{poolId}",
    "dex-api:/v1/api/dex/pools/{chain}/{poolId}/bins",
    "dex-api:/v1/api/dex/analytics/{chain}",
    "dex-user:/v1/api/dex/user:user:{userAddress}",
];

/// Key templates purged when a swap occurs.
const SWAP_PATTERNS: &[&str] = &[
    "dex-price:/v1/api/dex/price",
    "dex-api:/v1/api/dex/pools/{chain}/{poolId}",
    "dex-api:/v1/api/dex/swaps",
    "dex-user:/v1/api/dex/user:user:{userAddress}",
];

/// Key templates purged when rewards are distributed.
const REWARD_PATTERNS: &[&str] = &[
    "dex-api:/v1/api/dex/user/{address}/rewards",
    "dex-api:/v1/api/dex/user/{address}/claimable-rewards",
    "dex-api:/v1/api/dex/farms",
];

/// Domain events that carry enough context to expand their key templates.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    NewPool {
        chain: String,
    },
    LiquidityChange {
        chain: String,
        pool_id: String,
        user_address: String,
    },
    Swap {
        chain: String,
        pool_id: String,
        user_address: String,
    },
    RewardDistribution {
        user_address: String,
    },
}

impl DomainEvent {
    /// Expands the event into its ordered, lower-cased list of cache keys.
    pub fn cache_keys(&self) -> Vec<String> {
        match self {
            DomainEvent::NewPool { chain } => expand(NEW_POOL_PATTERNS, chain, None, None),
            DomainEvent::LiquidityChange {
                chain,
                pool_id,
                user_address,
            } => expand(
                LIQUIDITY_CHANGE_PATTERNS,
                chain,
                Some(pool_id),
                Some(user_address),
            ),
            DomainEvent::Swap {
                chain,
                pool_id,
                user_address,
            } => expand(SWAP_PATTERNS, chain, Some(pool_id), Some(user_address)),
            DomainEvent::RewardDistribution { user_address } => REWARD_PATTERNS
                .iter()
                .map(|t| t.replace("{address}", user_address).to_lowercase())
                .collect(),
        }
    }
}

fn expand(patterns: &[&str], chain: &str, pool_id: Option<&str>, user: Option<&str>) -> Vec<String> {
    patterns
        .iter()
        .map(|template| {
            let mut key = template.replace("{chain}", chain);
            if let Some(pool) = pool_id {
                key = key.replace("{poolId}", pool);
            }
            if let Some(user) = user {
                key = key.replace("{userAddress}", user);
            }
            key.to_lowercase()
        })
        .collect()
}

/// Purges the cache keys mapped to a domain event. Invoked explicitly by an
/// external write-path collaborator, never by the read path.
pub struct CacheInvalidator {
    cache: CacheStore,
}

impl CacheInvalidator {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    /// Deletes the event's keys in order, returning how many were purged.
    pub async fn invalidate(&self, event: &DomainEvent) -> usize {
        let keys = event.cache_keys();
        let mut purged = 0;
        for key in &keys {
            if self.cache.delete(key).await {
                purged += 1;
            }
        }
        info!("Invalidated {}/{} cache keys for {:?}", purged, keys.len(), event);
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pool_expansion() {
        let keys = DomainEvent::NewPool {
            chain: "BSC".into(),
        }
        .cache_keys();
        assert_eq!(
            keys,
            vec![
                "dex-api:/v1/api/dex/pools/bsc",
                "dex-api:/v1/api/dex/tokens/bsc",
                "dex-api:/v1/api/dex/analytics/bsc",
            ]
        );
    }

    #[test]
    fn test_swap_expansion_order_and_placeholders() {
        let keys = DomainEvent::Swap {
            chain: "bsc".into(),
            pool_id: "0xPool".into(),
            user_address: "0xUser".into(),
        }
        .cache_keys();
        assert_eq!(keys[0], "dex-price:/v1/api/dex/price");
        assert_eq!(keys[1], "dex-api:/v1/api/dex/pools/bsc/0xpool");
        assert_eq!(keys[3], "dex-user:/v1/api/dex/user:user:0xuser");
    }

    #[test]
    fn test_reward_expansion() {
        let keys = DomainEvent::RewardDistribution {
            user_address: "0xABC".into(),
        }
        .cache_keys();
        assert_eq!(keys[0], "dex-api:/v1/api/dex/user/0xabc/rewards");
        assert_eq!(keys.len(), 3);
    }
}
