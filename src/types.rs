// src/types.rs
//
// Domain records shared across the reader, subgraph client and aggregator.
// Every record is an immutable snapshot: components hand owned copies to
// callers and nothing here is shared-mutable.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Token metadata attached to a pool side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Lowercase hex address of the token contract
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenInfo {
    /// Sentinel returned when ERC20 metadata reads fail. Keeps a pool fetch
    /// alive at field granularity instead of aborting the whole record.
    pub fn unknown(address: &str) -> Self {
        Self {
            address: address.to_lowercase(),
            symbol: "UNK".to_string(),
            name: "Unknown".to_string(),
            decimals: default_decimals(),
        }
    }
}

/// Default decimals applied when a token contract does not answer.
pub fn default_decimals() -> u8 {
    18
}

/// Default for missing big-decimal string fields ("0").
pub fn zero_decimal() -> String {
    "0".to_string()
}

/// A reconciled pool record. Fields that the subgraph may omit are explicit
/// `Option`s; use [`PoolRecord::tvl_usd`] and friends rather than defaulting
/// inline at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Lowercase pair address, doubles as the record id
    pub id: String,
    pub name: String,
    pub token_x: TokenInfo,
    pub token_y: TokenInfo,
    /// Basis-point spacing between adjacent bins
    pub bin_step: u32,
    /// Bin currently defining the spot price
    pub active_id: u32,
    /// Raw reserve amounts as decimal strings (base units)
    pub reserve_x: String,
    pub reserve_y: String,
    pub total_value_locked_usd: Option<String>,
    pub volume_usd: Option<String>,
    pub fees_usd: Option<String>,
    pub tx_count: u64,
    pub liquidity_provider_count: u64,
    pub token_x_price_usd: Option<String>,
    pub token_y_price_usd: Option<String>,
    /// Unix seconds of the last indexed update (0 when unknown)
    pub timestamp: i64,
}

impl PoolRecord {
    pub fn tvl_usd(&self) -> String {
        self.total_value_locked_usd.clone().unwrap_or_else(zero_decimal)
    }

    pub fn volume_usd_or_zero(&self) -> String {
        self.volume_usd.clone().unwrap_or_else(zero_decimal)
    }

    pub fn fees_usd_or_zero(&self) -> String {
        self.fees_usd.clone().unwrap_or_else(zero_decimal)
    }

    /// A pool with at least one liquidity provider counts as active.
    pub fn is_active(&self) -> bool {
        self.liquidity_provider_count > 0
    }
}

/// Token metadata as read straight from chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OnChainToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl OnChainToken {
    pub fn unknown(address: Address) -> Self {
        Self {
            address,
            name: "Unknown".to_string(),
            symbol: "UNK".to_string(),
            decimals: default_decimals(),
        }
    }
}

/// Atomic snapshot of one pool read from chain. Constructed only when all
/// field reads succeed together; never partially populated.
#[derive(Debug, Clone)]
pub struct PoolOnChain {
    pub pair_address: Address,
    pub token_x: OnChainToken,
    pub token_y: OnChainToken,
    pub bin_step: u16,
    pub active_id: u32,
    pub reserve_x: U256,
    pub reserve_y: U256,
    pub protocol_fee_x: U256,
    pub protocol_fee_y: U256,
    pub base_factor: u16,
    pub protocol_share: u16,
}

/// Router quote for a single-pair swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    /// Input amount the router could not consume
    pub amount_in_left: u128,
    pub amount_out: u128,
    pub fee: u128,
}

/// One page of pools from the factory plus the total pair count.
#[derive(Debug, Clone)]
pub struct PoolBatch {
    pub pools: Vec<PoolOnChain>,
    pub total_pairs: u64,
}

/// A user's share of a single bin, validated against current balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBinPosition {
    pub user_address: String,
    pub pool_address: String,
    pub bin_id: u32,
    pub liquidity_shares: String,
}

/// A user's position in one pool as indexed by the subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityPosition {
    pub pool_id: String,
    pub pool_name: String,
    pub token_x: TokenInfo,
    pub token_y: TokenInfo,
    pub total_value_locked_usd: Option<String>,
    pub bin_count: u64,
    pub bins: Vec<UserBinLiquidity>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBinLiquidity {
    pub bin_id: u32,
    pub liquidity: String,
    pub timestamp: i64,
}

/// Subgraph admission verdict for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub block_number: Option<u64>,
    pub has_indexing_errors: Option<bool>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(block_number: u64) -> Self {
        Self {
            healthy: true,
            block_number: Some(block_number),
            has_indexing_errors: Some(false),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            block_number: None,
            has_indexing_errors: None,
            error: Some(error.into()),
        }
    }
}

/// Rolling 24 hour activity for a single pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pool24hStats {
    pub volume_24h: f64,
    pub fees_24h: f64,
    pub swap_count: u64,
}

/// Exchange-wide totals derived from the pool set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexAnalytics {
    pub chain: String,
    pub total_value_locked_usd: f64,
    pub volume_24h_usd: f64,
    pub fees_24h_usd: f64,
    pub tx_count: u64,
    pub total_pools: usize,
    pub active_pools: usize,
    pub unique_tokens: usize,
    pub timestamp: i64,
}

/// Per-token aggregate built by splitting each pool's figures across its two sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSummary {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub total_value_locked_usd: f64,
    pub volume_usd: f64,
    pub tx_count: u64,
    pub pool_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_token_sentinel() {
        let t = TokenInfo::unknown("0xABCDEF");
        assert_eq!(t.name, "Unknown");
        assert_eq!(t.symbol, "UNK");
        assert_eq!(t.decimals, 18);
        assert_eq!(t.address, "0xabcdef");
    }

    #[test]
    fn test_pool_record_defaulting() {
        let pool = PoolRecord {
            id: "0x1".into(),
            name: "A/B".into(),
            token_x: TokenInfo::unknown("0xa"),
            token_y: TokenInfo::unknown("0xb"),
            bin_step: 25,
            active_id: 8_388_608,
            reserve_x: "0".into(),
            reserve_y: "0".into(),
            total_value_locked_usd: None,
            volume_usd: None,
            fees_usd: Some("12.5".into()),
            tx_count: 0,
            liquidity_provider_count: 0,
            token_x_price_usd: None,
            token_y_price_usd: None,
            timestamp: 0,
        };
        assert_eq!(pool.tvl_usd(), "0");
        assert_eq!(pool.volume_usd_or_zero(), "0");
        assert_eq!(pool.fees_usd_or_zero(), "12.5");
        assert!(!pool.is_active());
    }
}
