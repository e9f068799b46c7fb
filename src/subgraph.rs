// src/subgraph.rs
//
// GraphQL client for the LB indexer. One POST per query, `{query, variables}`
// in, `{data, errors}` out. Typed getters lower-case address variables (the
// store is case-sensitive) and fail soft: transport errors are logged and
// surface as empty collections, absent payloads are not exceptional. Only
// `get_meta` keeps its error so the health gate can report the cause.

use crate::metrics;
use crate::types::{HealthStatus, Pool24hStats, TokenInfo};
use crate::utils::{minutes_since, unix_now};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubgraphError {
    #[error("GraphQL request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("GraphQL endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaBlock {
    pub number: u64,
    #[serde(default)]
    pub hash: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphMeta {
    pub block: MetaBlock,
    #[serde(default)]
    pub deployment: Option<String>,
    pub has_indexing_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphToken {
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// BigInt, serialized as a decimal string by the indexer
    pub decimals: String,
    #[serde(default)]
    pub volume_usd: Option<String>,
    #[serde(default)]
    pub total_value_locked_usd: Option<String>,
    #[serde(default)]
    pub tx_count: Option<String>,
}

impl From<&SubgraphToken> for TokenInfo {
    fn from(token: &SubgraphToken) -> Self {
        TokenInfo {
            address: token.id.to_lowercase(),
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            decimals: token
                .decimals
                .parse()
                .unwrap_or_else(|_| crate::types::default_decimals()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphPool {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub token_x: SubgraphToken,
    pub token_y: SubgraphToken,
    pub reserve_x: String,
    pub reserve_y: String,
    #[serde(default)]
    pub total_value_locked_usd: Option<String>,
    #[serde(default)]
    pub volume_usd: Option<String>,
    #[serde(default)]
    pub fees_usd: Option<String>,
    #[serde(default)]
    pub tx_count: Option<String>,
    pub bin_step: String,
    pub active_id: u32,
    #[serde(default)]
    pub token_x_price_usd: Option<String>,
    #[serde(default)]
    pub token_y_price_usd: Option<String>,
    #[serde(default)]
    pub liquidity_provider_count: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPairRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphSwap {
    pub id: String,
    #[serde(default)]
    pub lb_pair: Option<SwapPairRef>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount_usd: Option<String>,
    #[serde(default)]
    pub fees_usd: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBinLiquidityDto {
    pub bin_id: String,
    pub liquidity: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPairRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub token_x: SubgraphToken,
    pub token_y: SubgraphToken,
    #[serde(default)]
    pub total_value_locked_usd: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphLiquidityPosition {
    pub id: String,
    pub lb_pair: PositionPairRef,
    #[serde(default)]
    pub user_bin_liquidities: Vec<UserBinLiquidityDto>,
    #[serde(default)]
    pub bins_count: Option<String>,
    pub timestamp: String,
}

/// One day-bucketed aggregate row for a pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbPairDayData {
    pub date: i64,
    pub lb_pair: SwapPairRef,
    #[serde(default)]
    pub volume_usd: Option<String>,
    #[serde(default)]
    pub fees_usd: Option<String>,
    #[serde(default)]
    pub tx_count: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphFactory {
    pub id: String,
    #[serde(default)]
    pub pair_count: Option<String>,
    #[serde(default)]
    pub volume_usd: Option<String>,
    #[serde(default)]
    pub total_value_locked_usd: Option<String>,
    #[serde(default)]
    pub tx_count: Option<String>,
    #[serde(default)]
    pub token_count: Option<String>,
    #[serde(default)]
    pub user_count: Option<String>,
    #[serde(default)]
    pub fees_usd: Option<String>,
}

const POOL_FIELDS: &str = r#"
    id
    name
    tokenX { id symbol name decimals }
    tokenY { id symbol name decimals }
    reserveX
    reserveY
    totalValueLockedUSD
    volumeUSD
    feesUSD
    txCount
    binStep
    activeId
    tokenXPriceUSD
    tokenYPriceUSD
    liquidityProviderCount
    timestamp
"#;

/// GraphQL client for querying the LB subgraph.
pub struct SubgraphClient {
    endpoint: String,
    client: reqwest::Client,
    max_staleness_seconds: i64,
}

impl SubgraphClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration, max_staleness_seconds: i64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            client,
            max_staleness_seconds,
        }
    }

    pub fn from_settings(settings: &crate::settings::SubgraphSettings) -> Self {
        Self::new(
            settings.endpoint.clone(),
            Duration::from_secs(settings.request_timeout_seconds),
            settings.max_staleness_seconds,
        )
    }

    /// Execute a GraphQL query. GraphQL-level errors are logged but the
    /// partial response is still returned to the caller.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQlResponse<T>, SubgraphError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self.client.post(&self.endpoint).json(&body).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                metrics::increment_subgraph_request("transport_error");
                error!("GraphQL request failed: {}", e);
                return Err(SubgraphError::Transport(e));
            }
        };

        if !response.status().is_success() {
            metrics::increment_subgraph_request("transport_error");
            error!("GraphQL endpoint returned HTTP {}", response.status());
            return Err(SubgraphError::Status(response.status()));
        }

        let result: GraphQlResponse<T> = response.json().await?;
        if let Some(errors) = &result.errors {
            metrics::increment_subgraph_request("graphql_error");
            for err in errors {
                error!("GraphQL error: {}", err.message);
            }
        } else {
            metrics::increment_subgraph_request("ok");
        }
        Ok(result)
    }

    /// Get subgraph metadata and sync status. `None` means the payload had
    /// no `_meta` field, which the health gate treats as unhealthy.
    pub async fn get_meta(&self) -> Result<Option<SubgraphMeta>, SubgraphError> {
        const QUERY: &str = r#"
            query GetMeta {
                _meta {
                    block { number hash timestamp }
                    deployment
                    hasIndexingErrors
                }
            }
        "#;

        #[derive(Deserialize)]
        struct MetaData {
            #[serde(rename = "_meta")]
            meta: Option<SubgraphMeta>,
        }

        let result = self.query::<MetaData>(QUERY, json!({})).await?;
        Ok(result.data.and_then(|d| d.meta))
    }

    /// Check subgraph health and availability for the current request.
    pub async fn check_health(&self) -> HealthStatus {
        match self.get_meta().await {
            Ok(meta) => evaluate_meta(meta.as_ref(), unix_now(), self.max_staleness_seconds),
            Err(e) => {
                metrics::increment_subgraph_unhealthy("transport");
                HealthStatus::unhealthy(e.to_string())
            }
        }
    }

    /// Get pools ordered by the given field.
    pub async fn get_pools(
        &self,
        first: u64,
        skip: u64,
        order_by: &str,
        order_direction: &str,
    ) -> Vec<SubgraphPool> {
        let query = format!(
            r#"
            query GetPools($first: Int!, $skip: Int!, $orderBy: String!, $orderDirection: String!) {{
                lbpairs(first: $first, skip: $skip, orderBy: $orderBy, orderDirection: $orderDirection) {{
                    {POOL_FIELDS}
                }}
            }}
        "#
        );

        #[derive(Deserialize)]
        struct Data {
            lbpairs: Vec<SubgraphPool>,
        }

        let variables = json!({
            "first": first,
            "skip": skip,
            "orderBy": order_by,
            "orderDirection": order_direction,
        });

        match self.query::<Data>(&query, variables).await {
            Ok(result) => result.data.map(|d| d.lbpairs).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Get a specific pool by pair address.
    pub async fn get_pool(&self, pair_address: &str) -> Option<SubgraphPool> {
        let query = format!(
            r#"
            query GetPool($pairAddress: String!) {{
                lbpairs(where: {{ id: $pairAddress }}) {{
                    {POOL_FIELDS}
                }}
            }}
        "#
        );

        #[derive(Deserialize)]
        struct Data {
            lbpairs: Vec<SubgraphPool>,
        }

        let variables = json!({ "pairAddress": pair_address.to_lowercase() });
        match self.query::<Data>(&query, variables).await {
            Ok(result) => result
                .data
                .and_then(|d| d.lbpairs.into_iter().next()),
            Err(_) => None,
        }
    }

    /// Recent swaps for a pool, newest first.
    pub async fn get_pool_swaps(&self, pair_address: &str, first: u64) -> Vec<SubgraphSwap> {
        const QUERY: &str = r#"
            query GetPoolSwaps($pairAddress: String!, $first: Int!) {
                swaps(
                    where: { lbPair: $pairAddress }
                    first: $first
                    orderBy: timestamp
                    orderDirection: desc
                ) {
                    id
                    lbPair { id }
                    sender
                    recipient
                    amountUSD
                    feesUSD
                    timestamp
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            swaps: Vec<SubgraphSwap>,
        }

        let variables = json!({ "pairAddress": pair_address.to_lowercase(), "first": first });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => result.data.map(|d| d.swaps).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Rolling 24h stats for a pool, summed from its recent swaps.
    pub async fn get_pool_24h_stats(&self, pair_address: &str) -> Pool24hStats {
        const QUERY: &str = r#"
            query GetPool24hSwaps($pairAddress: String!, $since: BigInt!) {
                swaps(
                    where: { lbPair: $pairAddress, timestamp_gte: $since }
                    first: 1000
                    orderBy: timestamp
                    orderDirection: desc
                ) {
                    id
                    amountUSD
                    feesUSD
                    timestamp
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            swaps: Vec<SubgraphSwap>,
        }

        let since = unix_now() - 86_400;
        let variables = json!({
            "pairAddress": pair_address.to_lowercase(),
            "since": since.to_string(),
        });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => summarize_swaps(&result.data.map(|d| d.swaps).unwrap_or_default()),
            Err(_) => Pool24hStats::default(),
        }
    }

    /// A user's liquidity positions, newest first.
    pub async fn get_user_positions(
        &self,
        user_address: &str,
        first: u64,
    ) -> Vec<SubgraphLiquidityPosition> {
        const QUERY: &str = r#"
            query GetUserPositions($userAddress: String!, $first: Int!) {
                liquidityPositions(
                    where: { user: $userAddress }
                    first: $first
                    orderBy: timestamp
                    orderDirection: desc
                ) {
                    id
                    lbPair {
                        id
                        name
                        tokenX { id symbol name decimals }
                        tokenY { id symbol name decimals }
                        totalValueLockedUSD
                    }
                    userBinLiquidities { binId liquidity timestamp }
                    binsCount
                    timestamp
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "liquidityPositions")]
            positions: Vec<SubgraphLiquidityPosition>,
        }

        let variables = json!({ "userAddress": user_address.to_lowercase(), "first": first });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => result.data.map(|d| d.positions).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// A user's swap history across pools, newest first.
    pub async fn get_user_swaps(&self, user_address: &str, first: u64) -> Vec<SubgraphSwap> {
        const QUERY: &str = r#"
            query GetUserSwaps($userAddress: String!, $first: Int!) {
                swaps(
                    where: { or: [{ sender: $userAddress }, { recipient: $userAddress }] }
                    first: $first
                    orderBy: timestamp
                    orderDirection: desc
                ) {
                    id
                    lbPair { id }
                    sender
                    recipient
                    amountUSD
                    feesUSD
                    timestamp
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            swaps: Vec<SubgraphSwap>,
        }

        let variables = json!({ "userAddress": user_address.to_lowercase(), "first": first });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => result.data.map(|d| d.swaps).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Search pools by token symbol or name fragments.
    pub async fn search_pools(&self, search_term: &str, first: u64) -> Vec<SubgraphPool> {
        let query = format!(
            r#"
            query SearchPools($searchTerm: String!, $first: Int!) {{
                lbpairs(
                    where: {{
                        or: [
                            {{ tokenX_: {{ symbol_contains_nocase: $searchTerm }} }},
                            {{ tokenY_: {{ symbol_contains_nocase: $searchTerm }} }},
                            {{ tokenX_: {{ name_contains_nocase: $searchTerm }} }},
                            {{ tokenY_: {{ name_contains_nocase: $searchTerm }} }}
                        ]
                    }}
                    first: $first
                    orderBy: totalValueLockedUSD
                    orderDirection: desc
                ) {{
                    {POOL_FIELDS}
                }}
            }}
        "#
        );

        #[derive(Deserialize)]
        struct Data {
            lbpairs: Vec<SubgraphPool>,
        }

        let variables = json!({ "searchTerm": search_term, "first": first });
        match self.query::<Data>(&query, variables).await {
            Ok(result) => result.data.map(|d| d.lbpairs).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Indexed tokens ordered by locked value.
    pub async fn get_tokens(&self, first: u64, skip: u64) -> Vec<SubgraphToken> {
        const QUERY: &str = r#"
            query GetTokens($first: Int!, $skip: Int!) {
                tokens(
                    first: $first
                    skip: $skip
                    orderBy: totalValueLockedUSD
                    orderDirection: desc
                ) {
                    id
                    symbol
                    name
                    decimals
                    volumeUSD
                    totalValueLockedUSD
                    txCount
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            tokens: Vec<SubgraphToken>,
        }

        let variables = json!({ "first": first, "skip": skip });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => result.data.map(|d| d.tokens).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Day-bucketed per-pool aggregates, newest day first.
    pub async fn get_pools_day_data(&self, first: u64, skip: u64) -> Vec<LbPairDayData> {
        const QUERY: &str = r#"
            query GetPoolsDayData($first: Int!, $skip: Int!) {
                lbpairDayDatas(
                    first: $first
                    skip: $skip
                    orderBy: date
                    orderDirection: desc
                ) {
                    date
                    lbPair { id }
                    volumeUSD
                    feesUSD
                    txCount
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "lbpairDayDatas")]
            day_datas: Vec<LbPairDayData>,
        }

        let variables = json!({ "first": first, "skip": skip });
        match self.query::<Data>(QUERY, variables).await {
            Ok(result) => result.data.map(|d| d.day_datas).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Factory-level totals for global analytics.
    pub async fn get_factory(&self) -> Option<SubgraphFactory> {
        const QUERY: &str = r#"
            query GetFactoryData {
                lbfactories {
                    id
                    pairCount
                    volumeUSD
                    totalValueLockedUSD
                    txCount
                    tokenCount
                    userCount
                    feesUSD
                }
            }
        "#;

        #[derive(Deserialize)]
        struct Data {
            lbfactories: Vec<SubgraphFactory>,
        }

        match self.query::<Data>(QUERY, json!({})).await {
            Ok(result) => result.data.and_then(|d| d.lbfactories.into_iter().next()),
            Err(_) => None,
        }
    }
}

/// Applies the two admission rules to subgraph metadata. Indexing errors
/// dominate staleness; both refuse the subgraph for this request.
pub fn evaluate_meta(
    meta: Option<&SubgraphMeta>,
    now_unix: i64,
    max_staleness_seconds: i64,
) -> HealthStatus {
    let meta = match meta {
        Some(meta) => meta,
        None => {
            metrics::increment_subgraph_unhealthy("no_meta");
            return HealthStatus::unhealthy("No metadata available");
        }
    };

    if meta.has_indexing_errors {
        metrics::increment_subgraph_unhealthy("indexing_errors");
        return HealthStatus {
            healthy: false,
            block_number: Some(meta.block.number),
            has_indexing_errors: Some(true),
            error: Some("Subgraph has indexing errors".to_string()),
        };
    }

    let age = now_unix - meta.block.timestamp;
    if age > max_staleness_seconds {
        metrics::increment_subgraph_unhealthy("stale");
        let behind = minutes_since(meta.block.timestamp, now_unix);
        warn!("Subgraph is {} minutes behind", behind);
        return HealthStatus {
            healthy: false,
            block_number: Some(meta.block.number),
            has_indexing_errors: Some(false),
            error: Some(format!("Subgraph is {} minutes behind", behind)),
        };
    }

    HealthStatus::healthy(meta.block.number)
}

/// Sums USD volume and fees over a swap slice and counts the swaps.
pub fn summarize_swaps(swaps: &[SubgraphSwap]) -> Pool24hStats {
    let mut stats = Pool24hStats {
        swap_count: swaps.len() as u64,
        ..Default::default()
    };
    for swap in swaps {
        stats.volume_24h += swap
            .amount_usd
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        stats.fees_24h += swap
            .fees_usd
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(timestamp: i64, has_indexing_errors: bool) -> SubgraphMeta {
        SubgraphMeta {
            block: MetaBlock {
                number: 1_234_567,
                hash: None,
                timestamp,
            },
            deployment: None,
            has_indexing_errors,
        }
    }

    #[test]
    fn test_missing_meta_is_unhealthy() {
        let status = evaluate_meta(None, 1_000_000, 3600);
        assert!(!status.healthy);
        assert_eq!(status.error.as_deref(), Some("No metadata available"));
    }

    #[test]
    fn test_indexing_errors_dominate_freshness() {
        // Block timestamp is current, but indexing errors still refuse it
        let now = 1_000_000;
        let status = evaluate_meta(Some(&meta(now, true)), now, 3600);
        assert!(!status.healthy);
        assert_eq!(status.has_indexing_errors, Some(true));
        assert_eq!(status.block_number, Some(1_234_567));
    }

    #[test]
    fn test_stale_block_reports_minutes_behind() {
        let now = 1_000_000;
        let status = evaluate_meta(Some(&meta(now - 7_200, false)), now, 3600);
        assert!(!status.healthy);
        assert_eq!(status.error.as_deref(), Some("Subgraph is 120 minutes behind"));
        assert_eq!(status.has_indexing_errors, Some(false));
    }

    #[test]
    fn test_fresh_block_is_healthy() {
        let now = 1_000_000;
        let status = evaluate_meta(Some(&meta(now - 30, false)), now, 3600);
        assert!(status.healthy);
        assert_eq!(status.block_number, Some(1_234_567));
        assert!(status.error.is_none());
    }

    #[test]
    fn test_staleness_boundary() {
        let now = 1_000_000;
        // Exactly at the limit is still admissible
        assert!(evaluate_meta(Some(&meta(now - 3600, false)), now, 3600).healthy);
        assert!(!evaluate_meta(Some(&meta(now - 3601, false)), now, 3600).healthy);
    }

    fn swap(amount: Option<&str>, fees: Option<&str>) -> SubgraphSwap {
        SubgraphSwap {
            id: "s".into(),
            lb_pair: None,
            sender: None,
            recipient: None,
            amount_usd: amount.map(|s| s.to_string()),
            fees_usd: fees.map(|s| s.to_string()),
            timestamp: "0".into(),
        }
    }

    #[test]
    fn test_summarize_swaps() {
        let swaps = vec![
            swap(Some("100.5"), Some("0.3")),
            swap(Some("199.5"), Some("0.7")),
            swap(None, Some("not-a-number")),
        ];
        let stats = summarize_swaps(&swaps);
        assert_eq!(stats.swap_count, 3);
        assert_eq!(stats.volume_24h, 300.0);
        assert_eq!(stats.fees_24h, 1.0);
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize_swaps(&[]);
        assert_eq!(stats.swap_count, 0);
        assert_eq!(stats.volume_24h, 0.0);
    }
}
