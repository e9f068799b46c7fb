// src/chain_reader.rs
//
// RPC-backed reader for LB pairs. One pool read is an atomic fan-out over the
// seven pair views; a batch of pools is a fault-isolated join where a bad pool
// is skipped and logged. Historical log scans are bounded and chunked, never
// a single earliest-to-latest query.

use crate::contracts::{Erc20, LBFactory, LBPair, LBRouter, TransferBatchFilter};
use crate::metrics;
use crate::settings::Settings;
use crate::types::{OnChainToken, PoolBatch, PoolOnChain, SwapQuote};
use crate::utils::create_block_chunks;
use dashmap::DashMap;
use ethers::abi::RawLog;
use ethers::contract::EthLogDecode;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Filter, H256, U256};
use futures::future::join_all;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("provider request failed: {0}")]
    Provider(String),
}

/// Resolved per-chain context: provider plus contract addresses.
struct ChainContext {
    provider: Arc<Provider<Http>>,
    factory: Address,
    router: Address,
    deploy_block: u64,
}

#[derive(Clone)]
struct PriceEntry {
    price: f64,
    fetched_at: Instant,
}

/// Resumable position for chunked historical log scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    pub next_block: u64,
}

impl ScanCursor {
    pub fn new(start_block: u64) -> Self {
        Self {
            next_block: start_block,
        }
    }
}

/// Deposit/withdraw log occurrences for a user, grouped per transaction log.
#[derive(Debug, Clone, Default)]
pub struct UserLiquidityEvents {
    pub deposits: Vec<BinLiquidityEvent>,
    pub withdrawals: Vec<BinLiquidityEvent>,
}

#[derive(Debug, Clone)]
pub struct BinLiquidityEvent {
    pub block_number: u64,
    pub bin_ids: Vec<u32>,
}

/// Contract reader over one or more configured chains. Owns the short-lived
/// in-memory token price cache; all other state lives with the caller.
pub struct ChainReader {
    chains: HashMap<String, ChainContext>,
    price_cache: DashMap<String, PriceEntry>,
    price_ttl: Duration,
    scan_chunk_size: u64,
}

impl ChainReader {
    pub fn from_settings(settings: &Settings) -> Result<Self, RpcError> {
        let mut chains = HashMap::new();
        for (name, chain) in &settings.chains {
            let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())
                .map_err(|e| RpcError::Provider(format!("bad RPC url for {}: {}", name, e)))?;
            chains.insert(
                name.clone(),
                ChainContext {
                    provider: Arc::new(provider),
                    factory: parse_address(&chain.factory_address)?,
                    router: parse_address(&chain.router_address)?,
                    deploy_block: chain.deploy_block,
                },
            );
        }
        Ok(Self {
            chains,
            price_cache: DashMap::new(),
            price_ttl: Duration::from_secs(settings.scan.price_cache_ttl_seconds),
            scan_chunk_size: settings.scan.chunk_size,
        })
    }

    #[cfg(test)]
    fn with_price_ttl(mut self, ttl: Duration) -> Self {
        self.price_ttl = ttl;
        self
    }

    pub fn supports_chain(&self, chain: &str) -> bool {
        self.chains.contains_key(chain)
    }

    fn context(&self, chain: &str) -> Result<&ChainContext, RpcError> {
        self.chains
            .get(chain)
            .ok_or_else(|| RpcError::UnsupportedChain(chain.to_string()))
    }

    /// ERC20 metadata with sentinel degradation: a token that does not answer
    /// becomes Unknown/UNK/18 instead of failing the enclosing pool fetch.
    pub async fn get_token_info(&self, chain: &str, token: Address) -> Result<OnChainToken, RpcError> {
        let ctx = self.context(chain)?;
        Ok(token_info(&ctx.provider, token).await)
    }

    /// Atomic pool read: all seven pair views must succeed together, or the
    /// whole read fails. No partially populated pool is ever returned.
    pub async fn get_pool_data(&self, chain: &str, pool: Address) -> Result<PoolOnChain, RpcError> {
        let ctx = self.context(chain)?;
        let pair = LBPair::new(pool, ctx.provider.clone());

        let token_x_call = pair.get_token_x();
        let token_y_call = pair.get_token_y();
        let bin_step_call = pair.get_bin_step();
        let active_id_call = pair.get_active_id();
        let reserves_call = pair.get_reserves();
        let protocol_fees_call = pair.get_protocol_fees();
        let fee_params_call = pair.get_static_fee_parameters();
        let (token_x, token_y, bin_step, active_id, reserves, protocol_fees, fee_params) =
            tokio::try_join!(
                token_x_call.call(),
                token_y_call.call(),
                bin_step_call.call(),
                active_id_call.call(),
                reserves_call.call(),
                protocol_fees_call.call(),
                fee_params_call.call(),
            )
            .map_err(|e| {
                metrics::increment_pool_read_failure(chain);
                RpcError::Call(format!("pool read failed for {:?}: {}", pool, e))
            })?;

        let (token_x_info, token_y_info) = tokio::join!(
            token_info(&ctx.provider, token_x),
            token_info(&ctx.provider, token_y),
        );

        let (reserve_x, reserve_y) = reserves;
        let (protocol_fee_x, protocol_fee_y) = protocol_fees;
        let (base_factor, _, _, _, _, protocol_share, _) = fee_params;

        Ok(PoolOnChain {
            pair_address: pool,
            token_x: token_x_info,
            token_y: token_y_info,
            bin_step,
            active_id,
            reserve_x: U256::from(reserve_x),
            reserve_y: U256::from(reserve_y),
            protocol_fee_x: U256::from(protocol_fee_x),
            protocol_fee_y: U256::from(protocol_fee_y),
            base_factor,
            protocol_share,
        })
    }

    /// Pages through the factory's pair list. Each pool fetch is isolated:
    /// one bad pool is skipped and logged without aborting the batch.
    pub async fn get_all_pools(&self, chain: &str, start: u64, count: u64) -> Result<PoolBatch, RpcError> {
        let ctx = self.context(chain)?;
        let factory = LBFactory::new(ctx.factory, ctx.provider.clone());

        let total_pairs: U256 = factory
            .get_number_of_lb_pairs()
            .call()
            .await
            .map_err(|e| RpcError::Call(format!("pair count read failed: {}", e)))?;
        let total_pairs = total_pairs.as_u64();
        let end = (start + count).min(total_pairs);

        let fetches = (start..end).map(|index| {
            let factory = &factory;
            async move {
                let pair_address = match factory.get_lb_pair_at_index(U256::from(index)).call().await {
                    Ok(address) => address,
                    Err(e) => {
                        warn!("Failed to resolve pair at index {}: {}", index, e);
                        return None;
                    }
                };
                match self.get_pool_data(chain, pair_address).await {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        warn!("Skipping pool {:?} at index {}: {}", pair_address, index, e);
                        None
                    }
                }
            }
        });

        let pools = join_all(fetches).await.into_iter().flatten().collect();
        Ok(PoolBatch { pools, total_pairs })
    }

    /// Bins a user currently holds shares in. Transfer history alone is not
    /// enough - balances may have since emptied - so every candidate bin is
    /// validated against its current balance.
    pub async fn get_user_bin_ids(&self, chain: &str, user: Address, pool: Address) -> Result<Vec<u32>, RpcError> {
        let ctx = self.context(chain)?;
        let latest = ctx
            .provider
            .get_block_number()
            .await
            .map_err(|e| RpcError::Provider(e.to_string()))?
            .as_u64();

        let mut cursor = ScanCursor::new(ctx.deploy_block);
        let candidates = self
            .scan_user_bin_candidates(chain, user, pool, &mut cursor, latest)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<u32> = candidates.into_iter().collect();
        let balances = self.get_batch_balances(chain, pool, user, &ids).await?;
        Ok(filter_funded_bins(&ids, &balances))
    }

    /// Walks TransferBatch logs addressed to the user over bounded block
    /// chunks, advancing the cursor as each chunk completes so a caller can
    /// resume an interrupted scan.
    pub async fn scan_user_bin_candidates(
        &self,
        chain: &str,
        user: Address,
        pool: Address,
        cursor: &mut ScanCursor,
        to_block: u64,
    ) -> Result<BTreeSet<u32>, RpcError> {
        let ctx = self.context(chain)?;
        let mut bins = BTreeSet::new();

        for (from, to) in create_block_chunks(cursor.next_block, to_block, self.scan_chunk_size) {
            let filter = Filter::new()
                .address(pool)
                .event("TransferBatch(address,address,address,uint256[],uint256[])")
                .topic3(H256::from(user))
                .from_block(from)
                .to_block(to);
            let logs = ctx
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| RpcError::Provider(format!("log scan [{}, {}] failed: {}", from, to, e)))?;
            for log in logs {
                let raw = RawLog {
                    topics: log.topics,
                    data: log.data.to_vec(),
                };
                if let Ok(event) = TransferBatchFilter::decode_log(&raw) {
                    for id in event.ids {
                        bins.insert(id.low_u32());
                    }
                }
            }
            cursor.next_block = to.saturating_add(1);
        }

        debug!(
            "Bin candidate scan for {:?} on {:?} found {} bins",
            user,
            pool,
            bins.len()
        );
        Ok(bins)
    }

    /// Concurrent balance reads for the candidate bins. A failed read counts
    /// as zero so one bad call cannot inflate the result set.
    pub async fn get_batch_balances(
        &self,
        chain: &str,
        pool: Address,
        user: Address,
        bin_ids: &[u32],
    ) -> Result<Vec<U256>, RpcError> {
        let ctx = self.context(chain)?;
        let pair = LBPair::new(pool, ctx.provider.clone());

        let reads = bin_ids.iter().map(|&id| {
            let pair = &pair;
            async move {
                match pair.balance_of(user, U256::from(id)).call().await {
                    Ok(balance) => balance,
                    Err(e) => {
                        warn!("balanceOf({:?}, {}) failed: {}", user, id, e);
                        U256::zero()
                    }
                }
            }
        });

        Ok(join_all(reads).await)
    }

    /// Deposit and withdrawal history for a user on one pool, scanned over
    /// bounded chunks like the transfer scan.
    pub async fn get_user_liquidity_events(
        &self,
        chain: &str,
        user: Address,
        pool: Address,
    ) -> Result<UserLiquidityEvents, RpcError> {
        let ctx = self.context(chain)?;
        let latest = ctx
            .provider
            .get_block_number()
            .await
            .map_err(|e| RpcError::Provider(e.to_string()))?
            .as_u64();

        let deposits = self
            .scan_bin_amount_logs(
                chain,
                pool,
                user,
                "DepositedToBins(address,address,uint256[],bytes32[])",
                ctx.deploy_block,
                latest,
            )
            .await?;
        let withdrawals = self
            .scan_bin_amount_logs(
                chain,
                pool,
                user,
                "WithdrawnFromBins(address,address,uint256[],bytes32[])",
                ctx.deploy_block,
                latest,
            )
            .await?;

        Ok(UserLiquidityEvents {
            deposits,
            withdrawals,
        })
    }

    async fn scan_bin_amount_logs(
        &self,
        chain: &str,
        pool: Address,
        sender: Address,
        event_signature: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BinLiquidityEvent>, RpcError> {
        let ctx = self.context(chain)?;
        let mut events = Vec::new();

        for (from, to) in create_block_chunks(from_block, to_block, self.scan_chunk_size) {
            let filter = Filter::new()
                .address(pool)
                .event(event_signature)
                .topic1(H256::from(sender))
                .from_block(from)
                .to_block(to);
            let logs = ctx
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| RpcError::Provider(format!("log scan [{}, {}] failed: {}", from, to, e)))?;
            for log in logs {
                let bin_ids = decode_bin_ids(&log.data);
                events.push(BinLiquidityEvent {
                    block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
                    bin_ids,
                });
            }
        }

        Ok(events)
    }

    /// USD price with a 5-minute in-memory cache keyed `chain-address`.
    /// Expiry is checked lazily on read; duplicate fetches on a cold key are
    /// tolerated because writes are idempotent within the TTL window.
    pub async fn get_token_price(&self, chain: &str, token: Address) -> f64 {
        let key = format!("{}-{:?}", chain, token);
        if let Some(entry) = self.price_cache.get(&key) {
            if entry.fetched_at.elapsed() < self.price_ttl {
                return entry.price;
            }
        }

        let price = self.fetch_external_price(chain, token).await.unwrap_or(1.0);
        self.price_cache.insert(
            key,
            PriceEntry {
                price,
                fetched_at: Instant::now(),
            },
        );
        metrics::set_price_cache_size(self.price_cache.len() as f64);
        price
    }

    /// Exact-input swap quote from the router for one pair.
    pub async fn get_swap_out(
        &self,
        chain: &str,
        pair: Address,
        amount_in: u128,
        swap_for_y: bool,
    ) -> Result<SwapQuote, RpcError> {
        let ctx = self.context(chain)?;
        let router = LBRouter::new(ctx.router, ctx.provider.clone());
        let (amount_in_left, amount_out, fee) = router
            .get_swap_out(pair, amount_in, swap_for_y)
            .call()
            .await
            .map_err(|e| RpcError::Call(format!("swap quote failed for {:?}: {}", pair, e)))?;
        Ok(SwapQuote {
            amount_in_left,
            amount_out,
            fee,
        })
    }

    // TODO: wire a CoinGecko simple/price lookup here once an API key is
    // provisioned; until then every token resolves to the neutral default
    // and stablecoin correction happens downstream.
    async fn fetch_external_price(&self, _chain: &str, _token: Address) -> Option<f64> {
        Some(1.0)
    }
}

/// ERC20 metadata fan-out with sentinel degradation at field granularity.
async fn token_info(provider: &Arc<Provider<Http>>, token: Address) -> OnChainToken {
    let erc20 = Erc20::new(token, provider.clone());
    let name_call = erc20.name();
    let symbol_call = erc20.symbol();
    let decimals_call = erc20.decimals();
    match tokio::try_join!(name_call.call(), symbol_call.call(), decimals_call.call()) {
        Ok((name, symbol, decimals)) => OnChainToken {
            address: token,
            name,
            symbol,
            decimals,
        },
        Err(e) => {
            warn!("Failed to fetch token info for {:?}: {}", token, e);
            OnChainToken::unknown(token)
        }
    }
}

/// Rejects malformed addresses before any network call is made.
pub fn parse_address(raw: &str) -> Result<Address, RpcError> {
    Address::from_str(raw.trim()).map_err(|_| RpcError::InvalidAddress(raw.to_string()))
}

/// Keeps only candidate bins whose current balance is strictly positive.
pub fn filter_funded_bins(bin_ids: &[u32], balances: &[U256]) -> Vec<u32> {
    bin_ids
        .iter()
        .zip(balances.iter())
        .filter(|(_, balance)| !balance.is_zero())
        .map(|(&id, _)| id)
        .collect()
}

/// Decodes the `uint256[] ids` head of a DepositedToBins/WithdrawnFromBins
/// log payload.
fn decode_bin_ids(data: &[u8]) -> Vec<u32> {
    use ethers::abi::{decode, ParamType};
    let params = [
        ParamType::Array(Box::new(ParamType::Uint(256))),
        ParamType::Array(Box::new(ParamType::FixedBytes(32))),
    ];
    match decode(&params, data) {
        Ok(tokens) => tokens
            .first()
            .and_then(|t| t.clone().into_array())
            .map(|ids| {
                ids.into_iter()
                    .filter_map(|t| t.into_uint())
                    .map(|u| u.low_u32())
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x8e42f2F4101563bF679975178e880FD87d3eFd4e").is_ok());
        assert!(parse_address("  0x8e42f2F4101563bF679975178e880FD87d3eFd4e ").is_ok());
        assert!(parse_address("0x123").is_err());
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn test_filter_funded_bins_drops_empty_balances() {
        let ids = vec![1, 2, 3];
        let balances = vec![U256::from(10), U256::zero(), U256::from(5)];
        assert_eq!(filter_funded_bins(&ids, &balances), vec![1, 3]);
    }

    #[test]
    fn test_filter_funded_bins_empty() {
        assert!(filter_funded_bins(&[], &[]).is_empty());
    }

    #[test]
    fn test_from_settings_builds_configured_chains() {
        let reader = ChainReader::from_settings(&Settings::default()).unwrap();
        assert!(reader.supports_chain("binance"));
        assert!(reader.supports_chain("bsctest"));
        assert!(!reader.supports_chain("mainnet"));
    }

    #[test]
    fn test_unsupported_chain_is_rejected() {
        let reader = ChainReader::from_settings(&Settings::default()).unwrap();
        assert!(matches!(
            reader.context("solana"),
            Err(RpcError::UnsupportedChain(_))
        ));
    }

    #[tokio::test]
    async fn test_price_cache_expires_lazily() {
        let reader = ChainReader::from_settings(&Settings::default())
            .unwrap()
            .with_price_ttl(Duration::from_secs(300));
        let token = Address::zero();
        let key = format!("{}-{:?}", "binance", token);
        reader.price_cache.insert(
            key.clone(),
            PriceEntry {
                price: 42.0,
                fetched_at: Instant::now(),
            },
        );
        // Fresh entry is served from cache without any network fetch
        assert_eq!(reader.get_token_price("binance", token).await, 42.0);

        // An expired entry falls through to the fetch path and is replaced
        let reader = reader.with_price_ttl(Duration::from_secs(0));
        assert_eq!(reader.get_token_price("binance", token).await, 1.0);
    }

    #[test]
    fn test_scan_cursor_resumes() {
        let mut cursor = ScanCursor::new(100);
        assert_eq!(cursor.next_block, 100);
        cursor.next_block = 5_000;
        assert_eq!(cursor, ScanCursor { next_block: 5_000 });
    }
}
