use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

/// Per-chain RPC endpoint and contract addresses.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub factory_address: String,
    pub router_address: String,
    #[serde(default)]
    pub quoter_address: Option<String>,
    #[serde(default = "default_blocks_per_hour")]
    pub blocks_per_hour: u64,
    /// First block worth scanning for pair events; log scans never go earlier.
    #[serde(default)]
    pub deploy_block: u64,
}

fn default_blocks_per_hour() -> u64 {
    1200 // ~3 seconds per block on BSC
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubgraphSettings {
    #[serde(default = "default_subgraph_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Indexed-block age beyond which the subgraph is refused for a request.
    #[serde(default = "default_max_staleness_seconds")]
    pub max_staleness_seconds: i64,
}

fn default_subgraph_endpoint() -> String {
    "http://localhost:8000/subgraphs/name/lb/indexer-bnb-testnet".to_string()
}
fn default_request_timeout_seconds() -> u64 {
    10
}
fn default_max_staleness_seconds() -> i64 {
    3600
}

impl Default for SubgraphSettings {
    fn default() -> Self {
        Self {
            endpoint: default_subgraph_endpoint(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_staleness_seconds: default_max_staleness_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    /// Hard floor imposed by the durable KV store.
    #[serde(default = "default_min_ttl_seconds")]
    pub min_ttl_seconds: u64,
    #[serde(default = "default_warm_interval_seconds")]
    pub warm_interval_seconds: u64,
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_min_ttl_seconds() -> u64 {
    60
}
fn default_warm_interval_seconds() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            min_ttl_seconds: default_min_ttl_seconds(),
            warm_interval_seconds: default_warm_interval_seconds(),
            redis_url: None,
        }
    }
}

/// Bounds for historical event-log scans.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanSettings {
    #[serde(default = "default_scan_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_price_cache_ttl_seconds")]
    pub price_cache_ttl_seconds: u64,
}

fn default_scan_chunk_size() -> u64 {
    10_000
}
fn default_price_cache_ttl_seconds() -> u64 {
    300 // 5 minutes
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_scan_chunk_size(),
            price_cache_ttl_seconds: default_price_cache_ttl_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsSettings {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9000
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarmingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Chain label the warm cycle precomputes payloads for.
    #[serde(default = "default_warm_chain")]
    pub chain: String,
    #[serde(default = "default_warm_page_size")]
    pub page_size: u64,
}

fn default_warm_chain() -> String {
    "binance".to_string()
}
fn default_warm_page_size() -> u64 {
    20
}

impl Default for WarmingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: default_warm_chain(),
            page_size: default_warm_page_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_chains")]
    pub chains: HashMap<String, ChainSettings>,
    #[serde(default)]
    pub subgraph: SubgraphSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub warming: WarmingSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

fn default_chains() -> HashMap<String, ChainSettings> {
    let mut chains = HashMap::new();
    chains.insert(
        "binance".to_string(),
        ChainSettings {
            rpc_url: "https://bsc-dataseed1.binance.org/".to_string(),
            factory_address: "0x8e42f2F4101563bF679975178e880FD87d3eFd4e".to_string(),
            router_address: "0xb4315e873dBcf96Ffd0acd8EA43f689D8c20fB30".to_string(),
            quoter_address: Some("0xfb76e9E7d88E308aB530330eD90e84a952570319".to_string()),
            blocks_per_hour: default_blocks_per_hour(),
            deploy_block: 0,
        },
    );
    chains.insert(
        "bsctest".to_string(),
        ChainSettings {
            rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545/".to_string(),
            factory_address: "0x8e42f2F4101563bF679975178e880FD87d3eFd4e".to_string(),
            router_address: "0xb4315e873dBcf96Ffd0acd8EA43f689D8c20fB30".to_string(),
            quoter_address: Some("0xfb76e9E7d88E308aB530330eD90e84a952570319".to_string()),
            blocks_per_hour: default_blocks_per_hour(),
            deploy_block: 0,
        },
    );
    chains
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            subgraph: SubgraphSettings::default(),
            cache: CacheSettings::default(),
            scan: ScanSettings::default(),
            warming: WarmingSettings::default(),
            log: LogSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable overrides
        if let Ok(endpoint) = env::var("LB_SUBGRAPH_URL") {
            let trimmed = endpoint.trim();
            if !trimmed.is_empty() {
                settings.subgraph.endpoint = trimmed.to_string();
            }
        }
        if let Ok(redis_url) = env::var("REDIS_URL") {
            let trimmed = redis_url.trim();
            if !trimmed.is_empty() {
                settings.cache.redis_url = Some(trimmed.to_string());
            }
        }
        // LB_RPC_URL_<CHAIN> overrides the RPC endpoint of a configured chain
        for (name, chain) in settings.chains.iter_mut() {
            let var = format!("LB_RPC_URL_{}", name.to_uppercase());
            if let Ok(url) = env::var(&var) {
                if !url.trim().is_empty() {
                    chain.rpc_url = url.trim().to_string();
                }
            }
        }

        validate_subgraph_endpoint(&settings.subgraph.endpoint)?;

        Ok(settings)
    }
}

fn validate_subgraph_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    url::Url::parse(endpoint)
        .map(|_| ())
        .map_err(|e| ConfigError::Message(format!("invalid subgraph endpoint {}: {}", endpoint, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chains_present() {
        let settings = Settings::default();
        assert!(settings.chains.contains_key("binance"));
        assert!(settings.chains.contains_key("bsctest"));
        assert_eq!(settings.chains["binance"].blocks_per_hour, 1200);
    }

    #[test]
    fn test_default_subgraph_limits() {
        let settings = Settings::default();
        assert_eq!(settings.subgraph.max_staleness_seconds, 3600);
        assert_eq!(settings.cache.min_ttl_seconds, 60);
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(validate_subgraph_endpoint("http://localhost:8000/subgraphs/name/x").is_ok());
        assert!(validate_subgraph_endpoint("not a url").is_err());
    }
}
