// src/price_correction.rs
//
// Light price correction heuristics. Known stablecoins drift on low-liquidity
// pools, so their oracle price is pinned to exactly 1.0 and TVL is re-derived
// from reserves times the corrected per-side prices.

use crate::types::PoolRecord;
use log::debug;
use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Known stable tokens that should always be $1, keyed by lowercase address.
static STABLE_TOKEN_ADDRESSES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("0x64544969ed7ebf5f083679233325356ebe738930", "USDC"); // BSC Testnet USDC
    m.insert("0x337610d27c682e347c9cd60bd4b3b107c9d34ddd", "USDT"); // BSC Testnet USDT
    m
});

/// Stablecoin symbols corrected regardless of address.
const STABLE_SYMBOLS: [&str; 4] = ["USDC", "USDT", "DAI", "BUSD"];

/// Pins known-stablecoin prices to exactly 1.0; all other prices pass through.
/// Idempotent by construction.
pub fn correct_token_price(token_address: &str, oracle_price: f64, symbol: Option<&str>) -> f64 {
    let normalized = token_address.to_lowercase();
    let is_stable_address = STABLE_TOKEN_ADDRESSES.contains_key(normalized.as_str());
    let is_stable_symbol = symbol.map_or(false, |s| STABLE_SYMBOLS.contains(&s));

    if is_stable_address || is_stable_symbol {
        if oracle_price != 1.0 {
            debug!(
                "Correcting {} price from {} to 1.0",
                symbol.unwrap_or("stable token"),
                oracle_price
            );
        }
        return 1.0;
    }
    oracle_price
}

fn parse_decimal(raw: Option<&str>) -> Decimal {
    raw.and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Re-derives TVL as `reserveX * priceX + reserveY * priceY` with corrected
/// per-side prices. A side missing price data contributes zero, yielding a
/// partial (understated) TVL rather than an error.
pub fn recalculate_tvl(pool: &PoolRecord) -> f64 {
    let price_x = correct_token_price(
        &pool.token_x.address,
        parse_decimal(pool.token_x_price_usd.as_deref())
            .to_f64()
            .unwrap_or(0.0),
        Some(&pool.token_x.symbol),
    );
    let price_y = correct_token_price(
        &pool.token_y.address,
        parse_decimal(pool.token_y_price_usd.as_deref())
            .to_f64()
            .unwrap_or(0.0),
        Some(&pool.token_y.symbol),
    );

    let reserve_x = parse_decimal(Some(&pool.reserve_x));
    let reserve_y = parse_decimal(Some(&pool.reserve_y));

    let corrected = reserve_x * decimal_from_f64(price_x) + reserve_y * decimal_from_f64(price_y);
    let corrected = corrected.to_f64().unwrap_or(0.0);

    let reported = parse_decimal(pool.total_value_locked_usd.as_deref())
        .to_f64()
        .unwrap_or(0.0);
    if (corrected - reported).abs() > f64::EPSILON {
        debug!(
            "TVL corrected for pool {}: {} -> {:.2}",
            pool.id, reported, corrected
        );
    }

    corrected
}

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// Annualized APY from 24h fees over corrected TVL, capped at 1000%.
pub fn pool_apy(pool: &PoolRecord) -> f64 {
    let tvl = recalculate_tvl(pool);
    let fees_24h = parse_decimal(pool.fees_usd.as_deref()).to_f64().unwrap_or(0.0);
    if tvl == 0.0 {
        return 0.0;
    }
    let daily_return = fees_24h / tvl;
    let apy = ((1.0 + daily_return).powi(365) - 1.0) * 100.0;
    apy.min(1000.0)
}

/// Simple APR from 24h fees over corrected TVL, capped at 1000%.
pub fn pool_apr(pool: &PoolRecord) -> f64 {
    let tvl = recalculate_tvl(pool);
    let fees_24h = parse_decimal(pool.fees_usd.as_deref()).to_f64().unwrap_or(0.0);
    if tvl == 0.0 {
        return 0.0;
    }
    (fees_24h / tvl * 365.0 * 100.0).min(1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenInfo;

    fn token(address: &str, symbol: &str) -> TokenInfo {
        TokenInfo {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: 18,
        }
    }

    fn pool(
        reserve_x: &str,
        reserve_y: &str,
        symbol_x: &str,
        symbol_y: &str,
        price_x: Option<&str>,
        price_y: Option<&str>,
    ) -> PoolRecord {
        PoolRecord {
            id: "0xpool".into(),
            name: format!("{}/{}", symbol_x, symbol_y),
            token_x: token("0x1111", symbol_x),
            token_y: token("0x2222", symbol_y),
            bin_step: 25,
            active_id: 8_388_608,
            reserve_x: reserve_x.to_string(),
            reserve_y: reserve_y.to_string(),
            total_value_locked_usd: None,
            volume_usd: None,
            fees_usd: None,
            tx_count: 0,
            liquidity_provider_count: 1,
            token_x_price_usd: price_x.map(|s| s.to_string()),
            token_y_price_usd: price_y.map(|s| s.to_string()),
            timestamp: 0,
        }
    }

    #[test]
    fn test_stable_symbols_forced_to_one() {
        for symbol in ["USDC", "USDT", "DAI", "BUSD"] {
            assert_eq!(correct_token_price("0x9999", 0.35, Some(symbol)), 1.0);
            assert_eq!(correct_token_price("0x9999", 12.7, Some(symbol)), 1.0);
        }
    }

    #[test]
    fn test_stable_address_forced_to_one() {
        // Allow-listed address wins even without a symbol hint
        assert_eq!(
            correct_token_price("0x64544969ed7EBf5f083679233325356EbE738930", 0.97, None),
            1.0
        );
    }

    #[test]
    fn test_non_stable_passes_through() {
        assert_eq!(correct_token_price("0x9999", 3.21, Some("WBNB")), 3.21);
    }

    #[test]
    fn test_correction_is_idempotent() {
        let once = correct_token_price("0x9999", 0.35, Some("USDC"));
        let twice = correct_token_price("0x9999", once, Some("USDC"));
        assert_eq!(once, twice);
        let once = correct_token_price("0x9999", 3.21, Some("WBNB"));
        let twice = correct_token_price("0x9999", once, Some("WBNB"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_recalculate_tvl_worked_example() {
        // reserveX=1000 USDC (corrected to $1), reserveY=2000 @ $2
        let p = pool("1000", "2000", "USDC", "WBNB", Some("0.98"), Some("2"));
        assert_eq!(recalculate_tvl(&p), 5000.0);
    }

    #[test]
    fn test_recalculate_tvl_partial_when_price_missing() {
        // Missing Y price yields an understated TVL, not a failure
        let p = pool("1000", "2000", "USDC", "WBNB", Some("1"), None);
        assert_eq!(recalculate_tvl(&p), 1000.0);
    }

    #[test]
    fn test_apr_apy_zero_tvl() {
        let p = pool("0", "0", "AAA", "BBB", None, None);
        assert_eq!(pool_apr(&p), 0.0);
        assert_eq!(pool_apy(&p), 0.0);
    }

    #[test]
    fn test_apr_capped() {
        let mut p = pool("1", "0", "USDC", "BBB", Some("1"), None);
        p.fees_usd = Some("1000".into());
        assert_eq!(pool_apr(&p), 1000.0);
    }
}
