//! Balance/Market-Params Cache (C3): tick size, negRisk flag, fee rate per
//! token (60 s TTL), plus the two balance reads the LIVE executor needs
//! before it will submit an order — global USDC (15 s TTL) and per-token
//! conditional share count, invalidated on a successful fill.

use super::TtlEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

const PARAMS_TTL: Duration = Duration::from_secs(60);
const BALANCE_TTL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketParams {
    pub tick_size: f64,
    pub neg_risk: bool,
    pub fee_rate_bps: f64,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            neg_risk: false,
            fee_rate_bps: 0.0,
        }
    }
}

pub struct MarketParamsCache {
    params: RwLock<HashMap<String, TtlEntry<MarketParams>>>,
    usdc_balance: RwLock<Option<TtlEntry<f64>>>,
    shares: RwLock<HashMap<String, TtlEntry<f64>>>,
}

impl MarketParamsCache {
    pub fn new() -> Self {
        Self {
            params: RwLock::new(HashMap::new()),
            usdc_balance: RwLock::new(None),
            shares: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_params(&self, token_id: &str) -> Option<MarketParams> {
        self.params
            .read()
            .get(token_id)
            .filter(|e| e.is_fresh(PARAMS_TTL))
            .map(|e| e.value)
    }

    pub fn put_params(&self, token_id: impl Into<String>, params: MarketParams) {
        self.params.write().insert(token_id.into(), TtlEntry::new(params));
    }

    pub fn get_usdc_balance(&self) -> Option<f64> {
        self.usdc_balance
            .read()
            .as_ref()
            .filter(|e| e.is_fresh(BALANCE_TTL))
            .map(|e| e.value)
    }

    pub fn put_usdc_balance(&self, balance: f64) {
        *self.usdc_balance.write() = Some(TtlEntry::new(balance));
    }

    pub fn get_share_balance(&self, token_id: &str) -> Option<f64> {
        self.shares
            .read()
            .get(token_id)
            .filter(|e| e.is_fresh(BALANCE_TTL))
            .map(|e| e.value)
    }

    pub fn put_share_balance(&self, token_id: impl Into<String>, shares: f64) {
        self.shares.write().insert(token_id.into(), TtlEntry::new(shares));
    }

    /// Called after a fill so the next pre-flight check refetches rather
    /// than trusting pre-trade numbers.
    pub fn invalidate_position(&self, token_id: &str) {
        self.shares.write().remove(token_id);
        *self.usdc_balance.write() = None;
    }
}

impl Default for MarketParamsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_round_trip_within_ttl() {
        let cache = MarketParamsCache::new();
        cache.put_params(
            "tok-1",
            MarketParams {
                tick_size: 0.001,
                neg_risk: true,
                fee_rate_bps: 50.0,
            },
        );
        let got = cache.get_params("tok-1").unwrap();
        assert_eq!(got.tick_size, 0.001);
        assert!(got.neg_risk);
    }

    #[test]
    fn missing_token_has_no_params() {
        let cache = MarketParamsCache::new();
        assert!(cache.get_params("unknown").is_none());
    }

    #[test]
    fn invalidate_clears_both_balance_kinds() {
        let cache = MarketParamsCache::new();
        cache.put_usdc_balance(500.0);
        cache.put_share_balance("tok-1", 42.0);
        cache.invalidate_position("tok-1");
        assert!(cache.get_usdc_balance().is_none());
        assert!(cache.get_share_balance("tok-1").is_none());
    }
}
