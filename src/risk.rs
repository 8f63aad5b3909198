//! Risk Manager (C4): pure sizing + guardrail evaluation of one
//! `ActivityEvent` against the active `TradingConfig`/`RiskConfig` and the
//! rolling volume already committed today.
//!
//! Grounded on `risk::RiskManager::calculate_position`'s shape (a pure
//! function from event + config + live totals to a sized recommendation or
//! a reason for rejection) — the Kelly/VaR/calibration machinery that
//! surrounds it there is not part of this engine's sizing model, which
//! instead follows the simpler proportional/fixed-usd/fixed-shares rules.

use crate::config::{RiskConfig, SizingMode, TradingConfig};
use crate::models::{ActivityEvent, SkipReason};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A sized, guardrail-cleared replica ready for the executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedReplica {
    pub shares: f64,
    pub price: f64,
}

impl SizedReplica {
    pub fn notional(&self) -> f64 {
        self.shares * self.price
    }
}

struct RollingVolume {
    per_market: HashMap<(NaiveDate, String), f64>,
    daily: HashMap<NaiveDate, f64>,
}

impl RollingVolume {
    fn new() -> Self {
        Self {
            per_market: HashMap::new(),
            daily: HashMap::new(),
        }
    }

    /// Keeps only today and yesterday; per property 6 we only ever need
    /// "so far today" totals, so anything older is dead weight.
    fn trim(&mut self, today: NaiveDate) {
        let yesterday = today - chrono::Duration::days(1);
        self.per_market.retain(|(d, _), _| *d == today || *d == yesterday);
        self.daily.retain(|d, _| *d == today || *d == yesterday);
    }

    fn market_total(&self, today: NaiveDate, condition_id: &str) -> f64 {
        self.per_market
            .get(&(today, condition_id.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    fn daily_total(&self, today: NaiveDate) -> f64 {
        self.daily.get(&today).copied().unwrap_or(0.0)
    }

    fn record(&mut self, today: NaiveDate, condition_id: &str, notional: f64) {
        *self
            .per_market
            .entry((today, condition_id.to_string()))
            .or_insert(0.0) += notional;
        *self.daily.entry(today).or_insert(0.0) += notional;
    }
}

pub struct RiskManager {
    volume: Mutex<RollingVolume>,
}

impl RiskManager {
    pub fn new() -> Self {
        Self {
            volume: Mutex::new(RollingVolume::new()),
        }
    }

    /// Applies sizing, the min-order floor, the per-trade/market/daily caps
    /// and the allow/deny lists, in that order. On success, commits the
    /// accepted notional into the rolling totals; on rejection, state is
    /// untouched.
    pub fn evaluate(
        &self,
        event: &ActivityEvent,
        trading: &TradingConfig,
        risk: &RiskConfig,
    ) -> Result<SizedReplica, SkipReason> {
        let price = event.price;

        let mut shares = match trading.sizing_mode {
            SizingMode::Proportional => event.size_shares * trading.proportional_multiplier,
            SizingMode::FixedUsd => {
                if price <= 0.0 {
                    return Err(SkipReason::ParseError);
                }
                trading.fixed_usd_size / price
            }
            SizingMode::FixedShares => trading.fixed_shares_size,
        };

        if trading.min_order_size > 0.0 && shares * price < trading.min_order_size {
            shares = trading.min_order_size / price;
        }
        if shares < trading.min_order_shares {
            return Err(SkipReason::BelowMinimumShares);
        }

        if risk.max_usd_per_trade > 0.0 && shares * price > risk.max_usd_per_trade {
            shares = risk.max_usd_per_trade / price;
        }

        let today = Utc::now().date_naive();
        let notional = shares * price;

        {
            let mut volume = self.volume.lock();
            volume.trim(today);

            if risk.max_usd_per_market > 0.0
                && volume.market_total(today, &event.condition_id) + notional > risk.max_usd_per_market
            {
                return Err(SkipReason::MaxUsdPerMarketExceeded);
            }
            if risk.max_daily_usd_volume > 0.0
                && volume.daily_total(today) + notional > risk.max_daily_usd_volume
            {
                return Err(SkipReason::MaxDailyUsdVolumeExceeded);
            }
        }

        if risk
            .market_denylist
            .iter()
            .any(|m| m == &event.market_slug || m == &event.condition_id)
        {
            return Err(SkipReason::MarketDenied);
        }
        if !risk.market_allowlist.is_empty()
            && !risk
                .market_allowlist
                .iter()
                .any(|m| m == &event.market_slug || m == &event.condition_id)
        {
            return Err(SkipReason::MarketNotAllowlisted);
        }

        self.volume.lock().record(today, &event.condition_id, notional);
        Ok(SizedReplica { shares, price })
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityType, Outcome, Side, TargetWallet};

    fn event(price: f64, size_shares: f64) -> ActivityEvent {
        ActivityEvent {
            target_wallet: TargetWallet::new("0xabc"),
            trade_id: "tx1".into(),
            timestamp_ms: 0,
            token_id: "tok-1".into(),
            condition_id: "cond-1".into(),
            market_slug: "will-it-rain".into(),
            outcome: Outcome::Yes,
            side: Side::Buy,
            price,
            size_shares,
            activity_type: ActivityType::Trade,
        }
    }

    #[test]
    fn proportional_sizing_scales_by_multiplier() {
        let rm = RiskManager::new();
        let trading = TradingConfig {
            proportional_multiplier: 2.0,
            ..TradingConfig::default()
        };
        let risk = RiskConfig::default();
        let sized = rm.evaluate(&event(0.5, 100.0), &trading, &risk).unwrap();
        assert_eq!(sized.shares, 200.0);
    }

    #[test]
    fn below_minimum_shares_is_rejected() {
        let rm = RiskManager::new();
        let trading = TradingConfig {
            min_order_shares: 1000.0,
            min_order_size: 0.0,
            ..TradingConfig::default()
        };
        let risk = RiskConfig::default();
        assert_eq!(
            rm.evaluate(&event(0.5, 1.0), &trading, &risk),
            Err(SkipReason::BelowMinimumShares)
        );
    }

    #[test]
    fn per_trade_cap_shrinks_instead_of_rejecting() {
        let rm = RiskManager::new();
        let trading = TradingConfig::default();
        let risk = RiskConfig {
            max_usd_per_trade: 10.0,
            ..RiskConfig::default()
        };
        let sized = rm.evaluate(&event(0.5, 1000.0), &trading, &risk).unwrap();
        assert_eq!(sized.notional(), 10.0);
    }

    #[test]
    fn per_market_cap_rejects_once_cumulative_exceeds_it() {
        let rm = RiskManager::new();
        let trading = TradingConfig {
            min_order_shares: 0.0,
            ..TradingConfig::default()
        };
        let risk = RiskConfig {
            max_usd_per_market: 100.0,
            max_usd_per_trade: 0.0,
            ..RiskConfig::default()
        };
        assert!(rm.evaluate(&event(0.5, 150.0), &trading, &risk).is_ok());
        assert_eq!(
            rm.evaluate(&event(0.5, 60.0), &trading, &risk),
            Err(SkipReason::MaxUsdPerMarketExceeded)
        );
    }

    #[test]
    fn denylist_rejects_even_within_caps() {
        let rm = RiskManager::new();
        let trading = TradingConfig::default();
        let risk = RiskConfig {
            market_denylist: vec!["will-it-rain".to_string()],
            ..RiskConfig::default()
        };
        assert_eq!(
            rm.evaluate(&event(0.5, 100.0), &trading, &risk),
            Err(SkipReason::MarketDenied)
        );
    }

    #[test]
    fn allowlist_rejects_markets_not_listed() {
        let rm = RiskManager::new();
        let trading = TradingConfig::default();
        let risk = RiskConfig {
            market_allowlist: vec!["some-other-market".to_string()],
            ..RiskConfig::default()
        };
        assert_eq!(
            rm.evaluate(&event(0.5, 100.0), &trading, &risk),
            Err(SkipReason::MarketNotAllowlisted)
        );
    }

    #[test]
    fn rejection_does_not_commit_volume() {
        let rm = RiskManager::new();
        let trading = TradingConfig {
            min_order_shares: 0.0,
            ..TradingConfig::default()
        };
        let risk = RiskConfig {
            max_usd_per_market: 10.0,
            max_usd_per_trade: 0.0,
            ..RiskConfig::default()
        };
        assert!(rm.evaluate(&event(0.5, 1000.0), &trading, &risk).is_err());
        // Same-size event should still be rejected, not accepted on a
        // phantom partial commit from the failed attempt.
        assert!(rm.evaluate(&event(0.5, 1000.0), &trading, &risk).is_err());
    }
}
