//! P&L Aggregator (C9): derives realized/unrealized P&L from an ordered
//! trade log using FIFO-per-token cost basis, independent of whichever
//! component produced the trades (paper ledger or live fills). Pulled out
//! as a standalone function so LIVE mode can derive the same summary from
//! exchange-reported trades that PAPER mode derives from its own ledger.

use crate::cache::MetadataCache;
use crate::models::{Side, Trade};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct TokenBasis {
    shares: f64,
    cost_basis: f64,
    realized_pnl: f64,
}

impl TokenBasis {
    fn avg_cost(&self) -> f64 {
        if self.shares > 0.0 {
            self.cost_basis / self.shares
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpenPosition {
    pub token_id: String,
    pub shares: f64,
    pub avg_entry: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PnlSummary {
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
    pub return_pct: f64,
    pub open_positions: Vec<OpenPosition>,
}

/// Pure FIFO walk over a trade slice; no I/O, no shared state, so LIVE and
/// PAPER summaries are computed by the exact same function.
pub fn summarize(
    trades: &[Trade],
    current_balance: f64,
    starting_balance: f64,
    metadata: &MetadataCache,
) -> PnlSummary {
    let mut by_token: HashMap<String, TokenBasis> = HashMap::new();

    for trade in trades {
        let basis = by_token.entry(trade.token_id.clone()).or_default();
        match trade.side {
            Side::Buy => {
                basis.shares += trade.shares;
                basis.cost_basis += trade.shares * trade.price;
            }
            Side::Sell if basis.shares > 0.0 => {
                let sell_shares = trade.shares.min(basis.shares);
                let avg_cost = basis.avg_cost();
                let pnl = (trade.price - avg_cost) * sell_shares;
                basis.realized_pnl += pnl;
                basis.cost_basis -= basis.cost_basis * (sell_shares / basis.shares);
                basis.shares -= sell_shares;
            }
            Side::Sell => {
                // Sell with no tracked basis (e.g. log truncated mid-position):
                // nothing to realize against, leave basis untouched.
            }
        }
    }

    let realized_pnl: f64 = by_token.values().map(|b| b.realized_pnl).sum();

    let mut open_positions = Vec::new();
    let mut unrealized_pnl = 0.0;
    for (token_id, basis) in &by_token {
        if basis.shares <= 0.0 {
            continue;
        }
        let avg_entry = basis.avg_cost();
        let current_price = metadata
            .current_price(token_id)
            .unwrap_or(avg_entry);
        unrealized_pnl += basis.shares * (current_price - avg_entry);
        open_positions.push(OpenPosition { token_id: token_id.clone(), shares: basis.shares, avg_entry });
    }

    let total_pnl = realized_pnl + unrealized_pnl;
    let return_pct = if starting_balance > 0.0 {
        (current_balance + unrealized_pnl - starting_balance) / starting_balance
    } else {
        0.0
    };

    PnlSummary { realized_pnl, unrealized_pnl, total_pnl, return_pct, open_positions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MarketDescriptor, MetadataCache};
    use crate::models::{Side, TargetWallet};
    use chrono::Utc;
    use std::time::Duration;

    fn cache() -> MetadataCache {
        MetadataCache::new(Duration::from_secs(60))
    }

    fn trade(token_id: &str, side: Side, price: f64, shares: f64) -> Trade {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            token_id: token_id.to_string(),
            condition_id: "cond-1".to_string(),
            side,
            price,
            shares,
            usd_value: price * shares,
            fees: 0.0,
            pnl: None,
            target_wallet: Some(TargetWallet::new("0xabc")),
            trade_id: None,
        }
    }

    #[test]
    fn fully_closed_position_has_no_unrealized_component() {
        let trades = vec![
            trade("tok-1", Side::Buy, 0.40, 100.0),
            trade("tok-1", Side::Sell, 0.55, 100.0),
        ];
        let metadata = cache();
        let summary = summarize(&trades, 10_015.0, 10_000.0, &metadata);
        assert!((summary.realized_pnl - 15.0).abs() < 1e-9);
        assert_eq!(summary.unrealized_pnl, 0.0);
        assert!(summary.open_positions.is_empty());
    }

    #[test]
    fn partial_sell_leaves_remaining_shares_at_original_avg_entry() {
        let trades = vec![
            trade("tok-1", Side::Buy, 0.40, 100.0),
            trade("tok-1", Side::Sell, 0.60, 40.0),
        ];
        let metadata = cache();
        let summary = summarize(&trades, 10_008.0, 10_000.0, &metadata);
        assert!((summary.realized_pnl - 8.0).abs() < 1e-9);
        assert_eq!(summary.open_positions.len(), 1);
        assert!((summary.open_positions[0].avg_entry - 0.40).abs() < 1e-9);
        assert!((summary.open_positions[0].shares - 60.0).abs() < 1e-9);
    }

    #[test]
    fn unrealized_pnl_uses_metadata_price_when_available() {
        let trades = vec![trade("tok-1", Side::Buy, 0.40, 100.0)];
        let metadata = cache();
        metadata.put(MarketDescriptor {
            condition_id: "cond-1".to_string(),
            market_slug: "will-it-rain".to_string(),
            token_ids: vec!["tok-1".to_string()],
            prices: HashMap::from([("tok-1".to_string(), 0.70)]),
            resolved: false,
            payouts: HashMap::new(),
        });
        let summary = summarize(&trades, 9_960.0, 10_000.0, &metadata);
        assert!((summary.unrealized_pnl - 30.0).abs() < 1e-9);
    }

    #[test]
    fn missing_metadata_falls_back_to_avg_entry_with_zero_unrealized() {
        let trades = vec![trade("tok-1", Side::Buy, 0.40, 100.0)];
        let metadata = cache();
        let summary = summarize(&trades, 9_960.0, 10_000.0, &metadata);
        assert_eq!(summary.unrealized_pnl, 0.0);
    }
}
