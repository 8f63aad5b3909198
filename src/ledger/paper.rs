//! Paper Ledger (C5): the system of record for simulated trading — cash
//! balance plus a `tokenId -> Position` map, buys/sells deducting/crediting
//! cash and returning the shares moved, positions removed once flat, backed
//! by a durable debounced on-disk form via `DebouncedWriter`.

use crate::models::{Outcome, Position, Side, TargetWallet, Trade};
use crate::store::{self, DebouncedWriter};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const MAX_TRADES: usize = 500;
const TRADES_TRUNCATE_TO: usize = MAX_TRADES * 3 / 4;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PaperStats {
    pub total_realized_pnl: f64,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_fees: f64,
    pub total_trades: u32,
    sum_wins: f64,
    sum_losses: f64,
}

impl PaperStats {
    fn record_fill(&mut self, fees: f64) {
        self.total_fees += fees;
        self.total_trades += 1;
    }

    fn record_realized_pnl(&mut self, pnl: f64) {
        if pnl == 0.0 {
            return;
        }
        self.total_realized_pnl += pnl;
        if pnl > 0.0 {
            self.winning_trades += 1;
            self.sum_wins += pnl;
            if pnl > self.largest_win {
                self.largest_win = pnl;
            }
        } else {
            self.losing_trades += 1;
            self.sum_losses += pnl;
            if pnl < self.largest_loss {
                self.largest_loss = pnl;
            }
        }
    }

    pub fn win_rate(&self) -> f64 {
        let decided = self.winning_trades + self.losing_trades;
        if decided == 0 {
            0.0
        } else {
            self.winning_trades as f64 / decided as f64
        }
    }

    pub fn profit_factor(&self) -> f64 {
        if self.sum_losses == 0.0 {
            if self.sum_wins > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            self.sum_wins / self.sum_losses.abs()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PaperStateDocument {
    starting_balance: f64,
    current_balance: f64,
    positions: HashMap<String, Position>,
    trades: VecDeque<Trade>,
    stats: PaperStats,
}

struct State {
    starting_balance: f64,
    current_balance: f64,
    positions: HashMap<String, Position>,
    trades: VecDeque<Trade>,
    stats: PaperStats,
}

pub struct PaperLedger {
    state: RwLock<State>,
    fee_rate: f64,
    writer: RwLock<Option<DebouncedWriter>>,
    path: RwLock<Option<PathBuf>>,
}

impl PaperLedger {
    pub fn new(starting_balance: f64, fee_rate: f64) -> Self {
        Self {
            state: RwLock::new(State {
                starting_balance,
                current_balance: starting_balance,
                positions: HashMap::new(),
                trades: VecDeque::new(),
                stats: PaperStats::default(),
            }),
            fee_rate,
            writer: RwLock::new(None),
            path: RwLock::new(None),
        }
    }

    /// Loads `paper-state.json` (falling back to a fresh ledger at
    /// `starting_balance` if absent or corrupt) and arms a debounced writer
    /// back to the same path.
    pub fn load(path: PathBuf, starting_balance: f64, fee_rate: f64) -> Arc<Self> {
        let doc: Option<PaperStateDocument> = {
            let raw = std::fs::read_to_string(&path).ok();
            raw.and_then(|s| serde_json::from_str(&s).ok())
        };

        let state = match doc {
            Some(doc) => State {
                starting_balance: doc.starting_balance,
                current_balance: doc.current_balance,
                positions: doc.positions,
                trades: doc.trades,
                stats: doc.stats,
            },
            None => State {
                starting_balance,
                current_balance: starting_balance,
                positions: HashMap::new(),
                trades: VecDeque::new(),
                stats: PaperStats::default(),
            },
        };

        let ledger = Arc::new(Self {
            state: RwLock::new(state),
            fee_rate,
            writer: RwLock::new(None),
            path: RwLock::new(Some(path.clone())),
        });

        let snapshot_ledger = ledger.clone();
        let writer = DebouncedWriter::spawn(path, Duration::from_millis(500), move || {
            let guard = snapshot_ledger.state.read();
            serde_json::to_value(PaperStateDocument {
                starting_balance: guard.starting_balance,
                current_balance: guard.current_balance,
                positions: guard.positions.clone(),
                trades: guard.trades.clone(),
                stats: guard.stats,
            })
            .unwrap_or_default()
        });
        *ledger.writer.write() = Some(writer);
        ledger
    }

    fn mark_dirty(&self) {
        if let Some(w) = self.writer.read().as_ref() {
            w.mark_dirty();
        }
    }

    /// Buys `shares` of `token_id` at `price`. Rejects (without mutating
    /// state) if cash on hand can't cover cost plus fees.
    pub fn buy(
        &self,
        token_id: &str,
        condition_id: &str,
        outcome: Outcome,
        price: f64,
        shares: f64,
        target_wallet: Option<TargetWallet>,
        source_trade_id: Option<String>,
    ) -> Result<Trade, &'static str> {
        let cost = price * shares;
        let fees = cost * self.fee_rate;

        let mut state = self.state.write();
        if state.current_balance < cost + fees {
            return Err("insufficient_funds");
        }
        state.current_balance -= cost + fees;

        let position = state
            .positions
            .entry(token_id.to_string())
            .or_insert_with(|| Position::new(token_id, condition_id, outcome));
        // Fees are folded into the cost basis so a later SELL's FIFO match
        // nets out to the true cash-in/cash-out realized P&L (matching the
        // currentBalance delta), not just the price spread.
        position.shares += shares;
        position.total_cost += cost + fees;
        position.fees_paid += fees;

        let trade = Trade {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            token_id: token_id.to_string(),
            condition_id: condition_id.to_string(),
            side: Side::Buy,
            price,
            shares,
            usd_value: cost,
            fees,
            pnl: None,
            target_wallet,
            trade_id: source_trade_id,
        };
        state.stats.record_fill(fees);
        push_trade(&mut state.trades, trade.clone());
        drop(state);
        self.mark_dirty();
        Ok(trade)
    }

    /// Sells up to `shares` of `token_id` (capped to the open position
    /// size). Rejects if there is no open position to sell from.
    pub fn sell(
        &self,
        token_id: &str,
        price: f64,
        shares: f64,
        target_wallet: Option<TargetWallet>,
        source_trade_id: Option<String>,
    ) -> Result<Trade, &'static str> {
        let mut state = self.state.write();
        let position = state
            .positions
            .get_mut(token_id)
            .filter(|p| p.shares > 0.0)
            .ok_or("insufficient_shares")?;

        let condition_id = position.condition_id.clone();
        let sell_shares = shares.min(position.shares);
        let entry_value = position.total_cost * (sell_shares / position.shares);
        let proceeds = sell_shares * price;
        let fees = proceeds * self.fee_rate;
        let pnl = proceeds - entry_value - fees;

        position.shares -= sell_shares;
        position.total_cost -= entry_value;
        let fully_closed = position.shares <= 1e-9;
        if fully_closed {
            position.settled = true;
            position.settlement_pnl = Some(pnl);
        }

        state.current_balance += proceeds - fees;
        if fully_closed {
            state.positions.remove(token_id);
        }

        let trade = Trade {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            token_id: token_id.to_string(),
            condition_id,
            side: Side::Sell,
            price,
            shares: sell_shares,
            usd_value: proceeds,
            fees,
            pnl: Some(pnl),
            target_wallet,
            trade_id: source_trade_id,
        };
        state.stats.record_fill(fees);
        state.stats.record_realized_pnl(pnl);
        push_trade(&mut state.trades, trade.clone());
        drop(state);
        self.mark_dirty();
        Ok(trade)
    }

    pub fn current_balance(&self) -> f64 {
        self.state.read().current_balance
    }

    pub fn starting_balance(&self) -> f64 {
        self.state.read().starting_balance
    }

    pub fn stats(&self) -> PaperStats {
        self.state.read().stats
    }

    pub fn positions(&self) -> Vec<Position> {
        self.state.read().positions.values().cloned().collect()
    }

    pub fn position(&self, token_id: &str) -> Option<Position> {
        self.state.read().positions.get(token_id).cloned()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.state.read().trades.iter().cloned().collect()
    }

    /// Memory reaper hook (C12): drops settled/flat positions.
    pub fn trim_positions(&self) {
        let mut state = self.state.write();
        state.positions.retain(|_, p| p.shares > 0.0 && !p.settled);
    }

    /// Synchronous write-through, used by the supervisor's shutdown path so
    /// the last few seconds of ledger state aren't lost to the debounce window.
    pub fn flush_now(&self) {
        let Some(path) = self.path.read().clone() else { return };
        let guard = self.state.read();
        let doc = PaperStateDocument {
            starting_balance: guard.starting_balance,
            current_balance: guard.current_balance,
            positions: guard.positions.clone(),
            trades: guard.trades.clone(),
            stats: guard.stats,
        };
        drop(guard);
        let _ = store::write_json_atomic(&path, &doc);
    }
}

fn push_trade(trades: &mut VecDeque<Trade>, trade: Trade) {
    trades.push_back(trade);
    if trades.len() > MAX_TRADES {
        let drop_count = trades.len() - TRADES_TRUNCATE_TO;
        debug!(drop_count, "truncating paper trade log");
        for _ in 0..drop_count {
            trades.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_deducts_cash_and_opens_a_position() {
        let ledger = PaperLedger::new(10_000.0, 0.001);
        let trade = ledger
            .buy("tok-yes", "cond-1", Outcome::Yes, 0.40, 100.0, None, None)
            .unwrap();
        assert_eq!(trade.usd_value, 40.0);
        assert!((ledger.current_balance() - (10_000.0 - 40.0 - 0.04)).abs() < 1e-9);
        let pos = ledger.position("tok-yes").unwrap();
        assert_eq!(pos.shares, 100.0);
    }

    #[test]
    fn buy_rejects_when_balance_insufficient() {
        let ledger = PaperLedger::new(10.0, 0.001);
        let result = ledger.buy("tok-yes", "cond-1", Outcome::Yes, 0.40, 100.0, None, None);
        assert!(result.is_err());
        assert_eq!(ledger.current_balance(), 10.0);
    }

    #[test]
    fn scenario_s1_buy_then_sell_matches_expected_ledger() {
        let ledger = PaperLedger::new(10_000.0, 0.001);
        ledger
            .buy("tok-yes", "cond-1", Outcome::Yes, 0.40, 100.0, None, None)
            .unwrap();
        ledger.sell("tok-yes", 0.55, 100.0, None, None).unwrap();

        assert!((ledger.current_balance() - 10_014.905).abs() < 1e-6);
        assert!((ledger.stats().total_realized_pnl - 14.905).abs() < 1e-6);
        assert!(ledger.position("tok-yes").is_none());
    }

    #[test]
    fn selling_more_than_held_caps_at_position_size() {
        let ledger = PaperLedger::new(10_000.0, 0.001);
        ledger
            .buy("tok-yes", "cond-1", Outcome::Yes, 0.40, 50.0, None, None)
            .unwrap();
        let trade = ledger.sell("tok-yes", 0.50, 500.0, None, None).unwrap();
        assert_eq!(trade.shares, 50.0);
        assert!(ledger.position("tok-yes").is_none());
    }

    #[test]
    fn sell_without_a_position_is_rejected() {
        let ledger = PaperLedger::new(10_000.0, 0.001);
        assert!(ledger.sell("tok-yes", 0.5, 10.0, None, None).is_err());
    }

    #[test]
    fn trade_log_truncates_on_overflow() {
        let ledger = PaperLedger::new(1_000_000.0, 0.0);
        for i in 0..(MAX_TRADES + 10) {
            ledger
                .buy(&format!("tok-{i}"), "cond-1", Outcome::Yes, 0.1, 1.0, None, None)
                .unwrap();
        }
        assert_eq!(ledger.trades().len(), TRADES_TRUNCATE_TO);
    }

    #[tokio::test]
    async fn persists_and_reloads_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper-state.json");

        let ledger = PaperLedger::load(path.clone(), 10_000.0, 0.001);
        ledger
            .buy("tok-yes", "cond-1", Outcome::Yes, 0.4, 10.0, None, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;

        let reloaded = PaperLedger::load(path, 10_000.0, 0.001);
        assert_eq!(reloaded.position("tok-yes").unwrap().shares, 10.0);
    }
}
