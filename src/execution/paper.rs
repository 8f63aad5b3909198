//! PAPER execution path (C6): applies simulated slippage then delegates to
//! the Paper Ledger (C5), which applies its own configured fee.

use super::{ExecutionAdapter, OrderContext};
use crate::ledger::PaperLedger;
use crate::models::{ExecutionOutcome, Fill, Order, Side, SkipReason};
use std::sync::Arc;

pub struct PaperExecutionAdapter {
    ledger: Arc<PaperLedger>,
    slippage: f64,
}

impl PaperExecutionAdapter {
    pub fn new(ledger: Arc<PaperLedger>, slippage: f64) -> Self {
        Self { ledger, slippage }
    }

    fn slipped_price(&self, order: &Order) -> f64 {
        match order.side {
            Side::Buy => order.limit_price * (1.0 + self.slippage),
            Side::Sell => order.limit_price * (1.0 - self.slippage),
        }
    }
}

#[async_trait::async_trait]
impl ExecutionAdapter for PaperExecutionAdapter {
    async fn execute(&self, order: Order, ctx: OrderContext) -> ExecutionOutcome {
        let price = self.slipped_price(&order);
        let result = match order.side {
            Side::Buy => self.ledger.buy(
                &order.token_id,
                &ctx.condition_id,
                ctx.outcome,
                price,
                order.size,
                ctx.target_wallet,
                ctx.source_trade_id,
            ),
            Side::Sell => self.ledger.sell(
                &order.token_id,
                price,
                order.size,
                ctx.target_wallet,
                ctx.source_trade_id,
            ),
        };

        match result {
            Ok(trade) => ExecutionOutcome::Executed(Fill {
                order_id: trade.id,
                executed_price: trade.price,
                executed_size: trade.shares,
                fees: trade.fees,
                latency_ms: 0,
            }),
            Err("insufficient_funds") => ExecutionOutcome::Skipped(SkipReason::InsufficientFunds),
            Err("insufficient_shares") => ExecutionOutcome::Skipped(SkipReason::InsufficientShares),
            Err(other) => ExecutionOutcome::Failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, TargetWallet};

    fn order(side: Side, price: f64, size: f64) -> Order {
        Order::new("tok-1", side, price, size)
    }

    fn ctx() -> OrderContext {
        OrderContext {
            condition_id: "cond-1".into(),
            outcome: Outcome::Yes,
            target_wallet: Some(TargetWallet::new("0xabc")),
            source_trade_id: Some("tx1".into()),
        }
    }

    #[tokio::test]
    async fn buy_applies_adverse_slippage_and_executes() {
        let ledger = Arc::new(PaperLedger::new(10_000.0, 0.001));
        let adapter = PaperExecutionAdapter::new(ledger.clone(), 0.01);
        let outcome = adapter.execute(order(Side::Buy, 0.50, 10.0), ctx()).await;
        match outcome {
            ExecutionOutcome::Executed(fill) => {
                assert!(fill.executed_price > 0.50);
            }
            other => panic!("expected Executed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insufficient_funds_maps_to_skipped() {
        let ledger = Arc::new(PaperLedger::new(1.0, 0.001));
        let adapter = PaperExecutionAdapter::new(ledger, 0.01);
        let outcome = adapter.execute(order(Side::Buy, 0.50, 100.0), ctx()).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Skipped(SkipReason::InsufficientFunds)
        ));
    }

    #[tokio::test]
    async fn sell_with_no_position_maps_to_skipped() {
        let ledger = Arc::new(PaperLedger::new(10_000.0, 0.001));
        let adapter = PaperExecutionAdapter::new(ledger, 0.01);
        let outcome = adapter.execute(order(Side::Sell, 0.50, 10.0), ctx()).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Skipped(SkipReason::InsufficientShares)
        ));
    }
}
