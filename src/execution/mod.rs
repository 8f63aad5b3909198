//! Order Executor (C6): one trait, two implementations selected by the
//! Mode Controller (C10) — `paper` simulates fills against the ledger,
//! `live` submits real orders to the Polymarket CLOB. `OrderContext` carries
//! the ledger bookkeeping fields alongside the order that a wire-level
//! submission itself doesn't need.

pub mod live;
pub mod paper;

pub use live::LiveExecutionAdapter;
pub use paper::PaperExecutionAdapter;

use crate::models::{ExecutionOutcome, Order, Outcome, TargetWallet};

/// Ledger/risk context that rides alongside an `Order` but isn't part of
/// the wire-level order itself.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub condition_id: String,
    pub outcome: Outcome,
    pub target_wallet: Option<TargetWallet>,
    pub source_trade_id: Option<String>,
}

#[async_trait::async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn execute(&self, order: Order, ctx: OrderContext) -> ExecutionOutcome;
}
