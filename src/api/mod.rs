//! Ops surface (C13): a small read-only `axum::Router` — `/health` and
//! `/stats`. No mutating routes; this surface exists for operators and
//! dashboards, never for controlling the engine.

use crate::config::ModeFlag;
use crate::models::{Position, Snapshot};
use crate::pnl::{self, PnlSummary};
use crate::supervisor::Supervisor;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(supervisor)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connected: bool,
    messages_seen: u64,
    target_trades: u64,
    uptime_ms: i64,
}

async fn health(State(supervisor): State<Arc<Supervisor>>) -> Json<HealthResponse> {
    let stats = &supervisor.ingester_stats;
    let uptime_ms = (chrono::Utc::now().timestamp_millis() - stats.started_at_ms()).max(0);
    Json(HealthResponse {
        status: if stats.is_connected() { "connected" } else { "disconnected" },
        connected: stats.is_connected(),
        messages_seen: stats.messages_seen(),
        target_trades: stats.target_trades(),
        uptime_ms,
    })
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    mode: ModeFlag,
    reads_available: bool,
    balance: f64,
    pnl: PnlSummary,
    positions: Vec<Position>,
    snapshot: Option<Snapshot>,
}

/// Returns the zeroed/empty shape — never paper numbers — whenever the
/// engine is in LIVE mode but the live executor isn't ready yet.
async fn stats(State(supervisor): State<Arc<Supervisor>>) -> Json<StatsResponse> {
    let mode = supervisor.mode.current();
    if !supervisor.mode.reads_available() {
        return Json(StatsResponse {
            mode,
            reads_available: false,
            balance: 0.0,
            pnl: PnlSummary::default(),
            positions: Vec::new(),
            snapshot: None,
        });
    }

    let trades = supervisor.ledger.trades();
    let balance = supervisor.ledger.current_balance();
    let pnl = pnl::summarize(&trades, balance, supervisor.ledger.starting_balance(), &supervisor.metadata);

    Json(StatsResponse {
        mode,
        reads_available: true,
        balance,
        pnl,
        positions: supervisor.ledger.positions(),
        snapshot: supervisor.snapshots.latest(),
    })
}
