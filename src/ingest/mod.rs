//! Activity Ingester (C7): one websocket subscription plus one HTTP poller
//! per target, converging on a single `mpsc::Sender<ActivityEvent>`.

pub mod normalize;
pub mod poller;
pub mod websocket;

pub use poller::ActivityPoller;
pub use websocket::WebSocketIngester;

use crate::dedup::DedupStore;
use crate::models::ActivityEvent;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Read by the supervisor/ops surface for `/health`.
#[derive(Default)]
pub struct IngesterStats {
    connected: AtomicBool,
    messages_seen: AtomicU64,
    target_trades: AtomicU64,
    /// Wall-clock ms the ingester started; events older than this minus
    /// the age-gate window are seen-but-not-emitted.
    started_at_ms: AtomicI64,
}

impl IngesterStats {
    pub fn new(started_at_ms: i64) -> Self {
        Self {
            connected: AtomicBool::new(false),
            messages_seen: AtomicU64::new(0),
            target_trades: AtomicU64::new(0),
            started_at_ms: AtomicI64::new(started_at_ms),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn bump_messages(&self) {
        self.messages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_target_trades(&self) {
        self.target_trades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_seen(&self) -> u64 {
        self.messages_seen.load(Ordering::Relaxed)
    }

    pub fn target_trades(&self) -> u64 {
        self.target_trades.load(Ordering::Relaxed)
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms.load(Ordering::Relaxed)
    }
}

/// Five minutes.
pub const AGE_GATE_MS: i64 = 5 * 60 * 1000;

/// Shared dedup + age-gate + emit path used by both the websocket stream
/// and the HTTP poller, so "copy each trade exactly once" has a single
/// implementation regardless of which transport saw the event first.
pub async fn accept(
    event: ActivityEvent,
    dedup: &DedupStore,
    tx: &mpsc::Sender<ActivityEvent>,
    stats: &IngesterStats,
) {
    if dedup.has_seen(&event.target_wallet, &event.trade_id) {
        return;
    }
    dedup.mark_seen(&event.target_wallet, &event.trade_id);

    let is_stale_at_startup = event.timestamp_ms < stats.started_at_ms() - AGE_GATE_MS;
    if is_stale_at_startup {
        debug!(trade_id = %event.trade_id, "age-gated at startup, marked seen but not emitted");
        return;
    }

    stats.bump_target_trades();
    if tx.send(event).await.is_err() {
        debug!("ingester downstream channel closed, dropping event");
    }
}
