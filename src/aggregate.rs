//! Aggregation Buffer (C8): optional window-based merge of same
//! `(target, tokenId, side, activityType)` events before they reach the
//! risk manager.
//!
//! Grounded on the debounce-then-flush shape of `store::DebouncedWriter`
//! (accumulate, single timer, flush once) generalized from "coalesce one
//! pending write" to "coalesce N pending events into a volume-weighted
//! merge," racing inbound events against the next flush deadline with
//! `tokio::select!`.

use crate::models::{ActivityEvent, ActivityType, Side, TargetWallet};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

type Key = (TargetWallet, String, Side, ActivityType);

struct Entry {
    first: ActivityEvent,
    total_shares: f64,
    notional: f64,
    latest_timestamp_ms: i64,
    deadline: Instant,
}

impl Entry {
    fn open(event: ActivityEvent, deadline: Instant) -> Self {
        Self {
            total_shares: event.size_shares,
            notional: event.price * event.size_shares,
            latest_timestamp_ms: event.timestamp_ms,
            first: event,
            deadline,
        }
    }

    fn accumulate(&mut self, event: &ActivityEvent) {
        self.total_shares += event.size_shares;
        self.notional += event.price * event.size_shares;
        self.latest_timestamp_ms = self.latest_timestamp_ms.max(event.timestamp_ms);
    }

    fn into_merged_event(self) -> ActivityEvent {
        let avg_price = if self.total_shares > 0.0 {
            self.notional / self.total_shares
        } else {
            self.first.price
        };
        ActivityEvent {
            trade_id: format!("agg-{}", self.first.trade_id),
            timestamp_ms: self.latest_timestamp_ms,
            price: avg_price,
            size_shares: self.total_shares,
            ..self.first
        }
    }
}

/// Window length of zero disables aggregation entirely: the buffer becomes
/// a pass-through and this struct does no bookkeeping.
pub struct AggregationBuffer {
    window: Duration,
}

impl AggregationBuffer {
    pub fn new(window_ms: u64) -> Self {
        Self { window: Duration::from_millis(window_ms) }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    pub async fn run(self, mut rx: mpsc::Receiver<ActivityEvent>, tx: mpsc::Sender<ActivityEvent>) {
        if !self.is_enabled() {
            while let Some(event) = rx.recv().await {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            return;
        }

        let mut buffers: HashMap<Key, Entry> = HashMap::new();

        loop {
            let next_deadline = buffers.values().map(|e| e.deadline).min();
            let sleep = match next_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(Duration::from_secs(3600)),
            };
            tokio::pin!(sleep);

            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            let key = (event.target_wallet.clone(), event.token_id.clone(), event.side, event.activity_type);
                            match buffers.get_mut(&key) {
                                Some(entry) => entry.accumulate(&event),
                                None => {
                                    buffers.insert(key, Entry::open(event, Instant::now() + self.window));
                                }
                            }
                        }
                        None => {
                            for (_, entry) in buffers.drain() {
                                if tx.send(entry.into_merged_event()).await.is_err() {
                                    return;
                                }
                            }
                            return;
                        }
                    }
                }
                _ = &mut sleep, if next_deadline.is_some() => {
                    let now = Instant::now();
                    let expired: Vec<Key> = buffers
                        .iter()
                        .filter(|(_, e)| e.deadline <= now)
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in expired {
                        if let Some(entry) = buffers.remove(&key) {
                            debug!(trades = ?entry.total_shares, "flushing aggregated event");
                            if tx.send(entry.into_merged_event()).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;

    fn event(trade_id: &str, shares: f64, price: f64) -> ActivityEvent {
        ActivityEvent {
            target_wallet: TargetWallet::new("0xabc"),
            trade_id: trade_id.to_string(),
            timestamp_ms: 1_700_000_000_000,
            token_id: "tok-1".to_string(),
            condition_id: "cond-1".to_string(),
            market_slug: "will-it-rain".to_string(),
            outcome: Outcome::Yes,
            side: Side::Buy,
            price,
            size_shares: shares,
            activity_type: ActivityType::Trade,
        }
    }

    #[tokio::test]
    async fn disabled_buffer_passes_events_through_unchanged() {
        let buffer = AggregationBuffer::new(0);
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        let handle = tokio::spawn(buffer.run(rx_in, tx_out));

        tx_in.send(event("t1", 10.0, 0.5)).await.unwrap();
        drop(tx_in);

        let received = rx_out.recv().await.unwrap();
        assert_eq!(received.trade_id, "t1");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn matching_events_merge_into_a_volume_weighted_average() {
        let buffer = AggregationBuffer::new(50);
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        let handle = tokio::spawn(buffer.run(rx_in, tx_out));

        tx_in.send(event("t1", 10.0, 0.40)).await.unwrap();
        tx_in.send(event("t2", 30.0, 0.60)).await.unwrap();

        let merged = rx_out.recv().await.unwrap();
        assert_eq!(merged.trade_id, "agg-t1");
        assert_eq!(merged.size_shares, 40.0);
        assert!((merged.price - 0.55).abs() < 1e-9);

        drop(tx_in);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn different_sides_open_separate_buffers() {
        let buffer = AggregationBuffer::new(50);
        let (tx_in, rx_in) = mpsc::channel(8);
        let (tx_out, mut rx_out) = mpsc::channel(8);
        let handle = tokio::spawn(buffer.run(rx_in, tx_out));

        let mut buy = event("t1", 10.0, 0.40);
        buy.side = Side::Buy;
        let mut sell = event("t2", 10.0, 0.40);
        sell.side = Side::Sell;
        tx_in.send(buy).await.unwrap();
        tx_in.send(sell).await.unwrap();
        drop(tx_in);

        let first = rx_out.recv().await.unwrap();
        let second = rx_out.recv().await.unwrap();
        assert_ne!(first.side, second.side);
        handle.await.unwrap();
    }
}
