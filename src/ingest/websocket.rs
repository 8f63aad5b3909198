//! Real-time half of the Activity Ingester (C7): a single authenticated
//! subscription to `activity/trades` + `activity/orders_matched`, filtered
//! to the configured target set.
//!
//! `run()`/`connect_and_stream()` split with doubling backoff capped at
//! 30s, the same `IntoClientRequest` + `WebSocketConfig` connect call, and a
//! per-instance "destroyed" flag gating any still-in-flight callback from a
//! prior connection.

use super::normalize::normalize;
use super::{accept, IngesterStats};
use crate::dedup::DedupStore;
use crate::models::ActivityEvent;
use crate::net::Backoff;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, tungstenite::protocol::WebSocketConfig};
use tracing::{debug, error, info, warn};

const WS_URL: &str = "wss://ws-live-data.polymarket.com";
const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct WsEnvelope {
    topic: String,
    #[serde(rename = "type", default)]
    msg_type: String,
    payload: serde_json::Value,
}

/// Maps the `{topic, type, payload}` wire shape onto the same `RawActivity`
/// fields the HTTP poller consumes, so both transports share `normalize`.
#[derive(Debug, Deserialize)]
struct WsPayload {
    #[serde(rename = "proxyWallet")]
    proxy_wallet: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    asset: String,
    #[serde(rename = "conditionId")]
    condition_id: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(rename = "eventSlug", default)]
    event_slug: Option<String>,
    outcome: String,
    #[serde(rename = "outcomeIndex", default)]
    outcome_index: Option<i64>,
    #[serde(default)]
    side: Option<String>,
    price: f64,
    size: f64,
    timestamp: i64,
}

pub struct WebSocketIngester {
    targets: Vec<String>,
    dedup: Arc<DedupStore>,
    tx: mpsc::Sender<ActivityEvent>,
    stats: Arc<IngesterStats>,
    destroyed: Arc<AtomicBool>,
}

impl WebSocketIngester {
    pub fn new(
        targets: Vec<String>,
        dedup: Arc<DedupStore>,
        tx: mpsc::Sender<ActivityEvent>,
        stats: Arc<IngesterStats>,
    ) -> Self {
        Self {
            targets: targets.into_iter().map(|t| t.to_lowercase()).collect(),
            dedup,
            tx,
            stats,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips the destroyed flag; any in-flight `connect_and_stream` loop
    /// exits on its next message or ping tick rather than reconnecting.
    pub fn stop(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    /// Runs forever, reconnecting with jittered exponential backoff until
    /// `stop()` is called.
    pub async fn run(&self) {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));

        while !self.destroyed.load(Ordering::SeqCst) {
            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("activity websocket closed cleanly");
                    backoff.reset();
                }
                Err(e) => {
                    self.stats.set_connected(false);
                    error!(error = %e, "activity websocket error");
                }
            }

            if self.destroyed.load(Ordering::SeqCst) {
                break;
            }

            let delay = jittered(backoff.next_delay());
            warn!(?delay, "reconnecting activity websocket");
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&self) -> Result<()> {
        let request = WS_URL.into_client_request().context("building websocket request")?;
        let config = WebSocketConfig {
            max_message_size: Some(16 * 1024 * 1024),
            max_frame_size: Some(4 * 1024 * 1024),
            ..Default::default()
        };

        let (stream, response) = connect_async_with_config(request, Some(config), false)
            .await
            .context("connecting to activity websocket")?;
        debug!(status = %response.status(), "activity websocket connected");

        let (mut write, mut read) = stream.split();

        for topic in ["activity/trades", "activity/orders_matched"] {
            let subscribe = serde_json::json!({ "action": "subscribe", "topic": topic });
            write
                .send(Message::Text(subscribe.to_string()))
                .await
                .with_context(|| format!("subscribing to {topic}"))?;
        }
        self.stats.set_connected(true);
        info!(targets = self.targets.len(), "subscribed to activity feed");

        let mut ping_tick = tokio::time::interval(PING_INTERVAL);
        ping_tick.tick().await; // first tick fires immediately

        loop {
            if self.destroyed.load(Ordering::SeqCst) {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }

            tokio::select! {
                _ = ping_tick.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        return Ok(());
                    }
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.stats.bump_messages();
                            self.handle_message(&text).await;
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "server closed activity websocket");
                            self.stats.set_connected(false);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.stats.set_connected(false);
                            return Err(e).context("reading from activity websocket");
                        }
                        None => {
                            self.stats.set_connected(false);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        let envelope: WsEnvelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "unparseable activity websocket frame");
                return;
            }
        };
        if envelope.topic != "activity/trades" && envelope.topic != "activity/orders_matched" {
            return;
        }
        if envelope.msg_type.eq_ignore_ascii_case("ack") || envelope.msg_type.eq_ignore_ascii_case("subscribed") {
            return;
        }

        let payload: WsPayload = match serde_json::from_value(envelope.payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "unparseable activity payload");
                return;
            }
        };

        if !self.targets.iter().any(|t| t == &payload.proxy_wallet.to_lowercase()) {
            return;
        }

        let raw = crate::clients::clob::RawActivity {
            proxy_wallet: payload.proxy_wallet,
            transaction_hash: payload.transaction_hash,
            asset: payload.asset,
            condition_id: payload.condition_id,
            slug: payload.slug,
            event_slug: payload.event_slug,
            outcome: payload.outcome,
            outcome_index: payload.outcome_index,
            side: payload.side,
            price: payload.price,
            size: payload.size,
            timestamp: payload.timestamp,
            activity_type: "TRADE".to_string(),
        };

        match normalize(&raw) {
            Ok(event) => accept(event, &self.dedup, &self.tx, &self.stats).await,
            Err(reason) => debug!(?reason, "dropped unparseable activity event"),
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
    let scaled = delay.as_secs_f64() * (1.0 + jitter_frac);
    Duration::from_secs_f64(scaled.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_and_filters_unknown_topics() {
        let raw = r#"{"topic":"activity/other","type":"event","payload":{}}"#;
        let envelope: WsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.topic, "activity/other");
    }

    #[test]
    fn jittered_delay_stays_within_twenty_percent() {
        let base = Duration::from_secs(10);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d.as_secs_f64() >= 7.9 && d.as_secs_f64() <= 12.1, "{d:?}");
        }
    }
}
