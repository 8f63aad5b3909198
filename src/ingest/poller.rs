//! HTTP half of the Activity Ingester (C7): one polling loop per target
//! wallet, picking up the activity types the real-time feed doesn't carry
//! (SPLIT, MERGE, REDEEM) and serving as the sole feed when the websocket
//! is down.

use super::normalize::normalize;
use super::{accept, IngesterStats};
use crate::clients::clob::ClobClient;
use crate::config::PollingConfig;
use crate::dedup::DedupStore;
use crate::models::ActivityEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct ActivityPoller {
    target: String,
    client: Arc<ClobClient>,
    dedup: Arc<DedupStore>,
    tx: mpsc::Sender<ActivityEvent>,
    stats: Arc<IngesterStats>,
    config: PollingConfig,
    stopped: Arc<AtomicBool>,
}

impl ActivityPoller {
    pub fn new(
        target: String,
        client: Arc<ClobClient>,
        dedup: Arc<DedupStore>,
        tx: mpsc::Sender<ActivityEvent>,
        stats: Arc<IngesterStats>,
        config: PollingConfig,
    ) -> Self {
        Self {
            target,
            client,
            dedup,
            tx,
            stats,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Cooperative loop on `pollingIntervalMs`, scaled by the client's
    /// shared throttle multiplier so a 429 anywhere on the activity feed
    /// (this poller, another target's poller, or the order-submission path)
    /// widens every poller's spacing together, and narrows it back down as
    /// the multiplier decays on success.
    pub async fn run(&self) {
        while !self.stopped.load(Ordering::SeqCst) {
            let multiplier = self.client.throttle().current_multiplier();
            let interval = Duration::from_millis(self.config.interval_ms).mul_f64(multiplier);
            tokio::time::sleep(interval).await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            match self.client.fetch_activity(&self.target, self.config.trade_limit).await {
                Ok(mut raws) => {
                    // API returns newest-first; downstream wants chronological order.
                    raws.reverse();
                    for raw in &raws {
                        match normalize(raw) {
                            Ok(event) => accept(event, &self.dedup, &self.tx, &self.stats).await,
                            Err(reason) => debug!(?reason, target = %self.target, "dropped unparseable poll event"),
                        }
                    }
                }
                Err(e) => {
                    warn!(target = %self.target, error = %e, "poll failed");
                }
            }
        }
    }
}
