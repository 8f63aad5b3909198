//! Supervisor (C12): owns every component's lifecycle. `start()` wires the
//! whole pipeline together in the order the mode/executor decisions must
//! happen in; `stop()` tears it down idempotently.

use crate::aggregate::AggregationBuffer;
use crate::cache::{MarketParamsCache, MetadataCache};
use crate::clients::clob::ClobClient;
use crate::config::{Config, ModeFlag};
use crate::dedup::DedupStore;
use crate::execution::{ExecutionAdapter, LiveExecutionAdapter, OrderContext, PaperExecutionAdapter};
use crate::ledger::PaperLedger;
use crate::mode::{self, ModeController};
use crate::models::{AccountConfig, ActivityEvent, ExecutionOutcome, Order};
use crate::net::Throttle;
use crate::pnl;
use crate::risk::RiskManager;
use crate::ingest;
use crate::snapshot::SnapshotRecorder;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const CHANNEL_CAPACITY: usize = 1024;
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(120);
const RESOLUTION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const MEMORY_REAP_INTERVAL: Duration = Duration::from_secs(120);
const THROTTLE_MIN_SPACING: Duration = Duration::from_millis(250);
const METADATA_TTL: Duration = Duration::from_secs(30);

/// Everything `/health` and `/stats` (C13) need to read without touching
/// the supervisor's internal task handles.
pub struct Supervisor {
    pub config: Config,
    pub mode: Arc<ModeController>,
    pub dedup: Arc<DedupStore>,
    pub metadata: Arc<MetadataCache>,
    pub params: Arc<MarketParamsCache>,
    pub ledger: Arc<PaperLedger>,
    pub snapshots: Arc<SnapshotRecorder>,
    pub ingester_stats: Arc<ingest::IngesterStats>,
    executor: Arc<dyn ExecutionAdapter>,
    risk: Arc<RiskManager>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    ws: std::sync::Mutex<Option<Arc<ingest::WebSocketIngester>>>,
    pollers: std::sync::Mutex<Vec<Arc<ingest::ActivityPoller>>>,
    running: AtomicBool,
}

impl Supervisor {
    /// `start()` sequence: load config → load state → resolve mode → init
    /// executor if LIVE (may fail hard) → install ingester → arm timers.
    pub async fn start() -> Result<Arc<Self>> {
        let data_dir = crate::config::data_dir();
        std::fs::create_dir_all(&data_dir).ok();
        let config = Config::load(&crate::config::config_path())?;

        let dedup = DedupStore::load(data_dir.join("dedup.json"));
        let ledger = PaperLedger::load(
            data_dir.join("paper-state.json"),
            config.paper_trading.starting_balance,
            config.paper_trading.fee_rate,
        );
        let metadata = Arc::new(MetadataCache::new(METADATA_TTL));
        let params = Arc::new(MarketParamsCache::new());
        let risk = Arc::new(RiskManager::new());
        let snapshots = Arc::new(SnapshotRecorder::new());
        let throttle = Arc::new(Throttle::new(THROTTLE_MIN_SPACING));
        let clob_client = Arc::new(ClobClient::new(throttle.clone()));

        let account = AccountConfig::from_env();
        let resolved_mode = mode::resolve(account.is_some(), config.risk.dry_run);
        let mode_controller = Arc::new(ModeController::new(resolved_mode));

        let executor: Arc<dyn ExecutionAdapter> = match resolved_mode {
            ModeFlag::Live => {
                let account = account
                    .ok_or_else(|| anyhow::anyhow!("LIVE mode resolved with no account credentials"))?;
                info!(account_id = %account.account_id, "starting in LIVE mode");
                Arc::new(LiveExecutionAdapter::new(
                    Arc::new(account),
                    params.clone(),
                    throttle.clone(),
                    config.trading.slippage,
                ))
            }
            ModeFlag::Paper | ModeFlag::DryRun => {
                info!(?resolved_mode, "starting in simulated mode");
                Arc::new(PaperExecutionAdapter::new(ledger.clone(), config.trading.slippage))
            }
        };

        let ingester_stats = Arc::new(ingest::IngesterStats::new(now_ms()));

        let supervisor = Arc::new(Self {
            config: config.clone(),
            mode: mode_controller,
            dedup,
            metadata,
            params,
            ledger,
            snapshots,
            ingester_stats,
            executor,
            risk,
            tasks: std::sync::Mutex::new(Vec::new()),
            ws: std::sync::Mutex::new(None),
            pollers: std::sync::Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        });

        supervisor.clone().install_ingester(clob_client, data_dir);
        supervisor.clone().arm_timers();

        if matches!(resolved_mode, ModeFlag::Live) {
            supervisor.mode.mark_live_ready();
        }

        Ok(supervisor)
    }

    fn install_ingester(self: Arc<Self>, clob_client: Arc<ClobClient>, data_dir: PathBuf) {
        let (raw_tx, raw_rx) = mpsc::channel::<ActivityEvent>(CHANNEL_CAPACITY);
        let (agg_tx, mut agg_rx) = mpsc::channel::<ActivityEvent>(CHANNEL_CAPACITY);

        let aggregator = AggregationBuffer::new(self.config.aggregation.window_ms);
        self.tasks.lock().unwrap().push(tokio::spawn(aggregator.run(raw_rx, agg_tx)));

        if self.config.targets.is_empty() {
            warn!("no target wallets configured; ingester is idle");
        }

        let ws = Arc::new(ingest::WebSocketIngester::new(
            self.config.targets.clone(),
            self.dedup.clone(),
            raw_tx.clone(),
            self.ingester_stats.clone(),
        ));
        *self.ws.lock().unwrap() = Some(ws.clone());
        let ws_handle = ws.clone();
        self.tasks.lock().unwrap().push(tokio::spawn(async move { ws_handle.run().await }));

        let mut pollers = self.pollers.lock().unwrap();
        for target in &self.config.targets {
            let poller = Arc::new(ingest::ActivityPoller::new(
                target.clone(),
                clob_client.clone(),
                self.dedup.clone(),
                raw_tx.clone(),
                self.ingester_stats.clone(),
                self.config.polling.clone(),
            ));
            pollers.push(poller.clone());
            self.tasks.lock().unwrap().push(tokio::spawn(async move { poller.run().await }));
        }
        drop(pollers);
        let _ = data_dir;

        let pipeline = self.clone();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            while let Some(event) = agg_rx.recv().await {
                pipeline.handle_event(event).await;
            }
        }));
    }

    async fn handle_event(&self, event: ActivityEvent) {
        let replica = match self.risk.evaluate(&event, &self.config.trading, &self.config.risk) {
            Ok(replica) => replica,
            Err(reason) => {
                info!(trade_id = %event.trade_id, ?reason, "skipped replica");
                return;
            }
        };

        let order = Order::new(event.token_id.clone(), event.side, replica.price, replica.shares);
        let ctx = OrderContext {
            condition_id: event.condition_id.clone(),
            outcome: event.outcome,
            target_wallet: Some(event.target_wallet.clone()),
            source_trade_id: Some(event.trade_id.clone()),
        };

        match self.executor.execute(order, ctx).await {
            ExecutionOutcome::Executed(fill) => {
                info!(order_id = %fill.order_id, price = fill.executed_price, size = fill.executed_size, "filled");
            }
            ExecutionOutcome::Skipped(reason) => {
                info!(trade_id = %event.trade_id, %reason, "execution skipped");
            }
            ExecutionOutcome::Failed(message) => {
                error!(trade_id = %event.trade_id, %message, "execution failed");
            }
        }
    }

    fn arm_timers(self: Arc<Self>) {
        let snapshot_self = self.clone();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
            loop {
                interval.tick().await;
                if !snapshot_self.running.load(Ordering::SeqCst) {
                    return;
                }
                snapshot_self.take_snapshot();
            }
        }));

        let resolution_self = self.clone();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESOLUTION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if !resolution_self.running.load(Ordering::SeqCst) {
                    return;
                }
                resolution_self.sweep_resolutions();
            }
        }));

        let reap_self = self.clone();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(MEMORY_REAP_INTERVAL);
            loop {
                interval.tick().await;
                if !reap_self.running.load(Ordering::SeqCst) {
                    return;
                }
                reap_self.reap_memory();
            }
        }));
    }

    fn take_snapshot(&self) {
        let trades = self.ledger.trades();
        let summary = pnl::summarize(&trades, self.ledger.current_balance(), self.ledger.starting_balance(), &self.metadata);
        self.snapshots.record(self.ledger.current_balance(), summary.realized_pnl, summary.unrealized_pnl);
    }

    /// Settles any open position whose market has resolved, per C5's
    /// `settlementPnl = shares · payout − totalCost`. Idempotent: a
    /// position with `settled = true` is skipped by the ledger's own
    /// bookkeeping once `sell` drives it to zero shares.
    fn sweep_resolutions(&self) {
        for position in self.ledger.positions() {
            let Some((resolved, payout)) = self.metadata.resolution(&position.token_id) else {
                continue;
            };
            if !resolved {
                continue;
            }
            let payout = payout.unwrap_or(0.0);
            if let Err(reason) = self.ledger.sell(&position.token_id, payout, position.shares, None, None) {
                warn!(token_id = %position.token_id, reason, "resolution settlement failed");
            }
        }
    }

    /// Memory reaper: trims dedup sets, trade log, and removes settled/flat
    /// positions from in-memory state.
    fn reap_memory(&self) {
        self.ledger.trim_positions();
    }

    /// `stop()` sequence: clear timers, dispose the websocket cleanly,
    /// flush pending state, clear caches. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(ws) = self.ws.lock().unwrap().take() {
            ws.stop();
        }
        for poller in self.pollers.lock().unwrap().drain(..) {
            poller.stop();
        }
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        self.dedup.flush_now();
        self.ledger.flush_now();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution_matches_account_presence() {
        assert_eq!(mode::resolve(false, false), ModeFlag::Paper);
        assert_eq!(mode::resolve(true, true), ModeFlag::Live);
    }
}
