//! Snapshot Recorder (C11): periodic equity points for charting, kept
//! bounded by decimating old history rather than dropping it outright.
//!
//! Grounded on `store::DebouncedWriter`'s "accumulate, then reduce"
//! discipline, applied here to an in-memory time series instead of a
//! pending write.

use crate::models::Snapshot;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;

const MAX_POINTS: usize = 5040;
const DECIMATE_AFTER_HOURS: i64 = 12;
const DECIMATE_FACTOR: usize = 10;

pub struct SnapshotRecorder {
    history: RwLock<VecDeque<Snapshot>>,
}

impl SnapshotRecorder {
    pub fn new() -> Self {
        Self { history: RwLock::new(VecDeque::new()) }
    }

    pub fn record(&self, balance: f64, realized_pnl: f64, unrealized_pnl: f64) {
        let snapshot = Snapshot {
            timestamp: Utc::now(),
            balance,
            realized_pnl,
            unrealized_pnl,
            total_pnl: realized_pnl + unrealized_pnl,
        };
        let mut history = self.history.write();
        history.push_back(snapshot);
        Self::decimate(&mut history);
    }

    /// Points older than 12h are decimated 10:1 (keep every 10th, oldest
    /// first) so a long-running instance's history stays bounded without
    /// ever losing the shape of the curve. If that alone doesn't bring the
    /// series under the cap, the oldest remaining points are dropped.
    fn decimate(history: &mut VecDeque<Snapshot>) {
        let cutoff = Utc::now() - ChronoDuration::hours(DECIMATE_AFTER_HOURS);
        let split = history.partition_point(|s| s.timestamp < cutoff);

        if split > 0 {
            let old: Vec<Snapshot> = history.drain(..split).collect();
            let decimated: Vec<Snapshot> = old
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % DECIMATE_FACTOR == 0)
                .map(|(_, s)| s)
                .collect();
            for s in decimated.into_iter().rev() {
                history.push_front(s);
            }
        }

        while history.len() > MAX_POINTS {
            history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<Snapshot> {
        self.history.read().iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.history.read().back().copied()
    }
}

impl Default for SnapshotRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_and_latest_reflects_it() {
        let recorder = SnapshotRecorder::new();
        recorder.record(10_000.0, 0.0, 0.0);
        recorder.record(10_050.0, 50.0, 0.0);
        let latest = recorder.latest().unwrap();
        assert_eq!(latest.balance, 10_050.0);
        assert_eq!(recorder.history().len(), 2);
    }

    #[test]
    fn fresh_history_is_never_decimated() {
        let recorder = SnapshotRecorder::new();
        for i in 0..100 {
            recorder.record(10_000.0 + i as f64, 0.0, 0.0);
        }
        assert_eq!(recorder.history().len(), 100);
    }

    #[test]
    fn old_points_are_decimated_ten_to_one() {
        let mut history = VecDeque::new();
        let old_timestamp = Utc::now() - ChronoDuration::hours(13);
        for i in 0..50 {
            history.push_back(Snapshot {
                timestamp: old_timestamp,
                balance: i as f64,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                total_pnl: 0.0,
            });
        }
        SnapshotRecorder::decimate(&mut history);
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn decimation_alone_cannot_exceed_the_cap() {
        let mut history = VecDeque::new();
        let old_timestamp = Utc::now() - ChronoDuration::hours(13);
        for i in 0..(MAX_POINTS * 20) {
            history.push_back(Snapshot {
                timestamp: old_timestamp,
                balance: i as f64,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                total_pnl: 0.0,
            });
        }
        SnapshotRecorder::decimate(&mut history);
        assert!(history.len() <= MAX_POINTS);
    }
}
