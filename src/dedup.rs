//! Dedup Store (C1): the correctness boundary for "copy each trade exactly
//! once" given at-least-once delivery upstream.

use crate::models::TargetWallet;
use crate::store::{self, DebouncedWriter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Most-recent IDs kept per target before we drop the oldest half.
const PER_TARGET_CAP: usize = 500;

#[derive(Default, Serialize, Deserialize)]
struct DedupDocument {
    /// target -> ordered (oldest-first) trade ids seen.
    seen: HashMap<String, VecDeque<String>>,
}

struct Inner {
    seen: HashMap<String, VecDeque<String>>,
}

pub struct DedupStore {
    inner: RwLock<Inner>,
    writer: RwLock<Option<DebouncedWriter>>,
    path: RwLock<Option<PathBuf>>,
}

impl DedupStore {
    /// In-memory only; used by tests and dry runs of sub-components.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                seen: HashMap::new(),
            }),
            writer: RwLock::new(None),
            path: RwLock::new(None),
        }
    }

    /// Loads `dedup.json` (best-effort; a corrupt or missing file starts
    /// empty, relying on the ingester's age gate to prevent replay storms)
    /// and arms a debounced writer back to the same path.
    pub fn load(path: PathBuf) -> Arc<Self> {
        let doc: DedupDocument = store::read_json(&path);
        let store = Arc::new(Self {
            inner: RwLock::new(Inner { seen: doc.seen }),
            writer: RwLock::new(None),
            path: RwLock::new(Some(path.clone())),
        });

        let snapshot_store = store.clone();
        let writer = DebouncedWriter::spawn(path, Duration::from_millis(500), move || {
            let guard = snapshot_store.inner.read();
            serde_json::to_value(DedupDocument {
                seen: guard.seen.clone(),
            })
            .unwrap_or_default()
        });
        *store.writer.write() = Some(writer);
        store
    }

    pub fn has_seen(&self, target: &TargetWallet, trade_id: &str) -> bool {
        self.inner
            .read()
            .seen
            .get(&target.0)
            .map(|ids| ids.iter().any(|id| id == trade_id))
            .unwrap_or(false)
    }

    pub fn mark_seen(&self, target: &TargetWallet, trade_id: &str) {
        let mut inner = self.inner.write();
        let ids = inner.seen.entry(target.0.clone()).or_insert_with(VecDeque::new);
        if ids.iter().any(|id| id == trade_id) {
            return;
        }
        ids.push_back(trade_id.to_string());
        if ids.len() > PER_TARGET_CAP {
            // Drop the oldest half in one step to amortize the cost.
            let drop_count = ids.len() / 2;
            for _ in 0..drop_count {
                ids.pop_front();
            }
        }
        drop(inner);
        if let Some(w) = self.writer.read().as_ref() {
            w.mark_dirty();
        }
    }

    /// Synchronous write-through, used by the supervisor's shutdown path so
    /// the last few seconds of dedup state aren't lost to the debounce window.
    pub fn flush_now(&self) {
        let Some(path) = self.path.read().clone() else { return };
        let doc = DedupDocument { seen: self.inner.read().seen.clone() };
        let _ = store::write_json_atomic(&path, &doc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> TargetWallet {
        TargetWallet::new("0xTargetAddress")
    }

    #[test]
    fn fresh_store_has_not_seen_anything() {
        let store = DedupStore::in_memory();
        assert!(!store.has_seen(&wallet(), "tx1"));
    }

    #[test]
    fn marking_seen_is_idempotent_and_observable() {
        let store = DedupStore::in_memory();
        store.mark_seen(&wallet(), "tx1");
        assert!(store.has_seen(&wallet(), "tx1"));
        store.mark_seen(&wallet(), "tx1");
        assert!(store.has_seen(&wallet(), "tx1"));
        assert!(!store.has_seen(&wallet(), "tx2"));
    }

    #[test]
    fn overflow_drops_oldest_half_not_everything() {
        let store = DedupStore::in_memory();
        let w = wallet();
        for i in 0..(PER_TARGET_CAP + 50) {
            store.mark_seen(&w, &format!("tx{i}"));
        }
        // The most recent id must still be considered seen.
        assert!(store.has_seen(&w, &format!("tx{}", PER_TARGET_CAP + 49)));
        // Very old ids should have been evicted.
        assert!(!store.has_seen(&w, "tx0"));
    }

    #[tokio::test]
    async fn persists_and_reloads_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.json");

        let store = DedupStore::load(path.clone());
        store.mark_seen(&wallet(), "tx1");
        tokio::time::sleep(Duration::from_millis(700)).await;

        let reloaded = DedupStore::load(path);
        assert!(reloaded.has_seen(&wallet(), "tx1"));
    }
}
