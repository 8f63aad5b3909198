//! Whole-file JSON persistence with debounced, atomic writes.
//!
//! A single serializing writer task coalesces multiple dirty markers into
//! one write; callers only mark dirty and enqueue. `DebouncedWriter<T>` is
//! the generic shape; each durable component (C1 dedup, C5 ledger, C11
//! snapshots) wraps it with its own document type.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Writes `value` to `path` as pretty-printed UTF-8 JSON (2-space indent),
/// via a temp-file-then-rename so a crash mid-write never corrupts the
/// previous copy.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .with_context(|| format!("serializing {}", path.display()))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &buf)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

pub fn read_json<T: for<'de> serde::Deserialize<'de> + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse persisted document, using default");
            T::default()
        }),
        Err(_) => T::default(),
    }
}

/// Coalesces repeated `mark_dirty()` calls into one write every `debounce`.
/// The caller supplies a snapshot function; the writer task calls it at most
/// once per debounce tick regardless of how many `mark_dirty` calls arrived
/// in between.
pub struct DebouncedWriter {
    tx: mpsc::Sender<()>,
}

impl DebouncedWriter {
    pub fn spawn<F>(path: PathBuf, debounce: Duration, snapshot: F) -> Self
    where
        F: Fn() -> serde_json::Value + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let snapshot = Arc::new(snapshot);
        tokio::spawn(async move {
            loop {
                if rx.recv().await.is_none() {
                    return;
                }
                tokio::time::sleep(debounce).await;
                // Drain any marks that piled up during the debounce sleep.
                while rx.try_recv().is_ok() {}
                let value = snapshot();
                if let Err(e) = write_json_atomic(&path, &value) {
                    warn!(path = %path.display(), error = %e, "debounced write failed, will retry on next dirty mark");
                } else {
                    debug!(path = %path.display(), "debounced write flushed");
                }
            }
        });
        Self { tx }
    }

    /// Non-blocking; if a write is already pending this is a no-op.
    pub fn mark_dirty(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Guards concurrent flush-on-drop semantics for components that want a
/// final synchronous write during `Supervisor::stop()`.
pub struct FlushGuard<T: Serialize + Send + 'static> {
    path: PathBuf,
    state: Arc<Mutex<T>>,
}

impl<T: Serialize + Send + 'static> FlushGuard<T> {
    pub fn new(path: PathBuf, state: Arc<Mutex<T>>) -> Self {
        Self { path, state }
    }

    pub async fn flush(&self) -> Result<()> {
        let guard = self.state.lock().await;
        write_json_atomic(&self.path, &*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, PartialEq, Debug)]
    struct Doc {
        n: u32,
    }

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { n: 7 }).unwrap();
        let loaded: Doc = read_json(&path);
        assert_eq!(loaded, Doc { n: 7 });
    }

    #[test]
    fn missing_file_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Doc = read_json(&path);
        assert_eq!(loaded, Doc::default());
    }

    #[tokio::test]
    async fn debounced_writer_coalesces_marks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debounced.json");
        let writer = DebouncedWriter::spawn(path.clone(), Duration::from_millis(20), || {
            serde_json::json!({"n": 1})
        });
        for _ in 0..5 {
            writer.mark_dirty();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        let loaded: serde_json::Value = read_json(&path);
        assert_eq!(loaded["n"], 1);
    }
}
