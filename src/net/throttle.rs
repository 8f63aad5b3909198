//! Global outbound throttle for the live executor: minimum spacing between
//! requests, per-key dedup so repeated identical requests don't pile up
//! concurrently, and an adaptive backoff multiplier that widens the spacing
//! on consecutive rate-limit responses and decays it back down on success.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

const MIN_MULTIPLIER: f64 = 1.0;
const MAX_MULTIPLIER: f64 = 8.0;

pub struct Throttle {
    min_spacing: Duration,
    last_request: AsyncMutex<Option<Instant>>,
    multiplier: RwLock<f64>,
    keylocks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Throttle {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_request: AsyncMutex::new(None),
            multiplier: RwLock::new(MIN_MULTIPLIER),
            keylocks: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Blocks until the spacing floor (scaled by the current backoff
    /// multiplier) has elapsed since the previous request.
    pub async fn acquire(&self) {
        let spacing = self.min_spacing.mul_f64(*self.multiplier.read());
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Serializes concurrent callers sharing the same dedup key (e.g. the
    /// same endpoint + token id) so an identical request isn't fired twice
    /// while one is already in flight.
    pub async fn key_guard(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.keylocks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn note_rate_limited(&self) {
        let mut m = self.multiplier.write();
        *m = (*m * 2.0).min(MAX_MULTIPLIER);
    }

    pub fn note_success(&self) {
        let mut m = self.multiplier.write();
        *m = (*m * 0.9).max(MIN_MULTIPLIER);
    }

    pub fn current_multiplier(&self) -> f64 {
        *self.multiplier.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_spaces_consecutive_calls() {
        let throttle = Throttle::new(Duration::from_millis(30));
        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn multiplier_doubles_and_caps_then_decays() {
        let throttle = Throttle::new(Duration::from_millis(10));
        for _ in 0..10 {
            throttle.note_rate_limited();
        }
        assert_eq!(throttle.current_multiplier(), MAX_MULTIPLIER);
        throttle.note_success();
        assert!(throttle.current_multiplier() < MAX_MULTIPLIER);
    }

    #[tokio::test]
    async fn key_guard_serializes_same_key_callers() {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(0)));
        let g = throttle.key_guard("tok-1").await;
        let t2 = throttle.clone();
        let handle = tokio::spawn(async move {
            let _g2 = t2.key_guard("tok-1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(g);
        handle.await.unwrap();
    }
}
