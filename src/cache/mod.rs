//! Read-side caches (C2, C3). Each is local to its owning component and
//! never shared outside this module; callers get `None` on a cold or stale
//! entry and are expected to refetch.

pub mod market_params;
pub mod metadata;

pub use market_params::{MarketParams, MarketParamsCache};
pub use metadata::{MarketDescriptor, MetadataCache};

use std::time::{Duration, Instant};

/// A cached value stamped with the instant it was fetched. Freshness is
/// judged relative to a TTL supplied by the cache, not stored per-entry, so
/// the same cache can be re-tuned without touching already-inserted rows.
struct TtlEntry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> TtlEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}
