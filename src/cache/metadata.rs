//! Metadata Cache (C2): market descriptors keyed by slug and by token id,
//! each entry carrying a freshness check on read rather than a per-entry
//! expiry timer.

use super::TtlEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Everything the engine needs to know about a market besides live order
/// flow: identity, per-token current price, and resolution/payout state.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDescriptor {
    pub condition_id: String,
    pub market_slug: String,
    pub token_ids: Vec<String>,
    /// token_id -> last known price in [0, 1].
    pub prices: HashMap<String, f64>,
    pub resolved: bool,
    /// token_id -> payout per share, populated once `resolved` is true.
    pub payouts: HashMap<String, f64>,
}

impl MarketDescriptor {
    pub fn price_for(&self, token_id: &str) -> Option<f64> {
        self.prices.get(token_id).copied()
    }
}

pub struct MetadataCache {
    by_slug: RwLock<HashMap<String, TtlEntry<MarketDescriptor>>>,
    by_token: RwLock<HashMap<String, TtlEntry<MarketDescriptor>>>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_slug: RwLock::new(HashMap::new()),
            by_token: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Inserts/replaces a descriptor under its slug and every token id it
    /// covers, so either key finds the same fresh data.
    pub fn put(&self, descriptor: MarketDescriptor) {
        let mut by_slug = self.by_slug.write();
        let mut by_token = self.by_token.write();
        for token_id in &descriptor.token_ids {
            by_token.insert(token_id.clone(), TtlEntry::new(descriptor.clone()));
        }
        by_slug.insert(descriptor.market_slug.clone(), TtlEntry::new(descriptor));
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<MarketDescriptor> {
        self.by_slug
            .read()
            .get(slug)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
    }

    pub fn get_by_token(&self, token_id: &str) -> Option<MarketDescriptor> {
        self.by_token
            .read()
            .get(token_id)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// Current price for a token, used by the P&L aggregator (C9) when
    /// marking open positions.
    pub fn current_price(&self, token_id: &str) -> Option<f64> {
        self.get_by_token(token_id)
            .and_then(|d| d.price_for(token_id))
    }

    /// `(resolved, payout_per_share)` consulted by the resolution sweep.
    pub fn resolution(&self, token_id: &str) -> Option<(bool, Option<f64>)> {
        self.get_by_token(token_id)
            .map(|d| (d.resolved, d.payouts.get(token_id).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> MarketDescriptor {
        MarketDescriptor {
            condition_id: "0xcond".into(),
            market_slug: "will-it-rain".into(),
            token_ids: vec!["tok-yes".into(), "tok-no".into()],
            prices: HashMap::from([("tok-yes".to_string(), 0.64), ("tok-no".to_string(), 0.36)]),
            resolved: false,
            payouts: HashMap::new(),
        }
    }

    #[test]
    fn put_is_readable_by_both_slug_and_token() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.put(descriptor());
        assert!(cache.get_by_slug("will-it-rain").is_some());
        assert_eq!(cache.current_price("tok-yes"), Some(0.64));
    }

    #[test]
    fn stale_entry_is_not_returned() {
        let cache = MetadataCache::new(Duration::from_millis(0));
        cache.put(descriptor());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_by_token("tok-yes").is_none());
    }

    #[test]
    fn unknown_token_reports_no_resolution() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        assert!(cache.resolution("tok-unknown").is_none());
    }
}
