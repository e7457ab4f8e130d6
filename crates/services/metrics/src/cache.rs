//! The read-through cache absorbing bursts from the external autoscaler's
//! own poll loop (spec §5(c) / §4.E caching clause).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// One memoized reading.
#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    fetched_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < self.ttl
    }
}

/// Caches readings keyed by `(policy id, metric name)`, each with its own
/// TTL so every policy's `min(pollingInterval, 30s)` bound is respected
/// independently.
#[derive(Default)]
pub struct ReadingCache {
    entries: RwLock<HashMap<(String, String), Entry>>,
}

impl ReadingCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A still-fresh cached reading for `(policy_id, metric_name)`, if any.
    #[must_use]
    pub fn get(&self, policy_id: &str, metric_name: &str) -> Option<f64> {
        let now = Instant::now();
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(&(policy_id.to_string(), metric_name.to_string()))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value)
    }

    /// Store a fresh reading, valid for `ttl` (already clamped to
    /// [`crate::config::MAX_CACHE_TTL`] by the caller).
    pub fn put(&self, policy_id: &str, metric_name: &str, value: f64, ttl: Duration) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                (policy_id.to_string(), metric_name.to_string()),
                Entry {
                    value,
                    fetched_at: Instant::now(),
                    ttl,
                },
            );
    }
}
