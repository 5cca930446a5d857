//! Eviction bookkeeping for endpoints retired from a proxy provider.
//!
//! A full traffic/connection tracker is an outer-tunnel concern; the
//! provider subsystem only needs a place to report names leaving a
//! provider's set so outer consumers (connection pools, UI) can reconcile.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks endpoints evicted from providers on replacement.
pub struct StatisticManager {
    /// Name -> number of times this name has been evicted.
    evictions: DashMap<String, u64>,
    eviction_total: AtomicU64,
}

impl StatisticManager {
    pub fn new() -> Self {
        StatisticManager {
            evictions: DashMap::new(),
            eviction_total: AtomicU64::new(0),
        }
    }

    /// Record that `name` left a provider's proxy set.
    pub fn kick_out(&self, name: &str) {
        *self.evictions.entry(name.to_string()).or_insert(0) += 1;
        self.eviction_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch of evicted names, as happens on a full `setProxies` replacement.
    pub fn kick_out_all<I: IntoIterator<Item = S>, S: AsRef<str>>(&self, names: I) {
        for name in names {
            self.kick_out(name.as_ref());
        }
    }

    pub fn eviction_count(&self, name: &str) -> u64 {
        self.evictions.get(name).map(|r| *r.value()).unwrap_or(0)
    }

    pub fn total_evictions(&self) -> u64 {
        self.eviction_total.load(Ordering::Relaxed)
    }
}

impl Default for StatisticManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kick_out_counts() {
        let mgr = StatisticManager::new();
        mgr.kick_out("node-a");
        mgr.kick_out("node-a");
        mgr.kick_out("node-b");

        assert_eq!(mgr.eviction_count("node-a"), 2);
        assert_eq!(mgr.eviction_count("node-b"), 1);
        assert_eq!(mgr.total_evictions(), 3);
    }

    #[test]
    fn test_kick_out_all() {
        let mgr = StatisticManager::new();
        mgr.kick_out_all(vec!["x", "y", "x"]);
        assert_eq!(mgr.eviction_count("x"), 2);
        assert_eq!(mgr.eviction_count("y"), 1);
    }
}
