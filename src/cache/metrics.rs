//! Cache Metrics Collection
//!
//! Lock-free counters describing how the read-through cache is being used.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,

    // Provider traffic
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    retries: AtomicU64,
    coalesced_waits: AtomicU64,

    // Background eviction
    evictions: AtomicU64,
    sweeps: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One provider call was issued
    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// A read-through ended in a provider failure
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller joined a fetch already in flight for its key
    pub fn record_coalesced_wait(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn coalesced_waits(&self) -> u64 {
        self.coalesced_waits.load(Ordering::Relaxed)
    }

    /// Get a point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            fetches: self.fetches(),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits(),
            evictions: self.evictions.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.fetches,
            &self.fetch_failures,
            &self.retries,
            &self.coalesced_waits,
            &self.evictions,
            &self.sweeps,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of cache metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub retries: u64,
    pub coalesced_waits: u64,
    pub evictions: u64,
    pub sweeps: u64,
}

impl MetricsSnapshot {
    /// Fraction of lookups served from the store
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = CacheMetrics::new();

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_fetch();
        metrics.record_evictions(3);
        metrics.record_sweep();

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.fetches, 1);
        assert_eq!(snap.evictions, 3);
        assert_eq!(snap.sweeps, 1);
    }

    #[test]
    fn test_hit_ratio() {
        assert_eq!(MetricsSnapshot::default().hit_ratio(), 0.0);

        let snap = MetricsSnapshot {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((snap.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_coalesced_wait();
        metrics.reset();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
