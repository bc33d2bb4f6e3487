//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of cache occupancy and lifetime counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Stored entries, expired ones included
    pub total_entries: usize,
    /// Stored entries already past their expiry
    pub expired_entries: usize,
    /// Stored entries still fresh
    pub valid_entries: usize,
    /// Keys with an operation currently registered
    pub in_flight: usize,
    /// Configured entry bound
    pub capacity: Option<usize>,
    /// Lookups answered from a fresh entry
    pub hits: u64,
    /// Lookups that found nothing fresh
    pub misses: u64,
    /// Callers that joined an operation already in flight
    pub coalesced: u64,
    /// Operations actually started
    pub computed: u64,
    /// Operations that settled with an error
    pub failures: u64,
    /// Stale entries dropped on read or by cleanup
    pub expirations: u64,
    /// Live entries dropped to respect `capacity`
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served without touching the source, joins included.
    pub fn hit_ratio(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = served + self.computed;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub computed: AtomicU64,
    pub failures: AtomicU64,
    pub expirations: AtomicU64,
    pub evictions: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.coalesced = self.coalesced.load(Ordering::Relaxed);
        stats.computed = self.computed.load(Ordering::Relaxed);
        stats.failures = self.failures.load(Ordering::Relaxed);
        stats.expirations = self.expirations.load(Ordering::Relaxed);
        stats.evictions = self.evictions.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio_empty() {
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio_counts_joins() {
        let stats = CacheStats {
            hits: 2,
            coalesced: 1,
            computed: 1,
            ..Default::default()
        };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_counters_fill() {
        let counters = Counters::default();
        Counters::bump(&counters.hits);
        Counters::bump(&counters.hits);
        Counters::add(&counters.expirations, 3);

        let mut stats = CacheStats::default();
        counters.fill(&mut stats);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.expirations, 3);
        assert_eq!(stats.misses, 0);
    }
}
