//! Cache Statistics Module
//!
//! Tracks cache activity: hits, loads, sweeps, and evictions.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache counters and current sizes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that started a loader call
    pub misses: u64,
    /// Reads that joined a load already in flight
    pub joined_loads: u64,
    /// Loader calls that failed
    pub load_failures: u64,
    /// Entries dropped by the sweep
    pub evictions: u64,
    /// Used entries the sweep kept for another window
    pub refreshes: u64,
    /// Entries dropped through `remove`
    pub removals: u64,
    /// Completed sweep runs
    pub sweeps: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Loads currently in flight
    pub pending_loads: usize,
    /// Time buckets currently indexed
    pub buckets: usize,
    /// Whether a sweep is currently scheduled
    pub sweep_scheduled: bool,
    /// Wall-clock time of the last sweep
    pub last_sweep_at: Option<DateTime<Utc>>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Joined loads count as misses. Returns 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.joined_loads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_joined_load(&mut self) {
        self.joined_loads += 1;
    }

    pub fn record_load_failure(&mut self) {
        self.load_failures += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    // == Record Sweep ==
    /// Adds one sweep's outcome to the counters.
    pub fn record_sweep(&mut self, evicted: usize, refreshed: usize) {
        self.sweeps += 1;
        self.evictions += evicted as u64;
        self.refreshes += refreshed as u64;
        self.last_sweep_at = Some(Utc::now());
    }
}
