//! Cache Store Module
//!
//! Entry table plus time bucket index, and the sweep that expires entries by
//! walking aged buckets instead of the whole table.

use std::collections::HashMap;
use std::hash::Hash;

use crate::cache::buckets::{Membership, RecordState};
use crate::cache::{bucket_of, BucketIndex, CacheEntry, CacheStats, Timestamp};
use crate::config::UsedItemPolicy;

// == Sweep Report ==
/// Outcome of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries evicted
    pub evicted: usize,
    /// Used entries refreshed into the current bucket
    pub refreshed: usize,
    /// Buckets inspected
    pub buckets_scanned: usize,
    /// Buckets dropped from the index
    pub buckets_dropped: usize,
}

/// What the sweep decided for one membership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Young,
    Superseded,
    Refresh,
    Pinned,
    Evict,
}

// == Cache Store ==
/// Main cache storage: entries keyed by cache key, indexed by load-time bucket.
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// Load-time bucket index
    buckets: BucketIndex<K>,
    /// Performance statistics
    stats: CacheStats,
    /// Bucket width and retention window in milliseconds
    remove_interval: u64,
    /// Treatment of expired entries that were read since loading
    policy: UsedItemPolicy,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `remove_interval` - Bucket width in milliseconds, must be non-zero
    /// * `policy` - What to do with expired entries that were used
    pub fn new(remove_interval: u64, policy: UsedItemPolicy) -> Self {
        debug_assert!(remove_interval > 0, "remove_interval must be non-zero");
        Self {
            entries: HashMap::new(),
            buckets: BucketIndex::new(),
            stats: CacheStats::new(),
            remove_interval,
            policy,
        }
    }

    // == Put ==
    /// Stores a freshly loaded value.
    ///
    /// Overwrites any existing entry and appends a record to the bucket for
    /// `now`. Returns true if the key was not present before.
    pub fn put(&mut self, key: K, value: V, pinned: bool, now: Timestamp) -> bool {
        let bucket = bucket_of(now, self.remove_interval);
        self.buckets.insert(bucket, key.clone(), now);
        self.entries
            .insert(key, CacheEntry::new(value, pinned, now))
            .is_none()
    }

    // == Touch ==
    /// Serves a hit: updates last use and returns a clone of the value.
    ///
    /// Load time and bucket membership are left alone. Records a hit in the
    /// stats when the key is present.
    pub fn touch(&mut self, key: &K, now: Timestamp) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        entry.last_used_at = now;
        self.stats.record_hit();
        Some(entry.value.clone())
    }

    // == Erase ==
    /// Removes an entry. Its bucket records are reconciled by the next sweep.
    pub fn erase(&mut self, key: &K) -> bool {
        if self.entries.remove(key).is_some() {
            self.stats.record_removal();
            true
        } else {
            false
        }
    }

    // == Clear ==
    /// Drops all entries and buckets. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }

    // == Sweep ==
    /// Expires entries from buckets strictly older than the current one.
    ///
    /// A bucket is dropped once none of its records is young or pinned. Buckets
    /// that must stay keep only those records.
    pub fn sweep(&mut self, now: Timestamp) -> SweepReport {
        let current = bucket_of(now, self.remove_interval);
        let mut report = SweepReport::default();

        for bucket in self.buckets.aged(current) {
            let Some(records) = self.buckets.take(bucket) else {
                continue;
            };
            report.buckets_scanned += 1;

            let mut retained = Vec::new();
            for record in records {
                match self.judge(&record, now) {
                    Verdict::Young | Verdict::Pinned => retained.push(record),
                    Verdict::Superseded => {}
                    Verdict::Refresh => {
                        if let Some(entry) = self.entries.get_mut(&record.key) {
                            entry.refresh(now);
                        }
                        self.buckets.insert(current, record.key, now);
                        report.refreshed += 1;
                    }
                    Verdict::Evict => {
                        self.entries.remove(&record.key);
                        report.evicted += 1;
                    }
                }
            }

            if retained.is_empty() {
                report.buckets_dropped += 1;
            } else {
                self.buckets.restore(bucket, retained);
            }
        }

        self.stats.record_sweep(report.evicted, report.refreshed);
        report
    }

    fn judge(&self, record: &Membership<K>, now: Timestamp) -> Verdict {
        if now.saturating_sub(record.loaded_at) <= self.remove_interval {
            return Verdict::Young;
        }

        let entry = match self.entries.get(&record.key) {
            Some(entry) if record.state(Some(entry.loaded_at)) == RecordState::Live => entry,
            _ => return Verdict::Superseded,
        };

        if self.policy == UsedItemPolicy::Keep && entry.was_used() {
            Verdict::Refresh
        } else if entry.pinned {
            Verdict::Pinned
        } else {
            Verdict::Evict
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.buckets = self.buckets.len();
        stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry stored under `key`, without touching it.
    pub fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Number of indexed time buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// True if some bucket holds a live record for `key`.
    #[cfg(test)]
    pub(crate) fn has_live_record(&self, key: &K) -> bool {
        let current = self.entries.get(key).map(|e| e.loaded_at);
        self.buckets
            .records()
            .any(|(_, r)| &r.key == key && r.state(current) == RecordState::Live)
    }

    /// Every key in the entry table.
    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn bucket_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.buckets.records().map(|(b, _)| b).collect();
        numbers.dedup();
        numbers
    }
}
