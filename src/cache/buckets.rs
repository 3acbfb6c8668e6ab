//! Time Bucket Index
//!
//! Groups entry membership records by the time window they were loaded in, so
//! the sweep only visits windows old enough to hold expired entries.

use std::collections::BTreeMap;

use crate::cache::Timestamp;

// == Membership ==
/// Records that `key` was loaded (or refreshed) at `loaded_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership<K> {
    pub key: K,
    pub loaded_at: Timestamp,
}

/// Whether a membership record still describes its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// The entry's current load time matches the record
    Live,
    /// The entry was refreshed, reloaded or removed since
    Stale,
}

impl<K> Membership<K> {
    /// Compares the record against the entry's current load time, if any.
    pub fn state(&self, current: Option<Timestamp>) -> RecordState {
        match current {
            Some(loaded_at) if loaded_at == self.loaded_at => RecordState::Live,
            _ => RecordState::Stale,
        }
    }
}

// == Bucket Index ==
/// Ordered map from time bucket to the records loaded during it.
///
/// Records are never removed individually. Superseded records stay in place until
/// the sweep processes their bucket.
#[derive(Debug)]
pub struct BucketIndex<K> {
    buckets: BTreeMap<u64, Vec<Membership<K>>>,
}

impl<K> BucketIndex<K> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    // == Insert ==
    /// Appends a record to `bucket`, creating the bucket if needed.
    pub fn insert(&mut self, bucket: u64, key: K, loaded_at: Timestamp) {
        self.buckets
            .entry(bucket)
            .or_default()
            .push(Membership { key, loaded_at });
    }

    // == Aged ==
    /// Returns bucket numbers strictly older than `current`, oldest first.
    pub fn aged(&self, current: u64) -> Vec<u64> {
        self.buckets.range(..current).map(|(bucket, _)| *bucket).collect()
    }

    // == Take ==
    /// Detaches a bucket's records for processing.
    pub fn take(&mut self, bucket: u64) -> Option<Vec<Membership<K>>> {
        self.buckets.remove(&bucket)
    }

    // == Restore ==
    /// Puts back the records a bucket must keep. Empty lists are dropped.
    pub fn restore(&mut self, bucket: u64, records: Vec<Membership<K>>) {
        if records.is_empty() {
            return;
        }
        self.buckets.entry(bucket).or_default().extend(records);
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Number of buckets currently held.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Iterates over every record with its bucket number.
    #[cfg(test)]
    pub(crate) fn records(&self) -> impl Iterator<Item = (u64, &Membership<K>)> {
        self.buckets
            .iter()
            .flat_map(|(bucket, records)| records.iter().map(move |r| (*bucket, r)))
    }
}

impl<K> Default for BucketIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
