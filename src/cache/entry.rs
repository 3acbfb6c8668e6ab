//! Cache Entry Module
//!
//! Defines individual cache entries and the millisecond clock their timestamps
//! are taken from.

use tokio::time::Instant;

/// Milliseconds elapsed since the owning cache's clock origin.
pub type Timestamp = u64;

// == Cache Entry ==
/// Represents a single cache entry with value and load/use metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the value was loaded, or last refreshed by the sweep
    pub loaded_at: Timestamp,
    /// When the value was last returned from the cache
    pub last_used_at: Timestamp,
    /// Pinned entries are never evicted by the sweep
    pub pinned: bool,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a freshly loaded entry.
    pub fn new(value: V, pinned: bool, now: Timestamp) -> Self {
        Self {
            value,
            loaded_at: now,
            last_used_at: now,
            pinned,
        }
    }

    // == Was Used ==
    /// True if the entry was read after it was loaded.
    pub fn was_used(&self) -> bool {
        self.last_used_at != self.loaded_at
    }

    // == Is Expired ==
    /// Checks whether more than `remove_interval` has passed since loading.
    pub fn is_expired(&self, now: Timestamp, remove_interval: u64) -> bool {
        now.saturating_sub(self.loaded_at) > remove_interval
    }

    // == Refresh ==
    /// Restarts the entry's retention window at `now`.
    pub fn refresh(&mut self, now: Timestamp) {
        self.loaded_at = now;
        self.last_used_at = now;
    }
}

// == Bucket Of ==
/// Returns the time bucket a timestamp falls into.
pub fn bucket_of(timestamp: Timestamp, remove_interval: u64) -> u64 {
    timestamp / remove_interval
}

// == Clock ==
/// Monotonic millisecond clock anchored at cache construction.
///
/// Backed by `tokio::time::Instant`, so paused test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Starts a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the current timestamp in milliseconds.
    pub fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
