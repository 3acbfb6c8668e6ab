//! Shared cache state: the store, its sweep scheduler, and loads in flight.
//!
//! Everything here is guarded by the single lock owned by `LazyCache`.

use std::collections::HashMap;
use std::hash::Hash;

use crate::cache::{CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::loader::PendingLoad;
use crate::tasks::Scheduler;

#[derive(Debug)]
pub(crate) struct CacheState<K, V> {
    pub(crate) store: CacheStore<K, V>,
    pub(crate) scheduler: Scheduler,
    /// At most one pending load per cache key
    pub(crate) in_flight: HashMap<K, PendingLoad<V>>,
    next_load_id: u64,
}

impl<K, V> CacheState<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new(config: &CacheConfig) -> Self {
        Self {
            store: CacheStore::new(config.remove_interval_ms, config.used_item_policy),
            scheduler: Scheduler::new(),
            in_flight: HashMap::new(),
            next_load_id: 0,
        }
    }

    pub(crate) fn next_load_id(&mut self) -> u64 {
        let id = self.next_load_id;
        self.next_load_id += 1;
        id
    }

    /// True if `id` is still the registered load for `key`.
    pub(crate) fn is_current_load(&self, key: &K, id: u64) -> bool {
        self.in_flight.get(key).is_some_and(|pending| pending.id == id)
    }

    /// Forgets entries, buckets and pending loads, and stops the sweep.
    pub(crate) fn clear(&mut self) {
        self.store.clear();
        self.in_flight.clear();
        self.scheduler.disarm();
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let mut stats = self.store.stats();
        stats.pending_loads = self.in_flight.len();
        stats.sweep_scheduled = self.scheduler.is_armed();
        stats
    }
}
