//! Lazy Cache
//!
//! The public cache handle. Hits are served from memory; misses go through the
//! loader, and concurrent misses for one key share a single loader call.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::cache::{CacheStats, Clock};
use crate::config::{CacheConfig, UsedItemPolicy};
use crate::error::{CacheError, Result};
use crate::loader::{
    erase_loader, share_load, IdentityFn, LoaderFn, PendingLoad, PinFn, SharedLoad,
};
use crate::state::CacheState;
use crate::tasks::spawn_sweep_task;

// == Lazy Cache ==
/// Loading cache in front of an asynchronous loader.
///
/// `Q` is the request key handed to the loader, `K` the cache key produced from
/// it by the identity function (by default `Q` itself), `V` the cached value.
/// Values are returned by clone; wrap large values in `Arc` to share them.
///
/// Cloning the handle is cheap and every clone sees the same entries. Once the
/// last handle is dropped the sweep task stops and late load results are
/// discarded.
///
/// All operations must run inside a tokio runtime.
pub struct LazyCache<Q, V, K = Q> {
    inner: Arc<Inner<Q, V, K>>,
}

struct Inner<Q, V, K> {
    state: Arc<RwLock<CacheState<K, V>>>,
    loader: LoaderFn<Q, V>,
    identity: IdentityFn<Q, K>,
    pin: Option<PinFn<V>>,
    clock: Clock,
    config: CacheConfig,
}

impl<Q, V, K> Clone for LazyCache<Q, V, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Q, V, K> fmt::Debug for LazyCache<Q, V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCache")
            .field("config", &self.inner.config)
            .field("pinning", &self.inner.pin.is_some())
            .finish()
    }
}

impl<Q, V> LazyCache<Q, V, Q>
where
    Q: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache with the default configuration and identity keys.
    pub fn new<F, Fut, E>(loader: F) -> Self
    where
        F: Fn(Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        CacheBuilder::new(loader).build_unchecked()
    }

    /// Starts configuring a cache around `loader`.
    pub fn builder<F, Fut, E>(loader: F) -> CacheBuilder<Q, V, Q>
    where
        F: Fn(Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        CacheBuilder::new(loader)
    }
}

impl<Q, V, K> LazyCache<Q, V, K>
where
    Q: Send + 'static,
    V: Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    // == Get ==
    /// Returns the value for `request`, loading it on a miss.
    ///
    /// A hit updates the entry's last use and never calls the loader. A miss
    /// joins the load already in flight for the same cache key, or starts one.
    /// Loader errors reach every waiting caller and nothing is stored.
    pub async fn get(&self, request: Q) -> Result<V> {
        let key = (self.inner.identity)(&request);

        let load = {
            let mut state = self.inner.state.write().await;
            if let Some(value) = state.store.touch(&key, self.inner.clock.now()) {
                trace!("Cache hit");
                return Ok(value);
            }

            match state.in_flight.get(&key).map(|pending| pending.future.clone()) {
                Some(future) => {
                    state.store.stats_mut().record_joined_load();
                    future
                }
                None => {
                    state.store.stats_mut().record_miss();
                    let id = state.next_load_id();
                    let future = self.inner.start_load(request, key.clone(), id);
                    state.in_flight.insert(
                        key,
                        PendingLoad {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        load.await
    }

    // == Get All ==
    /// Gets every request concurrently and returns the values in input order.
    ///
    /// The first failure fails the whole batch.
    pub async fn get_all<I>(&self, requests: I) -> Result<Vec<V>>
    where
        I: IntoIterator<Item = Q>,
    {
        try_join_all(requests.into_iter().map(|request| self.get(request))).await
    }

    // == Remove ==
    /// Drops the entry for `request` regardless of policy or pinning.
    ///
    /// A load in flight for the key is forgotten: its callers still get the
    /// result, but it is not stored. Returns true if an entry was removed.
    pub async fn remove(&self, request: &Q) -> bool {
        let key = (self.inner.identity)(request);
        let mut state = self.inner.state.write().await;

        if state.in_flight.remove(&key).is_some() {
            debug!("Forgot in-flight load for removed key");
        }
        state.store.erase(&key)
    }

    // == Clear ==
    /// Drops all entries and pending loads and stops the sweep.
    pub async fn clear(&self) {
        let mut state = self.inner.state.write().await;
        state.clear();
        debug!("Cache cleared");
    }

    /// True if `request` is cached. Does not count as a use.
    pub async fn contains(&self, request: &Q) -> bool {
        let key = (self.inner.identity)(request);
        self.inner.state.read().await.store.peek(&key).is_some()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.inner.state.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.state.read().await.store.is_empty()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.inner.state.read().await.stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

impl<Q, V, K> Inner<Q, V, K>
where
    Q: Send + 'static,
    V: Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Spawns the loader call for `key` so it completes even if every caller
    /// stops waiting.
    fn start_load(self: &Arc<Self>, request: Q, key: K, id: u64) -> SharedLoad<V> {
        debug!("Cache miss, starting load {}", id);
        let load = (self.loader)(request);
        let cache = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let outcome = load.await.map_err(CacheError::from);
            if let Some(inner) = cache.upgrade() {
                inner.finish_load(key, id, &outcome).await;
            }
            outcome
        });

        share_load(handle)
    }

    /// Stores a load's result, unless `remove` or `clear` superseded it.
    async fn finish_load(self: &Arc<Self>, key: K, id: u64, outcome: &Result<V>) {
        let mut state = self.state.write().await;
        if !state.is_current_load(&key, id) {
            debug!("Load {} was superseded, result not stored", id);
            return;
        }
        state.in_flight.remove(&key);

        match outcome {
            Ok(value) => {
                let pinned = self.pin.as_ref().is_some_and(|pin| pin(value));
                state.store.put(key, value.clone(), pinned, self.clock.now());
                debug!("Load {} stored (pinned: {})", id, pinned);

                let cache = Arc::downgrade(&self.state);
                let clock = self.clock;
                let interval = self.config.check_interval();
                if state.scheduler.arm(|generation| {
                    spawn_sweep_task(cache, clock, generation, interval)
                }) {
                    debug!("Sweep scheduler armed");
                }
            }
            Err(err) => {
                state.store.stats_mut().record_load_failure();
                warn!("Load {} failed: {}", id, err);
            }
        }
    }
}

// == Cache Builder ==
/// Configures a [`LazyCache`] before it is built.
pub struct CacheBuilder<Q, V, K> {
    loader: LoaderFn<Q, V>,
    identity: IdentityFn<Q, K>,
    pin: Option<PinFn<V>>,
    config: CacheConfig,
}

impl<Q, V> CacheBuilder<Q, V, Q>
where
    Q: Clone + 'static,
    V: Send + 'static,
{
    /// Starts a builder with the default configuration and identity keys.
    pub fn new<F, Fut, E>(loader: F) -> Self
    where
        F: Fn(Q) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self {
            loader: erase_loader(loader),
            identity: Arc::new(|request: &Q| request.clone()),
            pin: None,
            config: CacheConfig::default(),
        }
    }
}

impl<Q, V, K> CacheBuilder<Q, V, K> {
    /// Maps request keys to cache keys. Requests mapping to the same cache key
    /// share one entry.
    pub fn identity<K2, F>(self, identity: F) -> CacheBuilder<Q, V, K2>
    where
        F: Fn(&Q) -> K2 + Send + Sync + 'static,
    {
        CacheBuilder {
            loader: self.loader,
            identity: Arc::new(identity),
            pin: self.pin,
            config: self.config,
        }
    }

    /// Replaces every scalar setting at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn remove_interval(mut self, interval: Duration) -> Self {
        self.config.remove_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn used_item_policy(mut self, policy: UsedItemPolicy) -> Self {
        self.config.used_item_policy = policy;
        self
    }

    /// Pins values matching `pin` so the sweep never evicts them. Evaluated
    /// once, when a value is stored.
    pub fn pin_when<F>(mut self, pin: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.pin = Some(Arc::new(pin));
        self
    }

    // == Build ==
    /// Validates the configuration and creates the cache.
    pub fn build(self) -> Result<LazyCache<Q, V, K>>
    where
        K: Hash + Eq + Clone,
        V: Clone,
    {
        self.config.validate()?;
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> LazyCache<Q, V, K>
    where
        K: Hash + Eq + Clone,
        V: Clone,
    {
        debug!(
            "Building cache: check_interval={}ms, remove_interval={}ms, used_item_policy={}",
            self.config.check_interval_ms,
            self.config.remove_interval_ms,
            self.config.used_item_policy
        );
        LazyCache {
            inner: Arc::new(Inner {
                state: Arc::new(RwLock::new(CacheState::new(&self.config))),
                loader: self.loader,
                identity: self.identity,
                pin: self.pin,
                clock: Clock::new(),
                config: self.config,
            }),
        }
    }
}

impl<Q, V, K> fmt::Debug for CacheBuilder<Q, V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("pinning", &self.pin.is_some())
            .finish()
    }
}
