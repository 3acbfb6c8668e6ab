//! Integration Tests for the Lazy Cache
//!
//! Drives the public API on a paused tokio clock so expiry timing is exact.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use imcache::{CacheConfig, CacheError, LazyCache, UsedItemPolicy};
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "imcache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Counts loader invocations across clones.
#[derive(Clone, Default)]
struct Calls(Arc<AtomicUsize>);

impl Calls {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cache with a 100ms window and 20ms sweeps whose loader answers immediately.
fn test_cache(policy: UsedItemPolicy, calls: &Calls) -> LazyCache<String, Arc<String>> {
    init_tracing();
    let calls = calls.clone();
    LazyCache::builder(move |key: String| {
        let calls = calls.clone();
        async move {
            calls.0.fetch_add(1, Ordering::SeqCst);
            if key.starts_with("bad") {
                anyhow::bail!("no value for {}", key);
            }
            Ok(Arc::new(format!("value-{}", key)))
        }
    })
    .check_interval(Duration::from_millis(20))
    .remove_interval(Duration::from_millis(100))
    .used_item_policy(policy)
    .build()
    .unwrap()
}

/// Like `test_cache`, but every load takes 50ms.
fn slow_cache(calls: &Calls) -> LazyCache<String, Arc<String>> {
    init_tracing();
    let calls = calls.clone();
    LazyCache::builder(move |key: String| {
        let calls = calls.clone();
        async move {
            calls.0.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(50)).await;
            if key.starts_with("bad") {
                anyhow::bail!("no value for {}", key);
            }
            Ok(Arc::new(format!("value-{}", key)))
        }
    })
    .check_interval(Duration::from_millis(20))
    .remove_interval(Duration::from_millis(100))
    .build()
    .unwrap()
}

fn key(s: &str) -> String {
    s.to_string()
}

// == Hits ==

#[tokio::test(start_paused = true)]
async fn test_hit_returns_same_value_without_reload() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);

    let first = assert_ok!(cache.get(key("k")).await);
    let second = assert_ok!(cache.get(key("k")).await);

    assert_eq!(*first, "value-k");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.count(), 1);
}

// == Expiry ==

#[tokio::test(start_paused = true)]
async fn test_remove_policy_evicts_after_window() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);
    cache.get(key("k")).await.unwrap();

    // Window of 100ms plus one sweep cycle
    sleep(Duration::from_millis(130)).await;
    assert!(!cache.contains(&key("k")).await);
    assert_eq!(cache.stats().await.evictions, 1);

    cache.get(key("k")).await.unwrap();
    assert_eq!(calls.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_remove_policy_evicts_used_entries() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);
    cache.get(key("k")).await.unwrap();

    sleep(Duration::from_millis(50)).await;
    cache.get(key("k")).await.unwrap();

    sleep(Duration::from_millis(100)).await;
    assert!(!cache.contains(&key("k")).await);
}

#[tokio::test(start_paused = true)]
async fn test_keep_policy_keeps_used_entries() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Keep, &calls);
    cache.get(key("used")).await.unwrap();
    cache.get(key("idle")).await.unwrap();

    sleep(Duration::from_millis(50)).await;
    cache.get(key("used")).await.unwrap();

    // Past the original window: the used entry was refreshed, the idle one evicted
    sleep(Duration::from_millis(100)).await;
    assert!(cache.contains(&key("used")).await);
    assert!(!cache.contains(&key("idle")).await);

    cache.get(key("used")).await.unwrap();
    assert_eq!(calls.count(), 2);

    let stats = cache.stats().await;
    assert_eq!(stats.refreshes, 1);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_keep_policy_evicts_once_reads_stop() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Keep, &calls);
    cache.get(key("k")).await.unwrap();

    sleep(Duration::from_millis(50)).await;
    cache.get(key("k")).await.unwrap();

    // Refreshed at 120ms, then unused for a full window
    sleep(Duration::from_millis(250)).await;
    assert!(!cache.contains(&key("k")).await);
}

// == Explicit Mutators ==

#[tokio::test(start_paused = true)]
async fn test_remove_forces_reload() {
    for policy in [UsedItemPolicy::Remove, UsedItemPolicy::Keep] {
        let calls = Calls::default();
        let cache = test_cache(policy, &calls);

        cache.get(key("k")).await.unwrap();
        cache.get(key("k")).await.unwrap();
        assert!(cache.remove(&key("k")).await);
        cache.get(key("k")).await.unwrap();

        assert_eq!(calls.count(), 2, "policy {}", policy);
    }
}

#[tokio::test(start_paused = true)]
async fn test_remove_absent_key_is_noop() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);

    assert!(!cache.remove(&key("missing")).await);
    cache.clear().await;
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_clear_resets_everything() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Keep, &calls);
    assert_ok!(cache.get_all(vec![key("a"), key("b"), key("c")]).await);
    assert_eq!(cache.len().await, 3);

    cache.clear().await;

    let stats = cache.stats().await;
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.buckets, 0);
    assert!(!stats.sweep_scheduled);

    // No sweep may run after clear
    sleep(Duration::from_millis(500)).await;
    assert_eq!(cache.stats().await.sweeps, 0);

    assert_ok!(cache.get_all(vec![key("a"), key("b"), key("c")]).await);
    assert_eq!(calls.count(), 6);
}

// == Batch Loads ==

#[tokio::test(start_paused = true)]
async fn test_get_all_preserves_input_order() {
    init_tracing();
    let cache = LazyCache::new(|key: &'static str| async move {
        let delay = match key {
            "a" => 30,
            "b" => 10,
            _ => 20,
        };
        sleep(Duration::from_millis(delay)).await;
        Ok::<_, anyhow::Error>(key.to_uppercase())
    });

    let values = assert_ok!(cache.get_all(["a", "b", "c"]).await);
    assert_eq!(values, vec!["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_get_all_fails_as_a_whole() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);

    let err = assert_err!(cache.get_all(vec![key("a"), key("bad"), key("c")]).await);
    assert!(matches!(err, CacheError::Loader(_)));
    assert!(!cache.contains(&key("bad")).await);
}

// == In-Flight Loads ==

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_load() {
    let calls = Calls::default();
    let cache = slow_cache(&calls);

    let (a, b, c) = tokio::join!(
        cache.get(key("k")),
        cache.get(key("k")),
        cache.get(key("k"))
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(calls.count(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));

    let stats = cache.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.joined_loads, 2);
    assert_eq!(stats.pending_loads, 0);
}

#[tokio::test(start_paused = true)]
async fn test_load_survives_dropped_caller() {
    let calls = Calls::default();
    let cache = slow_cache(&calls);

    // Give up on the load before the loader answers
    let abandoned = tokio::time::timeout(Duration::from_millis(10), cache.get(key("k"))).await;
    assert!(abandoned.is_err());
    assert_eq!(cache.stats().await.pending_loads, 1);

    sleep(Duration::from_millis(60)).await;
    assert!(cache.contains(&key("k")).await);
    assert_eq!(calls.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_during_load_discards_result() {
    let calls = Calls::default();
    let cache = slow_cache(&calls);

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(key("k")).await }
    });
    sleep(Duration::from_millis(10)).await;
    cache.remove(&key("k")).await;

    // The waiting caller still gets its value, but it is not cached
    let value = assert_ok!(pending.await.unwrap());
    assert_eq!(*value, "value-k");
    assert!(!cache.contains(&key("k")).await);

    cache.get(key("k")).await.unwrap();
    assert_eq!(calls.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_load_discards_result() {
    let calls = Calls::default();
    let cache = slow_cache(&calls);

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(key("k")).await }
    });
    sleep(Duration::from_millis(10)).await;
    cache.clear().await;

    assert_ok!(pending.await.unwrap());
    assert!(cache.is_empty().await);
    assert!(!cache.stats().await.sweep_scheduled);
}

// == Failures ==

#[tokio::test(start_paused = true)]
async fn test_loader_failure_is_not_cached() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);

    let err = assert_err!(cache.get(key("bad")).await);
    assert_eq!(err.loader_error().unwrap().to_string(), "no value for bad");
    assert!(cache.is_empty().await);
    assert!(!cache.stats().await.sweep_scheduled);

    // No negative caching: the loader is asked again
    assert_err!(cache.get(key("bad")).await);
    assert_eq!(calls.count(), 2);
    assert_eq!(cache.stats().await.load_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_joined_callers_share_failure() {
    let calls = Calls::default();
    let cache = slow_cache(&calls);

    let (a, b) = tokio::join!(cache.get(key("bad")), cache.get(key("bad")));
    assert!(matches!(a, Err(CacheError::Loader(_))));
    assert!(matches!(b, Err(CacheError::Loader(_))));
    assert_eq!(calls.count(), 1);
}

// == Hooks ==

#[tokio::test(start_paused = true)]
async fn test_identity_normalizes_keys() {
    init_tracing();
    let calls = Calls::default();
    let counter = calls.clone();
    let cache = LazyCache::builder(move |key: String| {
        let counter = counter.clone();
        async move {
            counter.0.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(key)
        }
    })
    .identity(|key: &String| key.to_lowercase())
    .build()
    .unwrap();

    // The loader sees the first caller's spelling
    assert_eq!(cache.get(key("Key")).await.unwrap(), "Key");
    assert_eq!(cache.get(key("KEY")).await.unwrap(), "Key");
    assert_eq!(calls.count(), 1);

    assert!(cache.remove(&key("kEy")).await);
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_pinned_values_are_never_evicted() {
    init_tracing();
    let cache = LazyCache::builder(|key: String| async move { Ok::<_, anyhow::Error>(key) })
        .config(CacheConfig {
            check_interval_ms: 20,
            remove_interval_ms: 100,
            used_item_policy: UsedItemPolicy::Remove,
        })
        .pin_when(|value: &String| value.starts_with("pinned"))
        .build()
        .unwrap();

    cache.get(key("pinned-config")).await.unwrap();
    cache.get(key("plain")).await.unwrap();

    sleep(Duration::from_millis(1_000)).await;
    assert!(cache.contains(&key("pinned-config")).await);
    assert!(!cache.contains(&key("plain")).await);

    // Pins do not protect against explicit removal
    assert!(cache.remove(&key("pinned-config")).await);
}

// == Scheduler Lifecycle ==

#[tokio::test(start_paused = true)]
async fn test_scheduler_idles_when_empty() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);
    assert!(!cache.stats().await.sweep_scheduled);

    cache.get(key("k")).await.unwrap();
    assert!(cache.stats().await.sweep_scheduled);

    sleep(Duration::from_millis(130)).await;
    let stats = cache.stats().await;
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.buckets, 0);
    assert!(!stats.sweep_scheduled);

    // Nothing runs while the cache is empty
    let sweeps = stats.sweeps;
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(cache.stats().await.sweeps, sweeps);
    assert_eq!(calls.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_rearms_after_idle() {
    let calls = Calls::default();
    let cache = test_cache(UsedItemPolicy::Remove, &calls);
    cache.get(key("first")).await.unwrap();
    sleep(Duration::from_millis(130)).await;
    assert!(!cache.stats().await.sweep_scheduled);

    cache.get(key("second")).await.unwrap();
    assert!(cache.stats().await.sweep_scheduled);

    sleep(Duration::from_millis(130)).await;
    assert!(cache.is_empty().await);
}
