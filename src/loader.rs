//! Loader Gateway
//!
//! Type-erased loader, identity and pin hooks, and the shared future that lets
//! concurrent misses for one key wait on a single loader call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{CacheError, Result};

/// Future returned by a type-erased loader.
pub type LoadFuture<V> = BoxFuture<'static, anyhow::Result<V>>;

pub(crate) type LoaderFn<Q, V> = Arc<dyn Fn(Q) -> LoadFuture<V> + Send + Sync>;
pub(crate) type IdentityFn<Q, K> = Arc<dyn Fn(&Q) -> K + Send + Sync>;
pub(crate) type PinFn<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Load result shared by every caller waiting on the same key.
pub(crate) type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

// == Pending Load ==
/// A load registered for a cache key.
///
/// `id` tells a completing load whether it is still the registered one, or was
/// superseded by `remove` or `clear` while the loader was running.
pub(crate) struct PendingLoad<V> {
    pub(crate) id: u64,
    pub(crate) future: SharedLoad<V>,
}

impl<V> fmt::Debug for PendingLoad<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLoad").field("id", &self.id).finish()
    }
}

/// Erases a loader's concrete future and error types.
pub(crate) fn erase_loader<Q, V, F, Fut, E>(loader: F) -> LoaderFn<Q, V>
where
    Q: 'static,
    V: Send + 'static,
    F: Fn(Q) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    Arc::new(move |request: Q| -> LoadFuture<V> {
        let load = loader(request);
        async move { load.await.map_err(Into::into) }.boxed()
    })
}

/// Turns a spawned load task into a future any number of callers can await.
///
/// A panicking or cancelled task surfaces as `CacheError::LoadAborted`.
pub(crate) fn share_load<V>(handle: JoinHandle<Result<V>>) -> SharedLoad<V>
where
    V: Clone + Send + Sync + 'static,
{
    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Load task aborted: {}", err);
                Err(CacheError::LoadAborted(err.to_string()))
            }
        }
    }
    .boxed()
    .shared()
}
