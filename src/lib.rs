//! imcache - A lazy-loading in-memory cache
//!
//! Sits in front of an asynchronous loader, serves loaded values from memory,
//! and expires entries that were not requested within a configurable window.
//! Expiry walks coarse time buckets instead of the whole key space.
//!
//! # Example
//! ```ignore
//! let cache = LazyCache::builder(|id: u64| async move { fetch_user(id).await })
//!     .remove_interval(Duration::from_secs(30))
//!     .used_item_policy(UsedItemPolicy::Keep)
//!     .build()?;
//!
//! let user = cache.get(42).await?;
//! let users = cache.get_all([1, 2, 3]).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
mod lazy;
mod loader;
mod state;
pub mod tasks;

pub use cache::CacheStats;
pub use config::{CacheConfig, UsedItemPolicy};
pub use error::{CacheError, Result};
pub use lazy::{CacheBuilder, LazyCache};
pub use loader::LoadFuture;
