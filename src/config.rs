//! Configuration Module
//!
//! Cache timing and eviction policy, loadable from environment variables or any
//! serde format.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default delay between sweeps, in milliseconds
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3_000;

/// Default bucket width and minimum retention, in milliseconds
pub const DEFAULT_REMOVE_INTERVAL_MS: u64 = 10_000;

// == Used Item Policy ==
/// What the sweep does with an expired entry that was read since it was loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsedItemPolicy {
    /// Evict it like any other expired entry
    #[default]
    Remove,
    /// Refresh its timestamps and keep it for another window
    Keep,
}

impl From<bool> for UsedItemPolicy {
    /// Maps a `keep_used_items` flag onto the policy.
    fn from(keep_used_items: bool) -> Self {
        if keep_used_items {
            UsedItemPolicy::Keep
        } else {
            UsedItemPolicy::Remove
        }
    }
}

impl FromStr for UsedItemPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remove" | "false" => Ok(UsedItemPolicy::Remove),
            "keep" | "true" => Ok(UsedItemPolicy::Keep),
            other => Err(CacheError::InvalidConfig(format!(
                "Unknown used item policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for UsedItemPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsedItemPolicy::Remove => f.write_str("remove"),
            UsedItemPolicy::Keep => f.write_str("keep"),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Delay between successive sweeps while the cache is non-empty
    pub check_interval_ms: u64,
    /// Bucket width and minimum retention since last load
    pub remove_interval_ms: u64,
    /// Whether used entries are refreshed instead of evicted
    pub used_item_policy: UsedItemPolicy,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `IMCACHE_CHECK_INTERVAL_MS` - Sweep interval (default: 3000)
    /// - `IMCACHE_REMOVE_INTERVAL_MS` - Bucket width (default: 10000)
    /// - `IMCACHE_USED_ITEM_POLICY` - `remove` or `keep` (default: remove)
    pub fn from_env() -> Self {
        Self {
            check_interval_ms: env::var("IMCACHE_CHECK_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CHECK_INTERVAL_MS),
            remove_interval_ms: env::var("IMCACHE_REMOVE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REMOVE_INTERVAL_MS),
            used_item_policy: env::var("IMCACHE_USED_ITEM_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Sweep interval as a Duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Bucket width as a Duration.
    pub fn remove_interval(&self) -> Duration {
        Duration::from_millis(self.remove_interval_ms)
    }

    /// Rejects intervals the sweep cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "check_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.remove_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "remove_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            remove_interval_ms: DEFAULT_REMOVE_INTERVAL_MS,
            used_item_policy: UsedItemPolicy::Remove,
        }
    }
}
