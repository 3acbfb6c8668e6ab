//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// The type is `Clone` because a single load result is handed to every caller
/// waiting on the same key.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The loader returned an error for the requested key
    #[error("Loader failed: {0}")]
    Loader(Arc<anyhow::Error>),

    /// The spawned load task panicked or was cancelled
    #[error("Load aborted: {0}")]
    LoadAborted(String),

    /// Rejected cache configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    // == Loader Error ==
    /// Returns the loader's original error, if this is a loader failure.
    pub fn loader_error(&self) -> Option<&anyhow::Error> {
        match self {
            CacheError::Loader(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        CacheError::Loader(Arc::new(err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
