//! Cache Module
//!
//! Entry table, time bucket index, and the sweep that expires entries.

mod buckets;
mod entry;
mod stats;
mod store;


// Re-export public types
pub use buckets::{BucketIndex, Membership, RecordState};
pub use entry::{bucket_of, CacheEntry, Clock, Timestamp};
pub use stats::CacheStats;
pub use store::{CacheStore, SweepReport};
