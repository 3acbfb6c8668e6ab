//! Background Tasks Module
//!
//! Contains the background task that expires entries while the cache holds any.
//!
//! # Tasks
//! - Sweep: walks aged time buckets every check interval, stops when the cache empties

mod sweeper;

pub use sweeper::{Scheduler, SchedulerState};
pub(crate) use sweeper::spawn_sweep_task;
