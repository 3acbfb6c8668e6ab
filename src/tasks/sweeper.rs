//! Sweep Scheduler
//!
//! Background task that periodically expires cache entries. It is armed when a
//! value is stored into an idle cache and goes idle again once a sweep leaves
//! the cache empty.

use std::hash::Hash;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Clock;
use crate::state::CacheState;

// == Scheduler State ==
/// Whether a sweep task currently exists.
#[derive(Debug)]
pub enum SchedulerState {
    /// No sweep is scheduled
    Idle,
    /// A sweep task is running; `generation` identifies it
    Armed {
        generation: u64,
        handle: JoinHandle<()>,
    },
}

// == Scheduler ==
/// Owns the single sweep task of a cache.
///
/// At most one task is armed at a time. A task keeps sweeping only while its
/// generation is the armed one, so a task that outlives `disarm` cannot touch
/// the cache again.
#[derive(Debug)]
pub struct Scheduler {
    state: SchedulerState,
    next_generation: u64,
}

impl Scheduler {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            next_generation: 0,
        }
    }

    /// True while a sweep task is scheduled.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, SchedulerState::Armed { .. })
    }

    /// True if `generation` belongs to the armed task.
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(self.state, SchedulerState::Armed { generation: armed, .. } if armed == generation)
    }

    // == Arm ==
    /// Idle -> Armed. Calls `spawn` with a fresh generation only when idle.
    ///
    /// Returns true if a task was spawned.
    pub fn arm<F>(&mut self, spawn: F) -> bool
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        if self.is_armed() {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.state = SchedulerState::Armed {
            generation,
            handle: spawn(generation),
        };
        true
    }

    // == Disarm ==
    /// Armed -> Idle, aborting the task. Returns true if a task was armed.
    pub fn disarm(&mut self) -> bool {
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Armed { handle, .. } => {
                handle.abort();
                true
            }
            SchedulerState::Idle => false,
        }
    }

    /// Armed -> Idle from inside the task itself, once it has nothing left to do.
    pub(crate) fn settle(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.state = SchedulerState::Idle;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Spawns the sweep task for one scheduler generation.
///
/// The task sleeps for `check_interval`, sweeps, and repeats until the cache is
/// empty, the cache is dropped, or its generation is disarmed. It only holds a
/// weak reference to the cache state.
pub(crate) fn spawn_sweep_task<K, V>(
    cache: Weak<RwLock<CacheState<K, V>>>,
    clock: Clock,
    generation: u64,
    check_interval: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        debug!(
            "Sweep task {} armed with interval of {:?}",
            generation, check_interval
        );

        loop {
            tokio::time::sleep(check_interval).await;

            let Some(state) = cache.upgrade() else {
                debug!("Cache dropped, sweep task {} exiting", generation);
                break;
            };
            let mut guard = state.write().await;
            if !guard.scheduler.is_current(generation) {
                debug!("Sweep task {} superseded, exiting", generation);
                break;
            }

            let report = guard.store.sweep(clock.now());
            if report.evicted > 0 || report.refreshed > 0 {
                info!(
                    "Sweep: evicted {} and refreshed {} entries across {} buckets",
                    report.evicted, report.refreshed, report.buckets_scanned
                );
            } else {
                debug!(
                    "Sweep: nothing expired across {} buckets",
                    report.buckets_scanned
                );
            }

            if guard.store.is_empty() {
                guard.scheduler.settle(generation);
                debug!("Cache empty, sweep scheduler idle");
                break;
            }
        }
    })
}
