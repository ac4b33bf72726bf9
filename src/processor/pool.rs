//! Parallel map-reduce over processing tasks
//!
//! ## Table of Contents
//! - **TaskManager**: Trait for the parallel map primitive
//! - **RayonTaskManager**: Bounded rayon thread pool
//! - **SequentialTaskManager**: In-order execution on the calling thread
//! - **TaskStats**: Counters kept by the rayon pool

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::debug;

use crate::config::ProcessorConfig;
use crate::error::Result;

/// Parallel map primitive
///
/// `task` runs once per item, `merge` folds partial results together. The
/// order in which partial results are merged is unspecified, so `merge` must
/// be associative and commutative, with `A::default()` as identity.
pub trait TaskManager: Send + Sync {
    /// Apply `task` to every item and reduce the results with `merge`
    fn map_reduce<T, A, F, M>(&self, tasks: Vec<T>, task: F, merge: M) -> Result<A>
    where
        T: Send,
        A: Default + Send,
        F: Fn(T) -> Result<A> + Send + Sync,
        M: Fn(A, A) -> A + Send + Sync;
}

/// Statistics of a task manager
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    /// Number of map-reduce calls
    pub batches: u64,
    /// Number of tasks submitted
    pub tasks: u64,
    /// Number of calls that failed
    pub failures: u64,
}

/// Task manager backed by a dedicated rayon thread pool
pub struct RayonTaskManager {
    pool: ThreadPool,
    stats: Arc<Mutex<TaskStats>>,
}

impl RayonTaskManager {
    /// Create a pool with `num_threads` workers (0 = one per CPU)
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("quake-worker-{}", i))
            .build()?;
        debug!(threads = pool.current_num_threads(), "Created worker pool");
        Ok(Self {
            pool,
            stats: Arc::new(Mutex::new(TaskStats::default())),
        })
    }

    /// Create a pool sized from the processor configuration
    pub fn from_config(config: &ProcessorConfig) -> Result<Self> {
        Self::new(config.num_workers)
    }

    /// Number of worker threads
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get current statistics
    pub fn stats(&self) -> TaskStats {
        self.stats.lock().clone()
    }
}

impl TaskManager for RayonTaskManager {
    fn map_reduce<T, A, F, M>(&self, tasks: Vec<T>, task: F, merge: M) -> Result<A>
    where
        T: Send,
        A: Default + Send,
        F: Fn(T) -> Result<A> + Send + Sync,
        M: Fn(A, A) -> A + Send + Sync,
    {
        let num_tasks = tasks.len() as u64;
        let result = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|t| task(t))
                .try_reduce(A::default, |a, b| Ok(merge(a, b)))
        });

        let mut stats = self.stats.lock();
        stats.batches += 1;
        stats.tasks += num_tasks;
        if result.is_err() {
            stats.failures += 1;
        }
        result
    }
}

impl std::fmt::Debug for RayonTaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonTaskManager")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

/// Task manager running every task on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialTaskManager;

impl TaskManager for SequentialTaskManager {
    fn map_reduce<T, A, F, M>(&self, tasks: Vec<T>, task: F, merge: M) -> Result<A>
    where
        T: Send,
        A: Default + Send,
        F: Fn(T) -> Result<A> + Send + Sync,
        M: Fn(A, A) -> A + Send + Sync,
    {
        tasks
            .into_iter()
            .try_fold(A::default(), |acc, t| Ok(merge(acc, task(t)?)))
    }
}
