//! Parallel processing strategies

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Processing mode for per-zone work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

/// Strategy for executing index-addressed work units.
///
/// Results are always returned in index order, whatever the mode.
pub trait ParallelStrategy {
    /// Map a function over indices and collect results
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    /// Map a fallible function over indices, stopping at the first error
    fn try_par_map<T, E, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send;
}

#[cfg(feature = "parallel")]
impl ProcessingMode {
    /// Dedicated pool for `ParallelWith`; `None` means use the global pool
    /// (or run inline if the pool cannot be built).
    fn pool(&self) -> Option<rayon::ThreadPool> {
        match self {
            ProcessingMode::ParallelWith(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(*threads)
                .build()
                .ok(),
            _ => None,
        }
    }
}

#[cfg(feature = "parallel")]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(_) => match self.pool() {
                Some(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                None => range.map(f).collect(),
            },
        }
    }

    fn try_par_map<T, E, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.map(f).collect(),
            ProcessingMode::Parallel => range.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(_) => match self.pool() {
                Some(pool) => pool.install(|| range.into_par_iter().map(f).collect()),
                None => range.map(f).collect(),
            },
        }
    }
}

#[cfg(not(feature = "parallel"))]
impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        range.map(f).collect()
    }

    fn try_par_map<T, E, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Sync + Send,
    {
        range.map(f).collect()
    }
}

/// Get the number of available worker threads
#[cfg(feature = "parallel")]
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

#[cfg(not(feature = "parallel"))]
pub fn num_cpus() -> usize {
    1
}
