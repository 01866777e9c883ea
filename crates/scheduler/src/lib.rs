// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scheduler
//!
//! The process-wide worker pool that tensor kernels fan out on.
//!
//! Kernels ask [`should_parallelize`] whether a workload is large enough to
//! be worth splitting (`n ≥ 128 × W` by default, with `W > 1`). If it is,
//! they hand contiguous chunks to [`chunk_range`] and friends, which block
//! until every chunk has run. Otherwise they run inline.
//!
//! The global pool is built lazily from [`SchedulerConfig::default`] on
//! first use, or explicitly with [`init_global`] before any kernel runs.
//!
//! # Example
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let total = AtomicUsize::new(0);
//! scheduler::chunk_range(1000, |start, end| {
//!     total.fetch_add(end - start, Ordering::Relaxed);
//! });
//! assert_eq!(total.load(Ordering::Relaxed), 1000);
//! ```

mod config;
mod error;
mod pool;

pub use config::{SchedulerConfig, ELEMENTS_PER_WORKER};
pub use error::SchedulerError;
pub use pool::{split_even, DispatchStats, WorkerPool};

use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<WorkerPool> = OnceCell::new();

/// Returns the global worker pool, building it with the default
/// configuration on first use.
pub fn global() -> &'static WorkerPool {
    GLOBAL.get_or_init(|| {
        WorkerPool::new(&SchedulerConfig::default()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to an inline worker pool");
            WorkerPool::inline()
        })
    })
}

/// Builds the global worker pool from `config`.
///
/// # Errors
/// Returns [`SchedulerError::AlreadyInitialised`] if the pool already
/// exists with a different worker count or threshold, and
/// [`SchedulerError::ThreadPoolBuild`] if the threads cannot be spawned.
pub fn init_global(config: &SchedulerConfig) -> Result<&'static WorkerPool, SchedulerError> {
    let pool = GLOBAL.get_or_try_init(|| WorkerPool::new(config))?;
    let workers = config.resolve_threads();
    if pool.workers() != workers
        || pool.min_parallel_size() != config.resolve_min_parallel_size(workers)
    {
        return Err(SchedulerError::AlreadyInitialised {
            workers: pool.workers(),
        });
    }
    Ok(pool)
}

/// [`WorkerPool::should_parallelize`] on the global pool.
pub fn should_parallelize(n: usize) -> bool {
    global().should_parallelize(n)
}

/// Number of workers in the global pool.
pub fn workers() -> usize {
    global().workers()
}

/// [`WorkerPool::chunk_range`] on the global pool.
pub fn chunk_range<F>(n: usize, f: F)
where
    F: Fn(usize, usize) + Sync,
{
    global().chunk_range(n, f);
}

/// [`WorkerPool::chunk_rows`] on the global pool.
pub fn chunk_rows<F>(rows: usize, f: F)
where
    F: Fn(usize, usize) + Sync,
{
    global().chunk_rows(rows, f);
}

/// [`WorkerPool::chunk_first_dim`] on the global pool.
pub fn chunk_first_dim<F>(shape: &[usize], f: F)
where
    F: Fn(usize, usize) + Sync,
{
    global().chunk_first_dim(shape, f);
}

/// [`WorkerPool::chunk_linear`] on the global pool.
pub fn chunk_linear<F>(total: usize, f: F)
where
    F: Fn(usize, usize) + Sync,
{
    global().chunk_linear(total, f);
}

/// [`WorkerPool::chunk_map`] on the global pool.
pub fn chunk_map<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize, usize) -> R + Sync,
{
    global().chunk_map(n, f)
}

/// [`WorkerPool::for_each_chunk_mut`] on the global pool.
pub fn for_each_chunk_mut<T, F>(data: &mut [T], granularity: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    global().for_each_chunk_mut(data, granularity, f);
}

/// [`WorkerPool::for_each_chunk_mut2`] on the global pool.
pub fn for_each_chunk_mut2<A, B, F>(a: &mut [A], ga: usize, b: &mut [B], gb: usize, f: F)
where
    A: Send,
    B: Send,
    F: Fn(usize, &mut [A], &mut [B]) + Sync,
{
    global().for_each_chunk_mut2(a, ga, b, gb, f);
}
