// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The worker pool and its chunking primitives.
//!
//! A [`WorkerPool`] owns `W` long-lived threads. Every chunking call splits
//! its range into at most `W` contiguous pieces, hands them to the workers,
//! and blocks until all of them have finished. A panic in any piece is
//! re-raised on the calling thread once the others complete.
//!
//! # Re-entrancy
//! A chunking call made from one of the pool's own workers runs inline on
//! that worker. Kernels nested inside a parallel kernel therefore degrade to
//! their single-threaded form instead of queueing behind themselves.

use crate::{SchedulerConfig, SchedulerError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how kernels were dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatchStats {
    /// Calls that fanned out to workers.
    pub parallel: u64,
    /// Calls that ran on the calling thread.
    pub inline: u64,
}

/// A fixed-size pool of worker threads.
pub struct WorkerPool {
    /// `None` when the pool has a single worker: everything runs inline.
    threads: Option<rayon::ThreadPool>,
    workers: usize,
    min_parallel_size: usize,
    parallel_dispatches: AtomicU64,
    inline_dispatches: AtomicU64,
}

impl WorkerPool {
    /// Builds a pool from `config`.
    ///
    /// # Errors
    /// Returns [`SchedulerError::ThreadPoolBuild`] if the OS refuses to
    /// spawn the worker threads.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let workers = config.resolve_threads();
        let min_parallel_size = config.resolve_min_parallel_size(workers);

        let threads = if workers > 1 {
            let prefix = config.thread_name_prefix.clone();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(move |i| format!("{prefix}-{i}"))
                .build()
                .map_err(|e| SchedulerError::ThreadPoolBuild(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        tracing::info!(workers, min_parallel_size, "built worker pool");

        Ok(Self {
            threads,
            workers,
            min_parallel_size,
            parallel_dispatches: AtomicU64::new(0),
            inline_dispatches: AtomicU64::new(0),
        })
    }

    /// A single-worker pool that runs everything on the calling thread.
    pub fn inline() -> Self {
        Self {
            threads: None,
            workers: 1,
            min_parallel_size: usize::MAX,
            parallel_dispatches: AtomicU64::new(0),
            inline_dispatches: AtomicU64::new(0),
        }
    }

    /// Returns the number of workers `W`.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the element count at which kernels fan out.
    pub fn min_parallel_size(&self) -> usize {
        self.min_parallel_size
    }

    /// Returns `true` if the current thread is one of this pool's workers.
    pub fn on_worker_thread(&self) -> bool {
        self.threads
            .as_ref()
            .is_some_and(|p| p.current_thread_index().is_some())
    }

    /// Returns `true` iff `n ≥ min_parallel_size`, `W > 1`, and the caller
    /// is not already running on one of this pool's workers.
    pub fn should_parallelize(&self, n: usize) -> bool {
        self.workers > 1 && n >= self.min_parallel_size && !self.on_worker_thread()
    }

    /// Returns dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            parallel: self.parallel_dispatches.load(Ordering::Relaxed),
            inline: self.inline_dispatches.load(Ordering::Relaxed),
        }
    }

    /// The rayon pool to fan out on, or `None` if this call must run inline.
    fn fan_out_target(&self, pieces: usize) -> Option<&rayon::ThreadPool> {
        let target = self
            .threads
            .as_ref()
            .filter(|p| pieces > 1 && p.current_thread_index().is_none());
        let counter = if target.is_some() {
            &self.parallel_dispatches
        } else {
            &self.inline_dispatches
        };
        counter.fetch_add(1, Ordering::Relaxed);
        target
    }

    /// Splits `[0, n)` into at most `W` contiguous chunks and runs
    /// `f(start, end)` for each on the workers. Blocks until all complete.
    ///
    /// # Panics
    /// Re-raises the first panic raised by `f`.
    pub fn chunk_range<F>(&self, n: usize, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        if n == 0 {
            return;
        }
        let pieces = self.workers.min(n);
        match self.fan_out_target(pieces) {
            None => f(0, n),
            Some(pool) => {
                let f = &f;
                pool.scope(|s| {
                    for (start, end) in split_even(n, pieces) {
                        s.spawn(move |_| f(start, end));
                    }
                });
            }
        }
    }

    /// Splits the rows of a matrix into bands and runs `f(row_start, row_end)`.
    pub fn chunk_rows<F>(&self, rows: usize, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        self.chunk_range(rows, f);
    }

    /// Splits the outermost dimension of `shape` and runs `f(start, end)`
    /// over index ranges of that dimension. A scalar shape is one slab.
    pub fn chunk_first_dim<F>(&self, shape: &[usize], f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        match shape.first() {
            None => f(0, 1),
            Some(&outer) => {
                if shape.iter().any(|&d| d == 0) {
                    return;
                }
                self.chunk_range(outer, f);
            }
        }
    }

    /// Splits a linear iteration space of `total` logical positions.
    pub fn chunk_linear<F>(&self, total: usize, f: F)
    where
        F: Fn(usize, usize) + Sync,
    {
        self.chunk_range(total, f);
    }

    /// Runs `f(start, end)` over at most `W` chunks of `[0, n)` and collects
    /// the results in chunk order.
    pub fn chunk_map<R, F>(&self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, usize) -> R + Sync,
    {
        if n == 0 {
            return Vec::new();
        }
        let pieces = self.workers.min(n);
        match self.fan_out_target(pieces) {
            None => vec![f(0, n)],
            Some(pool) => {
                let ranges = split_even(n, pieces);
                let mut results: Vec<Option<R>> = ranges.iter().map(|_| None).collect();
                let f = &f;
                pool.scope(|s| {
                    for (slot, &(start, end)) in results.iter_mut().zip(&ranges) {
                        s.spawn(move |_| *slot = Some(f(start, end)));
                    }
                });
                results.into_iter().flatten().collect()
            }
        }
    }

    /// Splits `data` into at most `W` disjoint pieces whose boundaries fall
    /// on multiples of `granularity` elements, and runs `f(first_unit, piece)`
    /// on each. `first_unit` is the index of the piece's first unit.
    ///
    /// A trailing partial unit is handed to the last piece.
    pub fn for_each_chunk_mut<T, F>(&self, data: &mut [T], granularity: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        if data.is_empty() {
            return;
        }
        let granularity = granularity.max(1);
        let units = data.len().div_ceil(granularity);
        let pieces = self.workers.min(units);
        match self.fan_out_target(pieces) {
            None => f(0, data),
            Some(pool) => {
                let f = &f;
                pool.scope(|s| {
                    let mut rest = data;
                    for (start, end) in split_even(units, pieces) {
                        let take = ((end - start) * granularity).min(rest.len());
                        let (head, tail) = rest.split_at_mut(take);
                        rest = tail;
                        s.spawn(move |_| f(start, head));
                    }
                });
            }
        }
    }

    /// Like [`for_each_chunk_mut`](Self::for_each_chunk_mut) over two
    /// buffers split in lockstep: unit `u` covers `a[u·ga..(u+1)·ga]` and
    /// `b[u·gb..(u+1)·gb]`.
    pub fn for_each_chunk_mut2<A, B, F>(
        &self,
        a: &mut [A],
        ga: usize,
        b: &mut [B],
        gb: usize,
        f: F,
    ) where
        A: Send,
        B: Send,
        F: Fn(usize, &mut [A], &mut [B]) + Sync,
    {
        let (ga, gb) = (ga.max(1), gb.max(1));
        let units = a.len().div_ceil(ga).max(b.len().div_ceil(gb));
        if units == 0 {
            return;
        }
        let pieces = self.workers.min(units);
        match self.fan_out_target(pieces) {
            None => f(0, a, b),
            Some(pool) => {
                let f = &f;
                pool.scope(|s| {
                    let (mut rest_a, mut rest_b) = (a, b);
                    for (start, end) in split_even(units, pieces) {
                        let take_a = ((end - start) * ga).min(rest_a.len());
                        let take_b = ((end - start) * gb).min(rest_b.len());
                        let (head_a, tail_a) = rest_a.split_at_mut(take_a);
                        let (head_b, tail_b) = rest_b.split_at_mut(take_b);
                        rest_a = tail_a;
                        rest_b = tail_b;
                        s.spawn(move |_| f(start, head_a, head_b));
                    }
                });
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("min_parallel_size", &self.min_parallel_size)
            .finish()
    }
}

/// Splits `[0, n)` into `pieces` contiguous ranges whose lengths differ by
/// at most one. The longer ranges come first.
pub fn split_even(n: usize, pieces: usize) -> Vec<(usize, usize)> {
    let pieces = pieces.clamp(1, n.max(1));
    let base = n / pieces;
    let rem = n % pieces;
    let mut start = 0;
    (0..pieces)
        .map(|i| {
            let len = base + usize::from(i < rem);
            let range = (start, start + len);
            start += len;
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(&SchedulerConfig {
            num_threads: Some(workers),
            min_parallel_size: Some(8),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_split_even() {
        assert_eq!(split_even(10, 3), vec![(0, 4), (4, 7), (7, 10)]);
        assert_eq!(split_even(2, 4), vec![(0, 1), (1, 2)]);
        assert_eq!(split_even(5, 1), vec![(0, 5)]);
    }

    #[test]
    fn test_should_parallelize() {
        let p = pool(4);
        assert!(!p.should_parallelize(7));
        assert!(p.should_parallelize(8));

        let single = pool(1);
        assert!(!single.should_parallelize(1_000_000));
    }

    #[test]
    fn test_default_threshold_scales_with_workers() {
        let p = WorkerPool::new(&SchedulerConfig {
            num_threads: Some(3),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(p.min_parallel_size(), 384);
    }

    #[test]
    fn test_chunk_range_covers_everything_once() {
        let p = pool(4);
        let hits: Vec<AtomicUsize> = (0..103).map(|_| AtomicUsize::new(0)).collect();
        let calls = AtomicUsize::new(0);
        p.chunk_range(hits.len(), |start, end| {
            calls.fetch_add(1, Ordering::Relaxed);
            for h in &hits[start..end] {
                h.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        assert!(calls.load(Ordering::Relaxed) <= 4);
    }

    #[test]
    fn test_chunk_range_zero_is_noop() {
        let p = pool(4);
        p.chunk_range(0, |_, _| panic!("must not be called"));
    }

    #[test]
    fn test_chunk_first_dim_scalar_and_empty() {
        let p = pool(2);
        let seen = Mutex::new(Vec::new());
        p.chunk_first_dim(&[], |s, e| seen.lock().unwrap().push((s, e)));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 1)]);

        p.chunk_first_dim(&[4, 0], |_, _| panic!("must not be called"));
    }

    #[test]
    fn test_chunk_map_preserves_order() {
        let p = pool(4);
        let sums = p.chunk_map(100, |s, e| (s..e).sum::<usize>());
        assert_eq!(sums.iter().sum::<usize>(), 4950);
        assert_eq!(sums.len(), 4);
    }

    #[test]
    fn test_for_each_chunk_mut_respects_granularity() {
        let p = pool(3);
        let mut data = vec![0usize; 7 * 5];
        p.for_each_chunk_mut(&mut data, 5, |first_row, chunk| {
            assert_eq!(chunk.len() % 5, 0);
            for (i, row) in chunk.chunks_mut(5).enumerate() {
                row.fill(first_row + i);
            }
        });
        for (r, row) in data.chunks(5).enumerate() {
            assert!(row.iter().all(|&v| v == r));
        }
    }

    #[test]
    fn test_for_each_chunk_mut2_lockstep() {
        let p = pool(4);
        let mut a = vec![0u32; 10 * 2];
        let mut b = vec![0u64; 10];
        p.for_each_chunk_mut2(&mut a, 2, &mut b, 1, |first, ca, cb| {
            assert_eq!(ca.len(), cb.len() * 2);
            for (i, v) in cb.iter_mut().enumerate() {
                *v = (first + i) as u64;
                ca[2 * i] = (first + i) as u32;
            }
        });
        assert_eq!(b, (0..10).collect::<Vec<u64>>());
        assert_eq!(a[18], 9);
    }

    #[test]
    fn test_nested_call_runs_inline() {
        let p = pool(4);
        let nested_inline = AtomicUsize::new(0);
        p.chunk_range(4, |_, _| {
            assert!(p.on_worker_thread());
            assert!(!p.should_parallelize(1_000_000));
            p.chunk_range(16, |s, e| {
                if s == 0 && e == 16 {
                    nested_inline.fetch_add(1, Ordering::Relaxed);
                }
            });
        });
        assert_eq!(nested_inline.load(Ordering::Relaxed), 4);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_panic_propagates() {
        let p = pool(2);
        p.chunk_range(10, |start, _| {
            if start > 0 {
                panic!("boom");
            }
        });
    }

    #[test]
    fn test_inline_pool() {
        let p = WorkerPool::inline();
        assert_eq!(p.workers(), 1);
        let calls = AtomicUsize::new(0);
        p.chunk_range(1000, |s, e| {
            assert_eq!((s, e), (0, 1000));
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(p.stats().inline, 1);
    }
}
