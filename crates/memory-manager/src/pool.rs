// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tiered free-list pool for typed scratch buffers.
//!
//! The [`BufferPool`] is the allocator behind every scratch buffer the
//! kernels need (normalization statistics, im2col matrices, transposes).
//! It:
//!
//! 1. Bins returned buffers by capacity into a configurable set of tiers.
//! 2. Serves a request of `n` elements from the smallest tier whose
//!    capacity is `≥ n`, allocating a fresh buffer of exactly the tier
//!    capacity on a miss.
//! 3. Serves requests larger than the top tier from an unbounded bin,
//!    allocating exactly `n` elements on a miss.
//!
//! # Thread Safety
//! `get` and `put` take a shared lock on the tier table and a short
//! per-tier mutex, so they only contend when two threads hit the same tier.
//! `reconfigure` takes the tier table exclusively; in-flight gets and puts
//! finish before it swaps the schedule in.
//!
//! # Buffer Contents
//! A buffer handed out by `get` has length exactly `n` but its contents are
//! whatever the previous user left behind. Callers must overwrite it before
//! reading.

use crate::stats::PoolCounters;
use crate::{MemoryError, PoolStats, PooledBuffer};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Number of tiers in the default schedule.
pub const DEFAULT_TIER_COUNT: usize = 8;

/// Capacity of the smallest tier in the default schedule.
pub const DEFAULT_MIN_TIER: usize = 16;

/// Returns the default tier schedule: eight tiers doubling from 16.
///
/// ```
/// assert_eq!(
///     memory_manager::default_tiers(),
///     vec![16, 32, 64, 128, 256, 512, 1024, 2048]
/// );
/// ```
pub fn default_tiers() -> Vec<usize> {
    (0..DEFAULT_TIER_COUNT)
        .map(|i| DEFAULT_MIN_TIER << i)
        .collect()
}

/// Checks that `tiers` is a non-empty, strictly increasing list of
/// positive capacities.
///
/// # Errors
/// Returns [`MemoryError::BadTiers`] describing the first violation.
pub fn validate_tiers(tiers: &[usize]) -> Result<(), MemoryError> {
    let bad = |reason| {
        Err(MemoryError::BadTiers {
            tiers: tiers.to_vec(),
            reason,
        })
    };
    if tiers.is_empty() {
        return bad("at least one tier is required");
    }
    if tiers[0] == 0 {
        return bad("tier capacities must be positive");
    }
    if tiers.windows(2).any(|w| w[0] >= w[1]) {
        return bad("tier capacities must be strictly increasing");
    }
    Ok(())
}

/// A free list guarded by its own mutex.
type Bin<T> = Mutex<Vec<Vec<T>>>;

/// The tier schedule and its free lists. Replaced wholesale on reconfigure.
struct TierTable<T> {
    tiers: Vec<usize>,
    bins: Vec<Bin<T>>,
    unbounded: Bin<T>,
}

impl<T> TierTable<T> {
    fn new(tiers: Vec<usize>) -> Self {
        let bins = tiers.iter().map(|_| Mutex::new(Vec::new())).collect();
        Self {
            tiers,
            bins,
            unbounded: Mutex::new(Vec::new()),
        }
    }

    /// Index of the smallest tier that can hold `n` elements.
    fn tier_for_request(&self, n: usize) -> Option<usize> {
        let idx = self.tiers.partition_point(|&cap| cap < n);
        (idx < self.tiers.len()).then_some(idx)
    }

    /// Index of the largest tier a buffer of `capacity` can serve.
    fn tier_for_return(&self, capacity: usize) -> Option<usize> {
        self.tiers
            .partition_point(|&cap| cap <= capacity)
            .checked_sub(1)
    }

    fn top(&self) -> usize {
        self.tiers.last().copied().unwrap_or(0)
    }

    fn cached_buffers(&self) -> usize {
        let tiered: usize = self.bins.iter().map(|b| lock(b).len()).sum();
        tiered + lock(&self.unbounded).len()
    }
}

/// Locks a bin, recovering from poisoning: a bin is a plain list of
/// buffers and is valid whatever the panicking holder was doing.
fn lock<T>(bin: &Bin<T>) -> std::sync::MutexGuard<'_, Vec<Vec<T>>> {
    bin.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Internal pool state, shared between the pool and its buffer guards.
pub struct PoolInner<T> {
    table: RwLock<TierTable<T>>,
    counters: PoolCounters,
}

impl<T: Copy + Default> PoolInner<T> {
    pub(crate) fn get(&self, n: usize) -> Vec<T> {
        if n == 0 {
            return Vec::new();
        }
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        let (reused, fresh_capacity) = match table.tier_for_request(n) {
            Some(idx) => (lock(&table.bins[idx]).pop(), table.tiers[idx]),
            None => {
                self.counters.record_oversized();
                let mut bin = lock(&table.unbounded);
                let found = bin.iter().position(|b| b.capacity() >= n);
                (found.map(|i| bin.swap_remove(i)), n)
            }
        };
        drop(table);

        let mut buf = match reused {
            Some(buf) => {
                self.counters.record_hit();
                buf
            }
            None => {
                self.counters.record_miss();
                Vec::with_capacity(fresh_capacity)
            }
        };
        if buf.len() >= n {
            buf.truncate(n);
        } else {
            buf.resize(n, T::default());
        }
        buf
    }

    pub(crate) fn put(&self, buf: Vec<T>) {
        let capacity = buf.capacity();
        if capacity == 0 {
            return;
        }
        self.counters.record_put();

        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        if capacity > table.top() {
            lock(&table.unbounded).push(buf);
            return;
        }
        match table.tier_for_return(capacity) {
            Some(idx) => lock(&table.bins[idx]).push(buf),
            None => self.counters.record_discard(1),
        }
    }
}

/// A thread-safe, tiered pool of `Vec<T>` scratch buffers.
///
/// Cloning a `BufferPool` is cheap and yields a handle to the same pool.
///
/// # Example
/// ```
/// use memory_manager::BufferPool;
///
/// let pool = BufferPool::<f32>::with_default_tiers();
///
/// let buf = pool.get(100);
/// assert_eq!(buf.len(), 100);
/// assert!(buf.capacity() >= 128);
/// pool.put(buf);
///
/// // The next request in the same tier reuses the buffer.
/// let again = pool.get(120);
/// assert_eq!(again.len(), 120);
/// assert_eq!(pool.stats().cache_hits, 1);
/// ```
pub struct BufferPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Copy + Default> BufferPool<T> {
    /// Creates a pool with the given tier schedule.
    ///
    /// # Errors
    /// Returns [`MemoryError::BadTiers`] if the schedule is invalid.
    pub fn new(tiers: &[usize]) -> Result<Self, MemoryError> {
        validate_tiers(tiers)?;
        Ok(Self::from_valid_tiers(tiers.to_vec()))
    }

    /// Creates a pool with [`default_tiers`].
    pub fn with_default_tiers() -> Self {
        Self::from_valid_tiers(default_tiers())
    }

    fn from_valid_tiers(tiers: Vec<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                table: RwLock::new(TierTable::new(tiers)),
                counters: PoolCounters::default(),
            }),
        }
    }

    /// Returns a buffer of length exactly `n` and capacity `≥ n`.
    ///
    /// The contents are unspecified. `get(0)` returns an empty vector
    /// without touching the pool.
    pub fn get(&self, n: usize) -> Vec<T> {
        self.inner.get(n)
    }

    /// Returns a buffer to the pool for reuse. Empty buffers are ignored.
    ///
    /// Buffers smaller than the smallest tier are freed.
    pub fn put(&self, buf: Vec<T>) {
        self.inner.put(buf);
    }

    /// Like [`get`](Self::get), but wraps the buffer in a guard that puts it
    /// back when dropped.
    pub fn acquire(&self, n: usize) -> PooledBuffer<T> {
        PooledBuffer::new(self.inner.get(n), Arc::clone(&self.inner))
    }

    /// Like [`acquire`](Self::acquire), with every element set to `value`.
    pub fn acquire_filled(&self, n: usize, value: T) -> PooledBuffer<T> {
        let mut guard = self.acquire(n);
        guard.fill(value);
        guard
    }

    /// Replaces the tier schedule.
    ///
    /// Cached buffers are dropped. Buffers currently checked out are
    /// re-binned against the new schedule when they come back.
    ///
    /// # Errors
    /// Returns [`MemoryError::BadTiers`] if the schedule is invalid; the
    /// existing schedule is kept in that case.
    pub fn reconfigure(&self, tiers: &[usize]) -> Result<(), MemoryError> {
        validate_tiers(tiers)?;
        let mut table = self
            .inner
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let dropped = table.cached_buffers();
        tracing::debug!(
            old = ?table.tiers,
            new = ?tiers,
            dropped,
            "reconfiguring buffer pool"
        );
        *table = TierTable::new(tiers.to_vec());
        self.inner.counters.record_discard(dropped as u64);
        Ok(())
    }

    /// Returns the current tier schedule.
    pub fn tiers(&self) -> Vec<usize> {
        self.inner
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tiers
            .clone()
    }

    /// Returns the number of buffers currently cached in free lists.
    pub fn cached_buffers(&self) -> usize {
        self.inner
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cached_buffers()
    }

    /// Drops every cached buffer, releasing the memory.
    pub fn shrink(&self) {
        let table = self.inner.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut dropped = 0;
        for bin in table.bins.iter().chain(std::iter::once(&table.unbounded)) {
            let mut bin = lock(bin);
            dropped += bin.len();
            bin.clear();
        }
        tracing::debug!(dropped, "shrunk buffer pool");
    }

    /// Returns a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.counters.snapshot()
    }
}

impl<T: Copy + Default> std::fmt::Debug for BufferPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("element", &std::any::type_name::<T>())
            .field("tiers", &self.tiers())
            .field("cached_buffers", &self.cached_buffers())
            .finish()
    }
}
