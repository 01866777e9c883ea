// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII buffer guard that returns a scratch buffer to its pool on drop.
//!
//! [`PooledBuffer`] is what kernels use for scratch space: they acquire it,
//! use it as a slice, and let it fall out of scope. The guard holds an `Arc`
//! back to the pool state, so it can outlive the [`BufferPool`](crate::BufferPool)
//! handle it came from and still find its way home.

use crate::pool::PoolInner;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// An RAII guard wrapping a pooled `Vec<T>`.
///
/// Dereferences to `[T]`. When dropped, the buffer is returned to the pool
/// it was acquired from.
///
/// # Example
/// ```
/// use memory_manager::BufferPool;
///
/// let pool = BufferPool::<f32>::with_default_tiers();
/// {
///     let mut scratch = pool.acquire(64);
///     scratch.fill(0.0);
///     scratch[3] = 1.5;
///     assert_eq!(scratch.iter().sum::<f32>(), 1.5);
/// } // returned here
/// assert_eq!(pool.cached_buffers(), 1);
/// ```
pub struct PooledBuffer<T: Copy + Default> {
    /// Wrapped in `Option` so `drop` and `into_vec` can take it.
    data: Option<Vec<T>>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Copy + Default> PooledBuffer<T> {
    pub(crate) fn new(data: Vec<T>, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            data: Some(data),
            pool,
        }
    }

    /// Detaches the buffer from the pool. It will not be returned on drop.
    pub fn into_vec(mut self) -> Vec<T> {
        self.data.take().unwrap_or_default()
    }

    /// Returns the buffer's length in elements.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// Returns `true` if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Copy + Default> Deref for PooledBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl<T: Copy + Default> DerefMut for PooledBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T: Copy + Default> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.data.take() {
            self.pool.put(buffer);
        }
    }
}

impl<T: Copy + Default> std::fmt::Debug for PooledBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::BufferPool;

    #[test]
    fn test_drop_returns_buffer() {
        let pool = BufferPool::<f32>::with_default_tiers();
        let guard = pool.acquire(100);
        assert_eq!(guard.len(), 100);
        assert_eq!(pool.cached_buffers(), 0);
        drop(guard);
        assert_eq!(pool.cached_buffers(), 1);
    }

    #[test]
    fn test_into_vec_detaches() {
        let pool = BufferPool::<f32>::with_default_tiers();
        let v = pool.acquire(10).into_vec();
        assert_eq!(v.len(), 10);
        assert_eq!(pool.cached_buffers(), 0);
        assert_eq!(pool.stats().total_puts, 0);
    }

    #[test]
    fn test_acquire_filled() {
        let pool = BufferPool::<i64>::with_default_tiers();
        let mut g = pool.acquire(32);
        g.fill(7);
        drop(g);
        let g = pool.acquire_filled(32, -1);
        assert!(g.iter().all(|&x| x == -1));
    }

    #[test]
    fn test_guard_outlives_pool_handle() {
        let pool = BufferPool::<f32>::with_default_tiers();
        let guard = pool.acquire(8);
        let clone = pool.clone();
        drop(pool);
        drop(guard);
        assert_eq!(clone.cached_buffers(), 1);
    }

    #[test]
    fn test_zero_length_guard() {
        let pool = BufferPool::<f32>::with_default_tiers();
        let g = pool.acquire(0);
        assert!(g.is_empty());
        drop(g);
        assert_eq!(pool.cached_buffers(), 0);
    }
}
