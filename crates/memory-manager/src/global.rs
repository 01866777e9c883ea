// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process-wide pools, one per element type.
//!
//! Kernels reach their scratch pool through [`PoolElement::global_pool`],
//! so generic code over `T` needs nothing more than a `T: PoolElement`
//! bound. All pools share one tier schedule, changed with
//! [`reconfigure_all`].

use crate::{pool::validate_tiers, BufferPool, MemoryError, PooledBuffer};
use once_cell::sync::Lazy;

/// Element types that have a process-wide [`BufferPool`].
pub trait PoolElement: Copy + Default + Send + Sync + 'static {
    /// Returns the global pool for this element type.
    fn global_pool() -> &'static BufferPool<Self>;
}

macro_rules! global_pools {
    ($($ty:ty => $name:ident),* $(,)?) => {
        $(
            static $name: Lazy<BufferPool<$ty>> = Lazy::new(BufferPool::with_default_tiers);

            impl PoolElement for $ty {
                fn global_pool() -> &'static BufferPool<$ty> {
                    &$name
                }
            }
        )*

        /// Replaces the tier schedule of every global pool.
        ///
        /// # Errors
        /// Returns [`MemoryError::BadTiers`] if the schedule is invalid; no
        /// pool is modified in that case.
        pub fn reconfigure_all(tiers: &[usize]) -> Result<(), MemoryError> {
            validate_tiers(tiers)?;
            $( $name.reconfigure(tiers)?; )*
            tracing::debug!(?tiers, "reconfigured global buffer pools");
            Ok(())
        }

        /// Drops every cached buffer in every global pool.
        pub fn shrink_all() {
            $( $name.shrink(); )*
        }
    };
}

global_pools! {
    f32 => F32_POOL,
    f64 => F64_POOL,
    i64 => I64_POOL,
    i32 => I32_POOL,
    i16 => I16_POOL,
    i8 => I8_POOL,
    u8 => U8_POOL,
    usize => USIZE_POOL,
}

/// Takes a buffer of length `n` from the global pool for `T`.
pub fn get<T: PoolElement>(n: usize) -> Vec<T> {
    T::global_pool().get(n)
}

/// Returns a buffer to the global pool for `T`.
pub fn put<T: PoolElement>(buf: Vec<T>) {
    T::global_pool().put(buf);
}

/// Takes a guarded buffer of length `n` from the global pool for `T`.
pub fn acquire<T: PoolElement>(n: usize) -> PooledBuffer<T> {
    T::global_pool().acquire(n)
}

/// Takes a guarded buffer of length `n` with every element set to `value`.
pub fn acquire_filled<T: PoolElement>(n: usize, value: T) -> PooledBuffer<T> {
    T::global_pool().acquire_filled(n, value)
}
