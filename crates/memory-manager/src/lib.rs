// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! A tiered, thread-safe pool of typed scratch buffers for tensor kernels.
//!
//! # Key Components
//!
//! - [`BufferPool`]: free lists binned by capacity tier. Requests are
//!   served from the smallest tier that fits; oversized requests go to an
//!   unbounded bin.
//! - [`PooledBuffer`]: an RAII wrapper around a pooled `Vec<T>`. When the
//!   guard is dropped, the buffer goes back to its pool.
//! - [`PoolElement`]: element types with a process-wide pool, used by
//!   generic kernels to find scratch space.
//! - [`PoolConfig`]: the tier schedule, loadable from TOML.
//! - [`PoolStats`]: hit/miss counters for tuning the schedule.
//!
//! # Ownership Model
//!
//! ```text
//! BufferPool::acquire(n)
//!       │
//!       ▼
//!   PooledBuffer<T>  ◄─── owns Vec<T>, holds Arc<PoolInner<T>>
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::put()  ──► tier free list
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{acquire, PoolElement};
//!
//! let mut scratch = acquire::<f32>(300);
//! scratch.fill(1.0);
//! assert_eq!(scratch.len(), 300);
//! drop(scratch);
//! assert!(f32::global_pool().cached_buffers() >= 1);
//! ```

mod config;
mod error;
mod global;
mod guard;
pub mod pool;
mod stats;

pub use config::PoolConfig;
pub use error::MemoryError;
pub use global::{acquire, acquire_filled, get, put, reconfigure_all, shrink_all, PoolElement};
pub use guard::PooledBuffer;
pub use pool::{default_tiers, validate_tiers, BufferPool};
pub use stats::PoolStats;
