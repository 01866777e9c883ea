// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffer pool statistics for profiling and diagnostics.
//!
//! The pool keeps lock-free counters on its hot path ([`PoolCounters`]) and
//! hands out plain [`PoolStats`] snapshots. The snapshot is what callers use
//! to tune the tier schedule: a low hit ratio or many oversized requests
//! usually means the top tier is too small for the workload.

use std::sync::atomic::{AtomicU64, Ordering};

/// A snapshot of cumulative buffer pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Total number of `get` requests with a non-zero length.
    pub total_gets: u64,
    /// Requests served from a free list.
    pub cache_hits: u64,
    /// Requests that required a fresh heap allocation.
    pub cache_misses: u64,
    /// Requests larger than the top tier (served from the unbounded bin).
    pub oversized_gets: u64,
    /// Buffers handed back through `put` (including guard drops).
    pub total_puts: u64,
    /// Returned buffers that were too small for any tier and were freed.
    pub discarded: u64,
}

impl PoolStats {
    /// Returns the cache hit ratio as a fraction in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` if no requests have been made.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Gets: {} total ({} hits, {} misses, {:.0}% hit rate, {} oversized), \
             {} puts, {} discarded",
            self.total_gets,
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_ratio() * 100.0,
            self.oversized_gets,
            self.total_puts,
            self.discarded,
        )
    }
}

/// Atomic counters updated on the pool's hot path.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    oversized: AtomicU64,
    puts: AtomicU64,
    discarded: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oversized(&self) {
        self.oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        let cache_hits = self.hits.load(Ordering::Relaxed);
        let cache_misses = self.misses.load(Ordering::Relaxed);
        PoolStats {
            total_gets: cache_hits + cache_misses,
            cache_hits,
            cache_misses,
            oversized_gets: self.oversized.load(Ordering::Relaxed),
            total_puts: self.puts.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let s = PoolStats::default();
        assert_eq!(s.total_gets, 0);
        assert_eq!(s.cache_hit_ratio(), 0.0);
    }

    #[test]
    fn test_cache_hit_ratio() {
        let c = PoolCounters::default();
        c.record_hit();
        c.record_hit();
        c.record_miss();
        let s = c.snapshot();
        assert_eq!(s.total_gets, 3);
        assert!((s.cache_hit_ratio() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_discard_counts_accumulate() {
        let c = PoolCounters::default();
        c.record_discard(3);
        c.record_discard(2);
        assert_eq!(c.snapshot().discarded, 5);
    }

    #[test]
    fn test_summary() {
        let c = PoolCounters::default();
        c.record_miss();
        c.record_hit();
        c.record_put();
        let summary = c.snapshot().summary();
        assert!(summary.contains("2 total"));
        assert!(summary.contains("1 hits"));
        assert!(summary.contains("1 misses"));
        assert!(summary.contains("1 puts"));
    }
}
