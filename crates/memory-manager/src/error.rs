// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for buffer pool management.

/// Errors that can occur while configuring a buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// A tier schedule was empty, non-increasing, or contained a zero.
    #[error("bad tier configuration {tiers:?}: {reason}")]
    BadTiers {
        tiers: Vec<usize>,
        reason: &'static str,
    },

    /// A pool configuration file could not be read or parsed.
    #[error("pool configuration error: {0}")]
    Config(String),
}
