// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the worker pool.

/// Errors that can occur while building or configuring the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The global pool was already built with a different configuration.
    #[error("global worker pool already initialised with {workers} workers")]
    AlreadyInitialised { workers: usize },

    /// The underlying thread pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPoolBuild(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
