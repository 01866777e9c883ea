// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Combined configuration for the buffer pools and the worker pool.
//!
//! # TOML Format
//! ```toml
//! [pool]
//! tiers = [64, 256, 1024, 4096]
//!
//! [scheduler]
//! num_threads = 4
//! min_parallel_size = 2048
//! ```

use std::path::Path;

use memory_manager::PoolConfig;
use scheduler::SchedulerConfig;

use crate::TensorError;

/// Start-up configuration of the tensor core.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoreConfig {
    /// Tier schedule of the typed buffer pools.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Worker count and parallelisation threshold.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CoreConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, TensorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TensorError::Config(format!("cannot read config '{}': {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, TensorError> {
        toml::from_str(toml_str).map_err(|e| TensorError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, TensorError> {
        toml::to_string_pretty(self).map_err(|e| TensorError::Config(format!("TOML serialise error: {e}")))
    }

    /// Reconfigures every global buffer pool and builds the global worker
    /// pool.
    ///
    /// The worker pool can only be built once per process; applying a
    /// config whose scheduler section differs from the running pool fails
    /// with [`TensorError::Scheduler`] after the pool tiers were updated.
    pub fn apply(&self) -> Result<(), TensorError> {
        self.pool.apply()?;
        let pool = scheduler::init_global(&self.scheduler)?;
        tracing::info!(
            tiers = ?self.pool.tiers,
            workers = pool.workers(),
            min_parallel_size = pool.min_parallel_size(),
            "tensor core configured"
        );
        Ok(())
    }
}
