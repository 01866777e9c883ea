// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffer pool configuration loaded from TOML or built programmatically.
//!
//! # TOML Format
//! ```toml
//! tiers = [64, 256, 1024, 4096, 16384]
//! ```

use crate::{global, pool, MemoryError};
use std::path::Path;

/// Tier schedule shared by the global buffer pools.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    /// Strictly increasing tier capacities, in elements.
    #[serde(default = "pool::default_tiers")]
    pub tiers: Vec<usize>,
}

impl PoolConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, MemoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, MemoryError> {
        toml::from_str(toml_str)
            .map_err(|e| MemoryError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, MemoryError> {
        toml::to_string_pretty(self)
            .map_err(|e| MemoryError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks the tier schedule without applying it.
    pub fn validate(&self) -> Result<(), MemoryError> {
        pool::validate_tiers(&self.tiers)
    }

    /// Applies the tier schedule to every global pool.
    pub fn apply(&self) -> Result<(), MemoryError> {
        global::reconfigure_all(&self.tiers)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            tiers: pool::default_tiers(),
        }
    }
}
