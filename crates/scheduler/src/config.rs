// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scheduler configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! num_threads = 4
//! min_parallel_size = 2048
//! thread_name_prefix = "tensor-worker"
//! ```

use crate::SchedulerError;
use std::path::Path;

/// Elements per worker below which kernels stay single-threaded.
pub const ELEMENTS_PER_WORKER: usize = 128;

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads (defaults to hardware parallelism).
    pub num_threads: Option<usize>,
    /// Element count at which kernels fan out (defaults to `128 × workers`).
    pub min_parallel_size: Option<usize>,
    /// Name prefix for worker threads.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_thread_name_prefix() -> String {
    "tensor-worker".to_string()
}

impl SchedulerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        toml::from_str(toml_str)
            .map_err(|e| SchedulerError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, SchedulerError> {
        toml::to_string_pretty(self)
            .map_err(|e| SchedulerError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves the number of worker threads, clamped to at least one.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Resolves the parallelization threshold for the given worker count.
    pub fn resolve_min_parallel_size(&self, workers: usize) -> usize {
        self.min_parallel_size
            .unwrap_or(ELEMENTS_PER_WORKER * workers)
            .max(1)
    }

    /// A configuration that runs everything on the calling thread.
    pub fn single_threaded() -> Self {
        Self {
            num_threads: Some(1),
            ..Self::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_parallel_size: None,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = SchedulerConfig::default();
        assert!(c.num_threads.is_none());
        assert!(c.min_parallel_size.is_none());
        assert_eq!(c.thread_name_prefix, "tensor-worker");
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
num_threads = 2
min_parallel_size = 64
"#;
        let c = SchedulerConfig::from_toml(toml).unwrap();
        assert_eq!(c.num_threads, Some(2));
        assert_eq!(c.min_parallel_size, Some(64));
        assert_eq!(c.thread_name_prefix, "tensor-worker");
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(SchedulerConfig::from_toml("num_threads = \"many\"").is_err());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = SchedulerConfig {
            num_threads: Some(3),
            min_parallel_size: None,
            thread_name_prefix: "k".into(),
        };
        let back = SchedulerConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_resolve_threads() {
        let c = SchedulerConfig {
            num_threads: Some(8),
            ..Default::default()
        };
        assert_eq!(c.resolve_threads(), 8);

        let zero = SchedulerConfig {
            num_threads: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.resolve_threads(), 1);

        assert!(SchedulerConfig::default().resolve_threads() >= 1);
    }

    #[test]
    fn test_resolve_min_parallel_size() {
        let c = SchedulerConfig::default();
        assert_eq!(c.resolve_min_parallel_size(4), 512);

        let custom = SchedulerConfig {
            min_parallel_size: Some(10),
            ..Default::default()
        };
        assert_eq!(custom.resolve_min_parallel_size(4), 10);
    }
}
