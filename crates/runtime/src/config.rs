// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Exchange configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! segment_size = "32K"
//! buffers_per_partition = 128
//! num_subpartitions = 1
//! partition_type = "pipelined"
//! enable_profiling = true
//! ```

use buffer_pool::MemorySize;
use result_partition::ResultPartitionType;
use std::path::Path;

/// Configuration for a data exchange between one producer and its consumers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExchangeConfig {
    /// Size of one pooled buffer (human-readable, e.g., `"32K"`).
    pub segment_size: String,
    /// Maximum number of buffers in the partition's pool.
    pub buffers_per_partition: usize,
    /// Number of subpartitions; each is read by its own consumer task.
    #[serde(default = "default_subpartitions")]
    pub num_subpartitions: usize,
    /// Partition type name: `"pipelined"` or `"blocking"`.
    #[serde(default = "default_partition_type")]
    pub partition_type: String,
    /// Whether to record per-task metrics.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
}

fn default_subpartitions() -> usize {
    1
}

fn default_partition_type() -> String {
    ResultPartitionType::Pipelined.name().to_string()
}

fn default_true() -> bool {
    true
}

impl ExchangeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::RuntimeError::ConfigError(format!(
                "cannot read config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::RuntimeError> {
        toml::from_str(toml_str).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML parse error: {e}"))
        })
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML serialise error: {e}"))
        })
    }

    /// Parses the segment size string into a [`MemorySize`].
    pub fn parse_segment_size(&self) -> Result<MemorySize, super::RuntimeError> {
        MemorySize::parse(&self.segment_size)
            .map_err(|e| super::RuntimeError::ConfigError(format!("invalid segment size: {e}")))
    }

    /// Resolves the configured partition type.
    pub fn resolve_partition_type(&self) -> Result<ResultPartitionType, super::RuntimeError> {
        self.partition_type
            .parse()
            .map_err(super::RuntimeError::ConfigError)
    }

    /// Checks every field, so a bad config fails before anything is deployed.
    pub fn validate(&self) -> Result<(), super::RuntimeError> {
        self.parse_segment_size()?;
        self.resolve_partition_type()?;
        if self.buffers_per_partition == 0 {
            return Err(super::RuntimeError::ConfigError(
                "buffers_per_partition must be at least 1".into(),
            ));
        }
        if self.num_subpartitions == 0 {
            return Err(super::RuntimeError::ConfigError(
                "num_subpartitions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            segment_size: "32K".to_string(),
            buffers_per_partition: 128,
            num_subpartitions: default_subpartitions(),
            partition_type: default_partition_type(),
            enable_profiling: true,
        }
    }
}
