// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Partition identifiers and partition types.

use std::fmt;
use std::str::FromStr;

/// Identifies one result partition: the producing task plus the index of the
/// partition among that task's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ResultPartitionId {
    /// Name of the producing task (e.g. `"sender-0"`).
    pub producer: String,
    /// Index of the partition among the producer's outputs.
    pub partition_index: u32,
}

impl ResultPartitionId {
    pub fn new(producer: impl Into<String>, partition_index: u32) -> Self {
        Self {
            producer: producer.into(),
            partition_index,
        }
    }
}

impl fmt::Display for ResultPartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.producer, self.partition_index)
    }
}

/// How data of a partition becomes visible to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPartitionType {
    /// Data is streamed to consumers while it is produced.
    #[default]
    Pipelined,
    /// Data can only be consumed after the producer has finished.
    Blocking,
}

impl ResultPartitionType {
    /// Returns `true` if consumers may read while the producer is running.
    pub fn is_pipelined(&self) -> bool {
        matches!(self, Self::Pipelined)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pipelined => "pipelined",
            Self::Blocking => "blocking",
        }
    }
}

impl fmt::Display for ResultPartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResultPartitionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pipelined" => Ok(Self::Pipelined),
            "blocking" => Ok(Self::Blocking),
            other => Err(format!(
                "unknown partition type '{other}'; expected 'pipelined' or 'blocking'"
            )),
        }
    }
}
