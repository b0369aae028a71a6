// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for result partitions.

use crate::ResultPartitionId;
use buffer_pool::PoolError;

/// Errors that can occur while producing into or consuming from a partition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// `emit` was called after `finish`. A producer logic error.
    #[error("partition {0} is finished and accepts no more data")]
    PartitionClosed(ResultPartitionId),

    /// The partition has been released; no data can be produced or consumed.
    #[error("partition {0} has been released")]
    PartitionReleased(ResultPartitionId),

    /// The addressed subpartition does not exist.
    #[error("subpartition index {index} out of range for partition {partition} with {count} subpartitions")]
    SubpartitionOutOfRange {
        partition: ResultPartitionId,
        index: usize,
        count: usize,
    },

    /// No partition with this id is registered with the partition manager.
    #[error("partition {0} not found")]
    PartitionNotFound(ResultPartitionId),

    /// A partition with this id is already registered.
    #[error("partition {0} is already registered")]
    DuplicatePartition(ResultPartitionId),

    /// A blocking partition can only be consumed after it has finished.
    #[error("blocking partition {0} is not finished and cannot be consumed yet")]
    NotConsumable(ResultPartitionId),

    /// A blocking partition ran out of buffers. Nothing reads it before it
    /// finishes, so no buffer would ever come back.
    #[error("blocking partition {partition} exhausted its pool of {capacity} buffers")]
    BlockingPoolExhausted {
        partition: ResultPartitionId,
        capacity: usize,
    },

    /// A partition must have at least one subpartition.
    #[error("partition {0} must have at least one subpartition")]
    NoSubpartitions(ResultPartitionId),

    /// Error from the partition's buffer pool.
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),
}
