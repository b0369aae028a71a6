// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for input channels and gates.

use buffer_pool::PoolError;
use result_partition::PartitionError;

/// Errors that can occur on the consuming side of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// `request_partitions` was called before the recovery handshake.
    #[error("gate '{0}': recovered state must be consumed before requesting partitions")]
    RecoveredStateNotConsumed(String),

    /// Data was requested before the gate's partitions were requested.
    #[error("gate '{0}': partitions have not been requested")]
    PartitionsNotRequested(String),

    /// The channel has already been released.
    #[error("input channel {0} has been released")]
    ChannelReleased(usize),

    /// The gate has been closed.
    #[error("gate '{0}' is closed")]
    GateClosed(String),

    /// Error from the upstream partition.
    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),

    /// Error from the upstream buffer pool.
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),
}
