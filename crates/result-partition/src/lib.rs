// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # result-partition
//!
//! The producer side of a pipelined data exchange.
//!
//! - [`ResultPartition`] — one task's output: a set of subpartitions backed
//!   by a single [`BufferPool`](buffer_pool::BufferPool). Owns the
//!   CREATED → PRODUCING → FINISHED → RELEASED lifecycle and the producer's
//!   registration on the pool.
//! - [`ResultSubpartition`] — the FIFO queue for one consumer channel.
//! - [`SubpartitionView`] — a consumer's attachment to a subpartition.
//! - [`ResultPartitionManager`] — process-local registry consumers resolve
//!   partitions through.
//!
//! # Release Coordination
//!
//! ```text
//!   producer                         consumer channel
//!   ────────                         ────────────────
//!   ResultPartition::new             register_requester
//!     └─ register_requester          create_subpartition_view
//!   emit × N ─────► subpartition ──► poll
//!                                    release view (recycle queued)
//!                                    unregister_requester ──► pool alive
//!   release                                                  (producer
//!     ├─ destroy (deferred)                                   still
//!     └─ unregister_requester ──► pool destroyed              registered)
//! ```
//!
//! Consumption of a subpartition never releases the partition or its pool;
//! only the producer's own [`ResultPartition::release`] does, and only once.
//!
//! # Example
//! ```
//! use buffer_pool::{BufferPool, MemorySize};
//! use result_partition::{ResultPartition, ResultPartitionId, ResultPartitionType};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), result_partition::PartitionError> {
//! let id = ResultPartitionId::new("sender", 0);
//! let pool = BufferPool::new(id.to_string(), MemorySize::from_kb(1), 8)?;
//! let partition = ResultPartition::new(id, ResultPartitionType::Pipelined, 1, pool)?;
//!
//! partition.emit(&[0u8; 1024], 0).await?;
//! partition.finish()?;
//! partition.release()?;
//! assert!(partition.buffer_pool().is_destroyed());
//! # Ok(())
//! # }
//! ```

mod error;
mod id;
mod manager;
pub mod partition;
pub mod subpartition;

pub use error::PartitionError;
pub use id::{ResultPartitionId, ResultPartitionType};
pub use manager::ResultPartitionManager;
pub use partition::{PartitionState, ResultPartition, SubpartitionView};
pub use subpartition::{AvailabilityListener, BufferAndBacklog, ResultSubpartition, SubpartitionPoll};
