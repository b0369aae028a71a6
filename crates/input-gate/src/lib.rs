// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # input-gate
//!
//! The consumer side of a pipelined data exchange.
//!
//! - [`InputChannel`] — the capability set {request subpartition, poll,
//!   release} every channel variant provides.
//! - [`LocalInputChannel`] — reads directly from a subpartition produced in
//!   the same process, resolved through a
//!   [`ResultPartitionManager`](result_partition::ResultPartitionManager).
//! - [`InputGate`] — one pull interface over all channels of a consuming
//!   task, with the recovered-state handshake that must precede partition
//!   requests.
//!
//! A channel registers as a requester of the upstream
//! [`BufferPool`](buffer_pool::BufferPool) when it requests its
//! subpartition and unregisters exactly once when released, after its
//! buffers have been recycled. Releasing a channel early never destroys a
//! pool the producer is still using: the producer holds its own
//! registration until it releases its partition.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use buffer_pool::{BufferPool, MemorySize};
//! use input_gate::{InputChannel, InputGate, LocalInputChannel};
//! use result_partition::{
//!     ResultPartition, ResultPartitionId, ResultPartitionManager, ResultPartitionType,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), input_gate::GateError> {
//! let manager = Arc::new(ResultPartitionManager::new());
//! let id = ResultPartitionId::new("sender", 0);
//! let pool = BufferPool::new(id.to_string(), MemorySize::from_kb(1), 4)?;
//! let partition = ResultPartition::new(id.clone(), ResultPartitionType::Pipelined, 1, pool)?;
//! manager.register(Arc::clone(&partition))?;
//!
//! let channel = LocalInputChannel::new(0, id, 0, Arc::clone(&manager));
//! let gate = InputGate::new("receiver", vec![Box::new(channel) as Box<dyn InputChannel>]);
//! gate.finish_read_recovered_state();
//! gate.request_partitions()?;
//!
//! partition.emit(b"hello", 0).await?;
//! let next = gate.get_next().await?.expect("one buffer");
//! assert_eq!(next.buffer.as_slice(), b"hello");
//! drop(next);
//!
//! gate.close()?;
//! assert!(!partition.buffer_pool().is_destroyed());
//! partition.release()?;
//! assert!(partition.buffer_pool().is_destroyed());
//! # Ok(())
//! # }
//! ```

pub mod channel;
mod error;
pub mod gate;

pub use channel::{ChannelPoll, ChannelStatus, InputChannel, LocalInputChannel};
pub use error::GateError;
pub use gate::{BufferOrEvent, InputGate};
