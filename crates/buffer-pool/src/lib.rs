// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # buffer-pool
//!
//! Bounded pools of fixed-size, reference-counted buffers. One pool backs one
//! result partition and is shared between the producing task and every
//! consuming channel of that partition.
//!
//! # Key Components
//!
//! - [`BufferPool`] — hands out at most `capacity` segments, suspends
//!   requesters when exhausted, and tracks active requesters and outstanding
//!   buffers as two independent counters.
//! - [`Buffer`] — a handle to one segment with an explicit reference count.
//!   Dropping or recycling the last handle returns the segment to its pool.
//! - [`MemorySize`] — human-readable segment sizes (`"32K"`, `"1M"`).
//! - [`PoolStats`] — handout, reuse and backpressure counters.
//!
//! # Ownership Model
//!
//! ```text
//! BufferPool ──Arc──► PoolInner ◄──Weak── Segment ◄──Arc── Buffer (× ref_count)
//!                         ▲                  │
//!                         │  last reference  │
//!                         └──── recycle ─────┘
//! ```
//!
//! Segments point back to the pool weakly, so a buffer can never keep a pool
//! alive. The pool's *lifecycle* is governed by requesters instead: it is
//! destroyed only after destruction was requested, every requester has
//! unregistered, and every buffer has been recycled.
//!
//! # Example
//! ```
//! use buffer_pool::{BufferPool, MemorySize};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), buffer_pool::PoolError> {
//! let pool = BufferPool::new("partition-0", MemorySize::from_kb(32), 128)?;
//!
//! let mut buffer = pool.request_buffer().await?;
//! buffer.write(b"payload")?;
//! let shared = buffer.retain();
//! assert_eq!(shared.ref_count(), 2);
//!
//! buffer.recycle()?;
//! shared.recycle()?;
//! assert_eq!(pool.outstanding_buffers(), 0);
//! # Ok(())
//! # }
//! ```

mod buffer;
mod error;
pub mod pool;
mod size;
mod stats;

pub use buffer::Buffer;
pub use error::PoolError;
pub use pool::BufferPool;
pub use size::MemorySize;
pub use stats::PoolStats;
