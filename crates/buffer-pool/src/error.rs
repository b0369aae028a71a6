// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for buffer pools.

/// Errors that can occur while requesting, writing, or recycling buffers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool has been destroyed (or destruction has been requested) and
    /// no longer hands out buffers or accepts new requesters.
    #[error("buffer pool of partition '{partition}' has been destroyed")]
    PoolDestroyed { partition: String },

    /// A lifecycle invariant was broken. Never expected in a correct program.
    #[error("buffer pool invariant violated: {0}")]
    InvariantViolation(String),

    /// The payload does not fit into a single memory segment.
    #[error("record of {record_bytes} bytes does not fit into a {segment_bytes} byte segment")]
    RecordTooLarge {
        record_bytes: usize,
        segment_bytes: usize,
    },

    /// The buffer has been retained and can no longer be written.
    #[error("buffer is shared by {holders} holders and cannot be written")]
    BufferShared { holders: usize },

    /// Attempted to configure a zero-sized segment or pool.
    #[error("cannot create a zero-sized {0}")]
    ZeroSized(&'static str),

    /// A human-readable size string could not be parsed.
    #[error("invalid size: {0}")]
    InvalidSize(String),
}

/// Logs and panics on a broken invariant in a path that cannot return an
/// error (e.g. `Drop`).
pub(crate) fn fail_invariant(detail: String) {
    tracing::error!("buffer pool invariant violated: {detail}");
    if !std::thread::panicking() {
        panic!("{}", PoolError::InvariantViolation(detail));
    }
}
