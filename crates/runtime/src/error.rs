// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the exchange runtime.

/// Errors that can occur while deploying or running an exchange job.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The job wiring is invalid (e.g. missing producer, wrong number of
    /// consumers).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A task failed or panicked.
    #[error("task '{task}' failed: {detail}")]
    TaskFailed { task: String, detail: String },

    /// The task asked its environment for a handle it was not given.
    #[error("task '{task}' has no {handle}")]
    MissingHandle { task: String, handle: &'static str },

    /// Buffer pool error.
    #[error("buffer pool error: {0}")]
    PoolError(#[from] buffer_pool::PoolError),

    /// Result partition error.
    #[error("partition error: {0}")]
    PartitionError(#[from] result_partition::PartitionError),

    /// Input gate error.
    #[error("input gate error: {0}")]
    GateError(#[from] input_gate::GateError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
