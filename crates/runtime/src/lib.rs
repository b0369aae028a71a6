// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The task layer that drives a pipelined data exchange end to end.
//!
//! The runtime takes:
//! - An [`ExchangeConfig`] (segment size, pool capacity, partition type).
//! - A producer [`Invokable`] and one consumer [`Invokable`] per
//!   subpartition.
//!
//! And deploys a `BufferPool` + `ResultPartition` for the producer and an
//! `InputGate` per consumer, runs every task, and guarantees the
//! finish / release / close calls the exchange core relies on, including on
//! failure and cancellation.
//!
//! # Type-State Pipeline
//! ```text
//! ExchangeJob<Configured> → ExchangeJob<Deployed> → JobOutput
//! ```
//! Transitions are compile-time checked.
//!
//! # Async Execution
//! Every task is spawned onto the ambient `tokio` runtime, so producer and
//! consumers are scheduled independently and only meet at the partition.

mod config;
mod engine;
mod environment;
mod error;
mod metrics;
pub mod task;

pub use config::ExchangeConfig;
pub use engine::{Configured, Deployed, ExchangeJob, JobOutput, JobState};
pub use environment::TaskEnvironment;
pub use error::RuntimeError;
pub use metrics::{ExchangeMetrics, TaskMetrics, TaskRole};
pub use task::{Invokable, PartialReceiver, SingleBufferReceiver, SlowBufferSender, TaskReport};
