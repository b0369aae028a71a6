// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Invokable tasks: the code that runs on either side of an exchange.
//!
//! - [`SlowBufferSender`] — emits a fixed number of records with a pause
//!   between them, keeping its partition in PRODUCING for a while.
//! - [`PartialReceiver`] — reads a few buffers and then stops, releasing its
//!   channels while the producer is still running.
//! - [`SingleBufferReceiver`] — a [`PartialReceiver`] that reads exactly one.
//!
//! Progress can be published through a [`tokio::sync::watch`] channel so a
//! receiver can stop at a chosen point of the producer's stream instead of
//! relying on wall-clock timing.

use crate::environment::TaskEnvironment;
use crate::RuntimeError;
use std::time::Duration;
use tokio::sync::watch;

/// What a task did, reported back to its environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub records: usize,
    pub bytes: usize,
}

/// A unit of work run against a [`TaskEnvironment`].
#[async_trait::async_trait]
pub trait Invokable: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the task. Cleanup of the environment's handles is not the
    /// task's business; the environment does it afterwards.
    async fn invoke(&self, env: &TaskEnvironment) -> Result<TaskReport, RuntimeError>;
}

// ── Producer ───────────────────────────────────────────────────

/// Emits `num_records` records of `record_size` bytes, sleeping `gap`
/// between them.
#[derive(Debug)]
pub struct SlowBufferSender {
    num_records: usize,
    record_size: usize,
    gap: Duration,
    subpartition: Option<usize>,
    progress: Option<watch::Sender<usize>>,
}

impl SlowBufferSender {
    pub fn new(num_records: usize, record_size: usize, gap: Duration) -> Self {
        Self {
            num_records,
            record_size,
            gap,
            subpartition: None,
            progress: None,
        }
    }

    /// Emits only into `index` instead of broadcasting to every subpartition.
    pub fn to_subpartition(mut self, index: usize) -> Self {
        self.subpartition = Some(index);
        self
    }

    /// Publishes the number of records emitted so far after every emit.
    pub fn with_progress(mut self, progress: watch::Sender<usize>) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait::async_trait]
impl Invokable for SlowBufferSender {
    fn name(&self) -> &str {
        "slow-buffer-sender"
    }

    async fn invoke(&self, env: &TaskEnvironment) -> Result<TaskReport, RuntimeError> {
        let writer = env.writer()?;
        let mut record = vec![0u8; self.record_size];

        for i in 0..self.num_records {
            record.fill(i as u8);
            match self.subpartition {
                Some(index) => writer.emit(&record, index).await?,
                None => writer.broadcast(&record).await?,
            }
            tracing::debug!("'{}' emitted record {}/{}", env.task_name(), i + 1, self.num_records);
            if let Some(progress) = &self.progress {
                progress.send_replace(i + 1);
            }
            if !self.gap.is_zero() && i + 1 < self.num_records {
                tokio::time::sleep(self.gap).await;
            }
        }

        Ok(TaskReport {
            records: self.num_records,
            bytes: self.num_records * self.record_size,
        })
    }
}

// ── Consumers ──────────────────────────────────────────────────

/// Reads at most `buffers_to_read` buffers, then stops.
///
/// With a progress gate set, the receiver additionally waits until the
/// producer has emitted a given number of records before it returns, so the
/// channel release is guaranteed to happen mid-stream.
#[derive(Debug)]
pub struct PartialReceiver {
    buffers_to_read: usize,
    release_after: Option<(watch::Receiver<usize>, usize)>,
}

impl PartialReceiver {
    pub fn new(buffers_to_read: usize) -> Self {
        Self {
            buffers_to_read,
            release_after: None,
        }
    }

    /// Reads until end-of-stream.
    pub fn draining() -> Self {
        Self::new(usize::MAX)
    }

    /// Holds the channel open until the producer reported `emitted` records.
    pub fn release_after(mut self, progress: watch::Receiver<usize>, emitted: usize) -> Self {
        self.release_after = Some((progress, emitted));
        self
    }
}

#[async_trait::async_trait]
impl Invokable for PartialReceiver {
    fn name(&self) -> &str {
        "partial-receiver"
    }

    async fn invoke(&self, env: &TaskEnvironment) -> Result<TaskReport, RuntimeError> {
        let gate = env.input_gate()?;
        let mut report = TaskReport::default();

        while report.records < self.buffers_to_read {
            let Some(next) = gate.get_next().await? else {
                tracing::debug!("'{}' reached end of stream", env.task_name());
                break;
            };
            report.records += 1;
            report.bytes += next.buffer.len();
            next.buffer.recycle()?;
        }

        if let Some((progress, emitted)) = &self.release_after {
            let mut progress = progress.clone();
            // A sender that is gone has emitted all it ever will.
            let _ = progress.wait_for(|n| *n >= *emitted).await;
        }

        tracing::debug!(
            "'{}' stopping after {} of {} requested buffers",
            env.task_name(),
            report.records,
            if self.buffers_to_read == usize::MAX {
                "all".to_string()
            } else {
                self.buffers_to_read.to_string()
            },
        );
        Ok(report)
    }
}

/// Reads exactly one buffer and finishes.
#[derive(Debug, Default)]
pub struct SingleBufferReceiver;

#[async_trait::async_trait]
impl Invokable for SingleBufferReceiver {
    fn name(&self) -> &str {
        "single-buffer-receiver"
    }

    async fn invoke(&self, env: &TaskEnvironment) -> Result<TaskReport, RuntimeError> {
        PartialReceiver::new(1).invoke(env).await
    }
}
