// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The task environment: the handles a task runs against and the cleanup
//! that always follows it.
//!
//! Whatever happens to a task (success, error, cancellation by dropping its
//! future) the environment:
//! - finishes the task's result partition on success and releases it (unless
//!   release is deferred to the job), or fails it otherwise, so the
//!   producer's pool interest is given up exactly once;
//! - closes the task's input gate, releasing every channel.

use crate::metrics::{TaskMetrics, TaskRole};
use crate::task::Invokable;
use crate::RuntimeError;
use input_gate::InputGate;
use result_partition::{PartitionError, ResultPartition, ResultPartitionManager};
use std::sync::Arc;
use std::time::Instant;

/// Handles handed to one running task.
pub struct TaskEnvironment {
    task_name: String,
    manager: Arc<ResultPartitionManager>,
    writer: Option<Arc<ResultPartition>>,
    release_on_finish: bool,
    gate: Option<InputGate>,
}

impl TaskEnvironment {
    pub fn new(task_name: impl Into<String>, manager: Arc<ResultPartitionManager>) -> Self {
        Self {
            task_name: task_name.into(),
            manager,
            writer: None,
            release_on_finish: true,
            gate: None,
        }
    }

    /// Gives the task a result partition to produce into.
    pub fn with_writer(mut self, partition: Arc<ResultPartition>) -> Self {
        self.writer = Some(partition);
        self
    }

    /// Leaves a successfully finished partition registered; whoever owns the
    /// job releases it once its consumers are done.
    pub fn defer_release(mut self) -> Self {
        self.release_on_finish = false;
        self
    }

    /// Gives the task an input gate to consume from.
    pub fn with_input_gate(mut self, gate: InputGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The partition this task produces into.
    pub fn writer(&self) -> Result<&ResultPartition, RuntimeError> {
        self.writer
            .as_deref()
            .ok_or_else(|| RuntimeError::MissingHandle {
                task: self.task_name.clone(),
                handle: "result partition",
            })
    }

    /// The gate this task consumes from.
    pub fn input_gate(&self) -> Result<&InputGate, RuntimeError> {
        self.gate.as_ref().ok_or_else(|| RuntimeError::MissingHandle {
            task: self.task_name.clone(),
            handle: "input gate",
        })
    }

    fn role(&self) -> TaskRole {
        if self.writer.is_some() {
            TaskRole::Producer
        } else {
            TaskRole::Consumer
        }
    }

    /// Runs `task` to completion, then cleans up its handles.
    ///
    /// The task's own error takes precedence over a cleanup error.
    pub async fn execute(mut self, task: &dyn Invokable) -> Result<TaskMetrics, RuntimeError> {
        let role = self.role();
        let start = Instant::now();
        tracing::info!("task '{}' started ({role:?})", self.task_name);

        let result = task.invoke(&self).await;
        let cleanup = match &result {
            Ok(_) => self.cleanup(None),
            Err(e) => {
                tracing::warn!("task '{}' failed: {e}", self.task_name);
                self.cleanup(Some(&e.to_string()))
            }
        };
        let report = result?;
        cleanup?;

        let duration = start.elapsed();
        tracing::info!(
            "task '{}' finished: {} records, {} bytes in {:.2}ms",
            self.task_name,
            report.records,
            report.bytes,
            duration.as_secs_f64() * 1000.0,
        );
        Ok(TaskMetrics {
            task_name: self.task_name.clone(),
            role,
            records: report.records,
            bytes: report.bytes,
            duration,
        })
    }

    /// Closes the gate and finishes/fails the writer. Every handle is
    /// cleaned up even if one fails; the first error is returned.
    fn cleanup(&mut self, failure: Option<&str>) -> Result<(), RuntimeError> {
        let mut first_error: Option<RuntimeError> = None;

        if let Some(gate) = self.gate.take() {
            if let Err(e) = gate.close() {
                first_error.get_or_insert(e.into());
            }
        }

        if let Some(writer) = self.writer.take() {
            let result = match failure {
                None if self.release_on_finish => {
                    writer.finish().and_then(|()| self.release_writer(&writer))
                }
                None => {
                    tracing::debug!("partition {} finished; release deferred", writer.id());
                    writer.finish()
                }
                Some(cause) => self.fail_writer(&writer, cause),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e.into());
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn release_writer(&self, writer: &ResultPartition) -> Result<(), PartitionError> {
        match self.manager.release_partition(writer.id()) {
            Err(PartitionError::PartitionNotFound(_)) => writer.release(),
            other => other,
        }
    }

    fn fail_writer(&self, writer: &ResultPartition, cause: &str) -> Result<(), PartitionError> {
        match self.manager.fail_partition(writer.id(), cause) {
            Err(PartitionError::PartitionNotFound(_)) => writer.fail(cause),
            other => other,
        }
    }
}

impl Drop for TaskEnvironment {
    fn drop(&mut self) {
        if self.writer.is_none() && self.gate.is_none() {
            return;
        }
        tracing::warn!("task '{}' cancelled before cleanup", self.task_name);
        if let Err(e) = self.cleanup(Some("task cancelled")) {
            tracing::error!("task '{}' cleanup failed: {e}", self.task_name);
        }
    }
}

impl std::fmt::Debug for TaskEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnvironment")
            .field("task", &self.task_name)
            .field("writer", &self.writer.as_ref().map(|w| w.id().to_string()))
            .field("gate", &self.gate.as_ref().map(|g| g.name().to_string()))
            .finish()
    }
}
