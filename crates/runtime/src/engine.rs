// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The exchange job runner with a type-state–enforced lifecycle.
//!
//! ```text
//! ExchangeJob<Configured>
//!     │  .deploy()
//!     ▼
//! ExchangeJob<Deployed>
//!     │  .run()
//!     ▼
//!   JobOutput
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error.
//!
//! A job wires one producer task to one consumer task per subpartition,
//! point-wise: subpartition *i* is read by consumer *i* through a single
//! [`LocalInputChannel`]. The producer only finishes its partition; the job
//! releases it after every consumer has completed, which is the moment the
//! pool can be reclaimed.

use crate::environment::TaskEnvironment;
use crate::metrics::TaskMetrics;
use crate::task::Invokable;
use crate::{ExchangeConfig, ExchangeMetrics, RuntimeError};
use buffer_pool::BufferPool;
use input_gate::{InputChannel, InputGate, LocalInputChannel};
use result_partition::{
    PartitionError, ResultPartition, ResultPartitionId, ResultPartitionManager,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

// ── Type-state markers ─────────────────────────────────────────

/// Job is configured; nothing has been allocated.
#[derive(Debug)]
pub struct Configured;

/// Partition, pool and gates exist; tasks have not started.
#[derive(Debug)]
pub struct Deployed;

/// Sealed trait for job states.
pub trait JobState: std::fmt::Debug {}
impl JobState for Configured {}
impl JobState for Deployed {}

// ── Job output ─────────────────────────────────────────────────

/// The result of a job run.
#[derive(Debug)]
pub struct JobOutput {
    pub metrics: ExchangeMetrics,
    /// Whether the partition's pool completed destruction.
    pub pool_destroyed: bool,
    /// Requesters still registered on the pool after every task finished.
    pub active_requesters: usize,
}

// ── Job ────────────────────────────────────────────────────────

/// One producer task and its consumers, exchanging data through a single
/// result partition.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use runtime::{ExchangeConfig, ExchangeJob, SingleBufferReceiver, SlowBufferSender};
///
/// # async fn example() -> Result<(), runtime::RuntimeError> {
/// let output = ExchangeJob::new(ExchangeConfig::default())
///     .with_sender(SlowBufferSender::new(8, 1024, Duration::from_millis(50)))
///     .with_receiver(SingleBufferReceiver)
///     .deploy()?
///     .run()
///     .await?;
/// assert!(output.pool_destroyed);
/// println!("{}", output.metrics.summary());
/// # Ok(())
/// # }
/// ```
pub struct ExchangeJob<S: JobState = Configured> {
    config: ExchangeConfig,
    name: String,
    manager: Arc<ResultPartitionManager>,
    sender: Option<Arc<dyn Invokable>>,
    receivers: Vec<Arc<dyn Invokable>>,
    _state: std::marker::PhantomData<S>,
    // Populated on deploy:
    partition: Option<Arc<ResultPartition>>,
    gates: Vec<InputGate>,
}

// ── Configured → Deployed ──────────────────────────────────────

impl ExchangeJob<Configured> {
    /// Creates a job with its own partition manager.
    pub fn new(config: ExchangeConfig) -> Self {
        Self::with_manager(config, Arc::new(ResultPartitionManager::new()))
    }

    /// Creates a job that registers its partition with `manager`.
    pub fn with_manager(config: ExchangeConfig, manager: Arc<ResultPartitionManager>) -> Self {
        Self {
            config,
            name: "exchange".to_string(),
            manager,
            sender: None,
            receivers: Vec::new(),
            _state: std::marker::PhantomData,
            partition: None,
            gates: Vec::new(),
        }
    }

    /// Names the job; the producer's partition id is derived from it.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sender(mut self, task: impl Invokable + 'static) -> Self {
        self.sender = Some(Arc::new(task));
        self
    }

    /// Adds the consumer of the next subpartition.
    pub fn with_receiver(mut self, task: impl Invokable + 'static) -> Self {
        self.receivers.push(Arc::new(task));
        self
    }

    /// Creates the pool, the partition and one gate per consumer, and
    /// completes every gate's recovery handshake.
    /// Transitions to the `Deployed` state.
    pub fn deploy(self) -> Result<ExchangeJob<Deployed>, RuntimeError> {
        self.config.validate()?;
        if self.sender.is_none() {
            return Err(RuntimeError::InvalidJob(format!("job '{}' has no sender", self.name)));
        }
        if self.receivers.len() != self.config.num_subpartitions {
            return Err(RuntimeError::InvalidJob(format!(
                "job '{}' has {} receivers for {} subpartitions",
                self.name,
                self.receivers.len(),
                self.config.num_subpartitions,
            )));
        }

        let segment_size = self.config.parse_segment_size()?;
        let partition_type = self.config.resolve_partition_type()?;
        let id = ResultPartitionId::new(format!("{}-sender", self.name), 0);

        let pool = BufferPool::new(id.to_string(), segment_size, self.config.buffers_per_partition)?;
        tracing::info!(
            "pool created: {} buffers of {segment_size}",
            self.config.buffers_per_partition
        );
        let partition = ResultPartition::new(
            id.clone(),
            partition_type,
            self.config.num_subpartitions,
            pool,
        )?;
        self.manager.register(Arc::clone(&partition))?;

        let gates: Vec<InputGate> = (0..self.config.num_subpartitions)
            .map(|i| {
                let channel = LocalInputChannel::new(0, id.clone(), i, Arc::clone(&self.manager));
                let gate = InputGate::new(
                    format!("{}-receiver-{i}", self.name),
                    vec![Box::new(channel) as Box<dyn InputChannel>],
                );
                // Nothing to recover: the handshake completes immediately.
                gate.finish_read_recovered_state();
                gate
            })
            .collect();

        Ok(ExchangeJob {
            config: self.config,
            name: self.name,
            manager: self.manager,
            sender: self.sender,
            receivers: self.receivers,
            _state: std::marker::PhantomData,
            partition: Some(partition),
            gates,
        })
    }
}

// ── Deployed: run ──────────────────────────────────────────────

impl ExchangeJob<Deployed> {
    /// The producer's partition.
    pub fn partition(&self) -> Option<&Arc<ResultPartition>> {
        self.partition.as_ref()
    }

    /// The partition's pool.
    pub fn buffer_pool(&self) -> Option<&BufferPool> {
        self.partition.as_ref().map(|p| p.buffer_pool())
    }

    pub fn manager(&self) -> &Arc<ResultPartitionManager> {
        &self.manager
    }

    /// Runs the producer and every consumer to completion.
    ///
    /// Pipelined partitions are consumed while they are produced: every
    /// gate requests its partition before the producer starts. Blocking
    /// partitions are only requested once the producer has finished, so the
    /// pool must hold the whole stream; a producer that outgrows it fails
    /// the job instead of waiting for a consumer that never comes.
    ///
    /// All tasks are awaited even if one fails; the first failure is
    /// returned.
    pub async fn run(mut self) -> Result<JobOutput, RuntimeError> {
        let run_start = Instant::now();
        let (Some(partition), Some(sender)) = (self.partition.take(), self.sender.take()) else {
            return Err(RuntimeError::InvalidJob(format!(
                "job '{}' was not deployed",
                self.name
            )));
        };
        let pool = partition.buffer_pool().clone();
        let partition_id = partition.id().clone();
        let pipelined = partition.partition_type().is_pipelined();
        let gates = std::mem::take(&mut self.gates);
        let receivers = std::mem::take(&mut self.receivers);

        tracing::info!(
            "job '{}' starting: {} partition, {} consumers",
            self.name,
            partition.partition_type(),
            receivers.len(),
        );

        let producer_env = TaskEnvironment::new(format!("{}-sender", self.name), Arc::clone(&self.manager))
            .with_writer(partition)
            .defer_release();

        let mut results: Vec<Result<TaskMetrics, RuntimeError>> = Vec::new();
        let consumers = if pipelined {
            let (consumers, setup) =
                Self::spawn_consumers(&self.name, &self.manager, gates, receivers).await;
            match setup {
                // Without every consumer attached the producer could block
                // forever on a full pool; fail it instead of running it.
                Some(e) => {
                    drop(producer_env);
                    results.push(Err(e));
                }
                None => results.push(Self::join(spawn_task(producer_env, sender)).await),
            }
            consumers
        } else {
            let produced = Self::join(spawn_task(producer_env, sender)).await;
            let failed = produced.is_err();
            results.push(produced);
            if failed {
                // The failed partition is gone; nothing is left to consume.
                Vec::new()
            } else {
                let (consumers, setup) =
                    Self::spawn_consumers(&self.name, &self.manager, gates, receivers).await;
                results.extend(setup.map(Err));
                consumers
            }
        };
        for consumer in consumers {
            results.push(Self::join(consumer).await);
        }

        // A failed producer has already released its partition.
        match self.manager.release_partition(&partition_id) {
            Ok(()) | Err(PartitionError::PartitionNotFound(_)) => {}
            Err(e) => results.push(Err(e.into())),
        }

        let mut metrics = ExchangeMetrics::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(task) => metrics.record_task(task, self.config.enable_profiling),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        metrics.finalise(run_start.elapsed(), pool.stats());
        tracing::info!("{}", metrics.summary());
        Ok(JobOutput {
            metrics,
            pool_destroyed: pool.is_destroyed(),
            active_requesters: pool.active_requesters(),
        })
    }

    /// Releases the deployed partition without running any task.
    pub fn cancel(mut self) -> Result<(), RuntimeError> {
        self.gates.clear();
        if let Some(partition) = self.partition.take() {
            self.manager.fail_partition(partition.id(), "job cancelled")?;
        }
        Ok(())
    }

    /// Requests every gate's partition and spawns its consumer. Stops at the
    /// first gate that cannot be set up; its remaining gates are dropped,
    /// which releases their channels.
    async fn spawn_consumers(
        job: &str,
        manager: &Arc<ResultPartitionManager>,
        gates: Vec<InputGate>,
        receivers: Vec<Arc<dyn Invokable>>,
    ) -> (Vec<JoinHandle<Result<TaskMetrics, RuntimeError>>>, Option<RuntimeError>) {
        let mut handles = Vec::with_capacity(gates.len());
        for (i, (gate, receiver)) in gates.into_iter().zip(receivers).enumerate() {
            gate.state_consumed().await;
            if let Err(e) = gate.request_partitions() {
                tracing::error!("job '{job}' consumer {i} could not request its partition: {e}");
                return (handles, Some(e.into()));
            }
            let env = TaskEnvironment::new(format!("{job}-receiver-{i}"), Arc::clone(manager))
                .with_input_gate(gate);
            handles.push(spawn_task(env, receiver));
        }
        (handles, None)
    }

    async fn join(
        handle: JoinHandle<Result<TaskMetrics, RuntimeError>>,
    ) -> Result<TaskMetrics, RuntimeError> {
        handle.await.map_err(|e| RuntimeError::TaskFailed {
            task: "<spawned>".into(),
            detail: format!("task panicked or was cancelled: {e}"),
        })?
    }
}

fn spawn_task(
    env: TaskEnvironment,
    task: Arc<dyn Invokable>,
) -> JoinHandle<Result<TaskMetrics, RuntimeError>> {
    tokio::spawn(async move { env.execute(task.as_ref()).await })
}

impl<S: JobState> std::fmt::Debug for ExchangeJob<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeJob")
            .field("state", &std::any::type_name::<S>())
            .field("name", &self.name)
            .field("segment_size", &self.config.segment_size)
            .field("has_sender", &self.sender.is_some())
            .field("receivers", &self.receivers.len())
            .field("has_partition", &self.partition.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{PartialReceiver, SlowBufferSender};
    use std::time::Duration;

    fn config(buffers: usize, subpartitions: usize) -> ExchangeConfig {
        ExchangeConfig {
            segment_size: "1K".into(),
            buffers_per_partition: buffers,
            num_subpartitions: subpartitions,
            ..Default::default()
        }
    }

    #[test]
    fn test_configured_to_deployed() {
        let job = ExchangeJob::new(config(4, 2))
            .named("t")
            .with_sender(SlowBufferSender::new(1, 8, Duration::ZERO))
            .with_receiver(PartialReceiver::draining())
            .with_receiver(PartialReceiver::draining())
            .deploy()
            .unwrap();

        let partition = job.partition().unwrap();
        assert_eq!(partition.id().to_string(), "t-sender#0");
        assert_eq!(partition.num_subpartitions(), 2);
        assert_eq!(job.buffer_pool().unwrap().capacity(), 4);
        assert_eq!(job.manager().num_partitions(), 1);
    }

    #[test]
    fn test_deploy_rejects_bad_wiring() {
        let no_sender = ExchangeJob::new(config(4, 1)).with_receiver(PartialReceiver::draining());
        assert!(matches!(no_sender.deploy(), Err(RuntimeError::InvalidJob(_))));

        let too_few = ExchangeJob::new(config(4, 2))
            .with_sender(SlowBufferSender::new(1, 8, Duration::ZERO))
            .with_receiver(PartialReceiver::draining());
        assert!(matches!(too_few.deploy(), Err(RuntimeError::InvalidJob(_))));
    }

    #[tokio::test]
    async fn test_full_drain() {
        let output = ExchangeJob::new(config(2, 1))
            .with_sender(SlowBufferSender::new(10, 100, Duration::ZERO))
            .with_receiver(PartialReceiver::draining())
            .deploy()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(output.metrics.records_emitted, 10);
        assert_eq!(output.metrics.records_consumed, 10);
        assert!(output.pool_destroyed);
        assert_eq!(output.active_requesters, 0);
        assert_eq!(output.metrics.task_metrics.len(), 2);
    }

    #[tokio::test]
    async fn test_blocking_partition_consumed_after_finish() {
        let cfg = ExchangeConfig {
            partition_type: "blocking".into(),
            ..config(8, 1)
        };
        let job = ExchangeJob::new(cfg)
            .with_sender(SlowBufferSender::new(4, 16, Duration::ZERO))
            .with_receiver(PartialReceiver::draining())
            .deploy()
            .unwrap();

        let output = job.run().await.unwrap();
        assert_eq!(output.metrics.records_consumed, 4);
        assert_eq!(output.metrics.pool_stats.backpressure_waits, 0);
        assert!(output.pool_destroyed);
    }

    #[test]
    fn test_cancel_releases_partition() {
        let job = ExchangeJob::new(config(4, 1))
            .with_sender(SlowBufferSender::new(1, 8, Duration::ZERO))
            .with_receiver(PartialReceiver::draining())
            .deploy()
            .unwrap();
        let pool = job.buffer_pool().unwrap().clone();
        let manager = Arc::clone(job.manager());

        job.cancel().unwrap();
        assert!(pool.is_destroyed());
        assert_eq!(manager.num_partitions(), 0);
    }

    #[test]
    fn test_debug_format() {
        let job = ExchangeJob::new(ExchangeConfig::default());
        let debug = format!("{job:?}");
        assert!(debug.contains("ExchangeJob"));
        assert!(debug.contains("Configured"));
    }
}
