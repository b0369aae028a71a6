// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The producer side of a data exchange.
//!
//! ```text
//! CREATED ──emit/start──► PRODUCING ──finish──► FINISHED
//!    │                        │                     │
//!    └────────── release / fail (exactly once) ─────┴──► RELEASED
//! ```
//!
//! A [`ResultPartition`] registers the producer as a requester of its
//! [`BufferPool`] when it is created and unregisters exactly once on
//! release. Consumers register separately through their channels, so the
//! pool is destroyed only after the producer *and* every consumer are gone.

use crate::subpartition::{AvailabilityListener, ResultSubpartition, SubpartitionPoll};
use crate::{PartitionError, ResultPartitionId, ResultPartitionType};
use buffer_pool::{BufferPool, PoolError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Production state of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum PartitionState {
    Created,
    Producing,
    Finished,
    Released,
}

/// The output of one producing task: a set of subpartitions backed by one
/// buffer pool.
pub struct ResultPartition {
    id: ResultPartitionId,
    partition_type: ResultPartitionType,
    subpartitions: Vec<ResultSubpartition>,
    pool: BufferPool,
    state: Mutex<PartitionState>,
    /// Guards the producer's single unregister.
    released: AtomicBool,
    consumed_subpartitions: AtomicUsize,
}

impl ResultPartition {
    /// Creates a partition with `num_subpartitions` queues and registers the
    /// producer as a requester of `pool`.
    pub fn new(
        id: ResultPartitionId,
        partition_type: ResultPartitionType,
        num_subpartitions: usize,
        pool: BufferPool,
    ) -> Result<Arc<Self>, PartitionError> {
        if num_subpartitions == 0 {
            return Err(PartitionError::NoSubpartitions(id));
        }
        pool.register_requester()?;

        let subpartitions = (0..num_subpartitions)
            .map(|i| ResultSubpartition::new(id.clone(), i))
            .collect();

        tracing::info!(
            "partition {id} created: {partition_type}, {num_subpartitions} subpartitions, {} buffers",
            pool.capacity(),
        );

        Ok(Arc::new(Self {
            id,
            partition_type,
            subpartitions,
            pool,
            state: Mutex::new(PartitionState::Created),
            released: AtomicBool::new(false),
            consumed_subpartitions: AtomicUsize::new(0),
        }))
    }

    fn lock_state(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &ResultPartitionId {
        &self.id
    }

    pub fn partition_type(&self) -> ResultPartitionType {
        self.partition_type
    }

    pub fn state(&self) -> PartitionState {
        *self.lock_state()
    }

    pub fn num_subpartitions(&self) -> usize {
        self.subpartitions.len()
    }

    /// The pool backing this partition.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn subpartition(&self, index: usize) -> Result<&ResultSubpartition, PartitionError> {
        self.subpartitions
            .get(index)
            .ok_or_else(|| PartitionError::SubpartitionOutOfRange {
                partition: self.id.clone(),
                index,
                count: self.subpartitions.len(),
            })
    }

    /// Moves CREATED → PRODUCING; fails if the partition no longer accepts data.
    pub fn start(&self) -> Result<(), PartitionError> {
        let mut state = self.lock_state();
        match *state {
            PartitionState::Created => {
                *state = PartitionState::Producing;
                tracing::debug!("partition {} producing", self.id);
                Ok(())
            }
            PartitionState::Producing => Ok(()),
            PartitionState::Finished => Err(PartitionError::PartitionClosed(self.id.clone())),
            PartitionState::Released => Err(PartitionError::PartitionReleased(self.id.clone())),
        }
    }

    /// Copies `data` into a pooled buffer and enqueues it on subpartition
    /// `index`.
    ///
    /// Suspends while the pool is exhausted (backpressure). A blocking
    /// partition has no consumer to relieve it and fails with
    /// [`PartitionError::BlockingPoolExhausted`] instead. All argument and
    /// state checks happen before a buffer is requested, so a rejected emit
    /// leaves the pool untouched.
    pub async fn emit(&self, data: &[u8], index: usize) -> Result<(), PartitionError> {
        let subpartition = self.subpartition(index)?;
        self.check_record_size(data.len())?;
        self.start()?;

        let mut buffer = self.request_buffer().await?;
        buffer.write(data)?;
        if !subpartition.add(buffer)? {
            tracing::debug!(
                "partition {} subpartition {index} consumed; buffer discarded",
                self.id
            );
        }
        Ok(())
    }

    /// Emits one buffer to every subpartition, sharing it by reference count.
    pub async fn broadcast(&self, data: &[u8]) -> Result<(), PartitionError> {
        self.check_record_size(data.len())?;
        self.start()?;

        let mut buffer = self.request_buffer().await?;
        buffer.write(data)?;
        let Some((last, rest)) = self.subpartitions.split_last() else {
            return Err(PartitionError::NoSubpartitions(self.id.clone()));
        };
        for subpartition in rest {
            subpartition.add(buffer.retain())?;
        }
        last.add(buffer)?;
        Ok(())
    }

    /// Marks end-of-stream on every subpartition. The pool stays alive until
    /// [`release`](Self::release).
    pub fn finish(&self) -> Result<(), PartitionError> {
        {
            let mut state = self.lock_state();
            match *state {
                PartitionState::Created | PartitionState::Producing => {
                    *state = PartitionState::Finished;
                }
                PartitionState::Finished => return Ok(()),
                PartitionState::Released => {
                    return Err(PartitionError::PartitionReleased(self.id.clone()))
                }
            }
        }
        for subpartition in &self.subpartitions {
            subpartition.finish();
        }
        tracing::info!(
            "partition {} finished ({} buffers produced)",
            self.id,
            self.subpartitions.iter().map(|s| s.total_buffers()).sum::<u64>(),
        );
        Ok(())
    }

    /// Releases the partition: recycles every queued buffer, wakes consumers
    /// so they observe end-of-stream, requests pool destruction, and
    /// unregisters the producer from the pool.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn release(&self) -> Result<(), PartitionError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Stop handing out buffers first so a suspended emit cannot grab a
        // segment recycled from the queues below.
        let pending = !self.pool.destroy();
        let recycled: usize = self.subpartitions.iter().map(|s| s.release()).sum();
        *self.lock_state() = PartitionState::Released;

        let destroyed = self.pool.unregister_requester()?;
        tracing::info!(
            "partition {} released ({recycled} queued buffers recycled, pool {})",
            self.id,
            if destroyed {
                "destroyed"
            } else if pending {
                "awaiting consumers"
            } else {
                "already destroyed"
            },
        );
        Ok(())
    }

    /// Failure-cleanup path for a producer that did not complete.
    pub fn fail(&self, cause: &str) -> Result<(), PartitionError> {
        if !self.is_released() {
            tracing::warn!("partition {} failed: {cause}", self.id);
        }
        self.release()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Number of subpartitions whose consumers have all detached.
    pub fn consumed_subpartitions(&self) -> usize {
        self.consumed_subpartitions.load(Ordering::Acquire)
    }

    /// Attaches a consumer to subpartition `index`.
    ///
    /// Blocking partitions can only be consumed once finished.
    pub fn create_subpartition_view(
        self: &Arc<Self>,
        index: usize,
        listener: Arc<dyn AvailabilityListener>,
    ) -> Result<SubpartitionView, PartitionError> {
        let subpartition = self.subpartition(index)?;
        match self.state() {
            PartitionState::Released => {
                return Err(PartitionError::PartitionReleased(self.id.clone()))
            }
            PartitionState::Finished => {}
            _ if !self.partition_type.is_pipelined() => {
                return Err(PartitionError::NotConsumable(self.id.clone()))
            }
            _ => {}
        }
        subpartition.attach(Arc::clone(&listener))?;
        tracing::debug!("partition {} subpartition {index}: consumer attached", self.id);

        Ok(SubpartitionView {
            partition: Arc::clone(self),
            index,
            listener,
            released: AtomicBool::new(false),
        })
    }

    fn on_consumed_subpartition(&self, index: usize) {
        let consumed = self.consumed_subpartitions.fetch_add(1, Ordering::AcqRel) + 1;
        // Consumption alone never releases the partition; the producer may
        // still be emitting into other (or this) subpartitions.
        tracing::debug!(
            "partition {} subpartition {index} consumed ({consumed}/{})",
            self.id,
            self.subpartitions.len(),
        );
    }

    fn check_record_size(&self, len: usize) -> Result<(), PartitionError> {
        let segment_bytes = self.pool.segment_size();
        if len > segment_bytes {
            return Err(PoolError::RecordTooLarge {
                record_bytes: len,
                segment_bytes,
            }
            .into());
        }
        Ok(())
    }

    async fn request_buffer(&self) -> Result<buffer_pool::Buffer, PartitionError> {
        let requested = if self.partition_type.is_pipelined() {
            self.pool.request_buffer().await
        } else {
            match self.pool.try_request_buffer() {
                Ok(Some(buffer)) => Ok(buffer),
                Ok(None) => {
                    tracing::error!(
                        "blocking partition {} exhausted all {} buffers",
                        self.id,
                        self.pool.capacity(),
                    );
                    return Err(PartitionError::BlockingPoolExhausted {
                        partition: self.id.clone(),
                        capacity: self.pool.capacity(),
                    });
                }
                Err(e) => Err(e),
            }
        };
        requested.map_err(|e| match e {
            PoolError::PoolDestroyed { .. } if self.is_released() => {
                PartitionError::PartitionReleased(self.id.clone())
            }
            other => other.into(),
        })
    }
}

impl std::fmt::Debug for ResultPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPartition")
            .field("id", &self.id)
            .field("type", &self.partition_type)
            .field("state", &self.state())
            .field("subpartitions", &self.subpartitions.len())
            .field("pool", &self.pool)
            .finish()
    }
}

/// A consumer's attachment to one subpartition.
///
/// Releasing the view (explicitly or by drop) detaches the consumer; if it
/// was the last consumer, the subpartition's queued buffers are recycled.
pub struct SubpartitionView {
    partition: Arc<ResultPartition>,
    index: usize,
    listener: Arc<dyn AvailabilityListener>,
    released: AtomicBool,
}

impl SubpartitionView {
    /// Non-blocking dequeue of the next buffer.
    pub fn poll(&self) -> SubpartitionPoll {
        if self.released.load(Ordering::Acquire) {
            return SubpartitionPoll::EndOfStream;
        }
        match self.partition.subpartition(self.index) {
            Ok(subpartition) => subpartition.poll(),
            Err(_) => SubpartitionPoll::EndOfStream,
        }
    }

    /// Buffers queued for this view.
    pub fn backlog(&self) -> usize {
        self.partition
            .subpartition(self.index)
            .map_or(0, |s| s.backlog())
    }

    pub fn partition(&self) -> &Arc<ResultPartition> {
        &self.partition
    }

    pub fn subpartition_index(&self) -> usize {
        self.index
    }

    /// Detaches from the subpartition. Returns the number of buffers
    /// recycled. Idempotent.
    pub fn release(&self) -> usize {
        if self.released.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let Ok(subpartition) = self.partition.subpartition(self.index) else {
            return 0;
        };
        let (recycled, consumed) = subpartition.detach(&self.listener);
        if consumed {
            self.partition.on_consumed_subpartition(self.index);
        }
        recycled
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for SubpartitionView {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubpartitionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubpartitionView")
            .field("partition", self.partition.id())
            .field("index", &self.index)
            .field("released", &self.is_released())
            .finish()
    }
}
