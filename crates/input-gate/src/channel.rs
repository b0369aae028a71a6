// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Input channels: a consumer's handle to one upstream subpartition.
//!
//! [`InputChannel`] is the capability set the gate is written against:
//! request the subpartition, poll the next buffer, release. Only the
//! in-process [`LocalInputChannel`] is provided; it reads buffers straight
//! out of the producer's subpartition queue.
//!
//! ```text
//! REQUESTING ──request_subpartition──► AVAILABLE ──end of stream──► DRAINED
//!      │                                   │                          │
//!      └──────────────── release / drop (exactly once) ───────────────┴──► RELEASED
//! ```

use crate::GateError;
use buffer_pool::BufferPool;
use result_partition::{
    AvailabilityListener, BufferAndBacklog, ResultPartitionId, ResultPartitionManager,
    SubpartitionPoll, SubpartitionView,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of a non-blocking poll on a channel.
#[derive(Debug)]
pub enum ChannelPoll {
    /// The next buffer from the upstream subpartition.
    Buffer(BufferAndBacklog),
    /// No data yet; the producer may still emit.
    Empty,
    /// The upstream subpartition will deliver no more data.
    EndOfStream,
}

impl From<SubpartitionPoll> for ChannelPoll {
    fn from(poll: SubpartitionPoll) -> Self {
        match poll {
            SubpartitionPoll::Buffer(b) => Self::Buffer(b),
            SubpartitionPoll::Empty => Self::Empty,
            SubpartitionPoll::EndOfStream => Self::EndOfStream,
        }
    }
}

/// Lifecycle of an input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Requesting,
    Available,
    Drained,
    Released,
}

/// Consumer-side handle to one upstream subpartition.
///
/// Implementations must be safe to release concurrently from several tasks
/// and must give up their pool interest exactly once.
pub trait InputChannel: Send + Sync + std::fmt::Debug {
    /// Position of this channel within its gate.
    fn channel_index(&self) -> usize;

    /// Registers interest in the upstream pool and attaches to the
    /// subpartition. `listener` is woken whenever new data may be available.
    /// Idempotent.
    fn request_subpartition(&self, listener: Arc<dyn AvailabilityListener>)
        -> Result<(), GateError>;

    /// Non-blocking read of the next buffer.
    fn poll_next(&self) -> Result<ChannelPoll, GateError>;

    /// Recycles every buffer still held for this channel, then unregisters
    /// its pool interest. Returns the number of buffers recycled. Only the
    /// first call has any effect.
    fn release(&self) -> Result<usize, GateError>;

    fn status(&self) -> ChannelStatus;

    fn is_released(&self) -> bool {
        self.status() == ChannelStatus::Released
    }
}

struct Attachment {
    view: SubpartitionView,
    pool: BufferPool,
}

struct ChannelState {
    status: ChannelStatus,
    attachment: Option<Attachment>,
}

/// Channel reading from a partition produced in the same process.
pub struct LocalInputChannel {
    index: usize,
    partition_id: ResultPartitionId,
    subpartition_index: usize,
    manager: Arc<ResultPartitionManager>,
    state: Mutex<ChannelState>,
}

impl LocalInputChannel {
    pub fn new(
        index: usize,
        partition_id: ResultPartitionId,
        subpartition_index: usize,
        manager: Arc<ResultPartitionManager>,
    ) -> Self {
        Self {
            index,
            partition_id,
            subpartition_index,
            manager,
            state: Mutex::new(ChannelState {
                status: ChannelStatus::Requesting,
                attachment: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn partition_id(&self) -> &ResultPartitionId {
        &self.partition_id
    }

    pub fn subpartition_index(&self) -> usize {
        self.subpartition_index
    }

    /// Buffers queued upstream for this channel and not yet polled.
    pub fn backlog(&self) -> usize {
        self.lock()
            .attachment
            .as_ref()
            .map_or(0, |a| a.view.backlog())
    }

    /// The upstream pool, once the subpartition has been requested.
    pub fn buffer_pool(&self) -> Option<BufferPool> {
        self.lock().attachment.as_ref().map(|a| a.pool.clone())
    }
}

impl InputChannel for LocalInputChannel {
    fn channel_index(&self) -> usize {
        self.index
    }

    fn request_subpartition(
        &self,
        listener: Arc<dyn AvailabilityListener>,
    ) -> Result<(), GateError> {
        let mut state = self.lock();
        match state.status {
            ChannelStatus::Released => return Err(GateError::ChannelReleased(self.index)),
            _ if state.attachment.is_some() => return Ok(()),
            _ => {}
        }

        let partition = self.manager.get(&self.partition_id)?;
        let pool = partition.buffer_pool().clone();
        pool.register_requester()?;

        let view = match partition.create_subpartition_view(self.subpartition_index, listener) {
            Ok(view) => view,
            Err(e) => {
                pool.unregister_requester()?;
                return Err(e.into());
            }
        };

        tracing::debug!(
            "channel {} requested {} subpartition {}",
            self.index,
            self.partition_id,
            self.subpartition_index,
        );
        state.attachment = Some(Attachment { view, pool });
        state.status = ChannelStatus::Available;
        Ok(())
    }

    fn poll_next(&self) -> Result<ChannelPoll, GateError> {
        let mut state = self.lock();
        if state.status == ChannelStatus::Released {
            return Err(GateError::ChannelReleased(self.index));
        }
        let Some(attachment) = state.attachment.as_ref() else {
            return Ok(ChannelPoll::Empty);
        };

        let poll = ChannelPoll::from(attachment.view.poll());
        if matches!(poll, ChannelPoll::EndOfStream) && state.status != ChannelStatus::Drained {
            state.status = ChannelStatus::Drained;
            tracing::debug!("channel {} drained", self.index);
        }
        Ok(poll)
    }

    fn release(&self) -> Result<usize, GateError> {
        let attachment = {
            let mut state = self.lock();
            if state.status == ChannelStatus::Released {
                return Ok(0);
            }
            state.status = ChannelStatus::Released;
            state.attachment.take()
        };
        let Some(Attachment { view, pool }) = attachment else {
            tracing::debug!("channel {} released before requesting", self.index);
            return Ok(0);
        };

        // Held buffers go back to the pool before the interest is dropped.
        let recycled = view.release();
        drop(view);
        let destroyed = pool.unregister_requester()?;

        tracing::info!(
            "channel {} released ({recycled} buffers recycled{})",
            self.index,
            if destroyed { ", pool destroyed" } else { "" },
        );
        Ok(recycled)
    }

    fn status(&self) -> ChannelStatus {
        self.lock().status
    }
}

impl Drop for LocalInputChannel {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!("channel {} failed to release on drop: {e}", self.index);
        }
    }
}

impl std::fmt::Debug for LocalInputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalInputChannel")
            .field("index", &self.index)
            .field("partition", &self.partition_id)
            .field("subpartition", &self.subpartition_index)
            .field("status", &self.status())
            .finish()
    }
}
