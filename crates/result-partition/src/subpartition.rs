// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-consumer FIFO queues of produced buffers.
//!
//! A [`ResultSubpartition`] holds the buffers produced for one consumer
//! channel, in emission order. Consumers attach an
//! [`AvailabilityListener`] and are woken whenever data arrives, the stream
//! ends, or the subpartition is released.
//!
//! Buffers are only ever recycled *outside* the subpartition lock, so the
//! pool's lock never nests inside a subpartition's lock.

use crate::{PartitionError, ResultPartitionId};
use buffer_pool::Buffer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives "data available" signals from subpartitions.
pub trait AvailabilityListener: Send + Sync {
    fn notify_data_available(&self);
}

impl AvailabilityListener for tokio::sync::Notify {
    fn notify_data_available(&self) {
        // `notify_one` stores a permit if nobody is waiting yet.
        self.notify_one();
    }
}

/// A dequeued buffer plus queue metadata.
#[derive(Debug)]
pub struct BufferAndBacklog {
    pub buffer: Buffer,
    /// Buffers still queued behind this one.
    pub backlog: usize,
    /// Position of this buffer in the subpartition's emission order.
    pub sequence_number: u64,
}

/// Result of a non-blocking poll on a subpartition.
#[derive(Debug)]
pub enum SubpartitionPoll {
    /// The next buffer in emission order.
    Buffer(BufferAndBacklog),
    /// Nothing queued yet; the producer may still emit.
    Empty,
    /// No more data will ever arrive (finished and drained, or released).
    EndOfStream,
}

#[derive(Default)]
struct SubpartitionState {
    queue: VecDeque<(u64, Buffer)>,
    next_sequence_number: u64,
    finished: bool,
    released: bool,
    consumers: usize,
    /// Every attached consumer has detached; later buffers are discarded.
    consumed: bool,
    listeners: Vec<Arc<dyn AvailabilityListener>>,
    discarded_buffers: u64,
}

/// One (producer, consumer channel) queue within a result partition.
pub struct ResultSubpartition {
    partition: ResultPartitionId,
    index: usize,
    state: Mutex<SubpartitionState>,
}

impl ResultSubpartition {
    pub(crate) fn new(partition: ResultPartitionId, index: usize) -> Self {
        Self {
            partition,
            index,
            state: Mutex::new(SubpartitionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SubpartitionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(listeners: Vec<Arc<dyn AvailabilityListener>>) {
        for listener in listeners {
            listener.notify_data_available();
        }
    }

    /// Index of this subpartition within its partition.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enqueues a buffer.
    ///
    /// Returns `Ok(false)` if every consumer has already detached; the buffer
    /// is recycled immediately and the producer carries on.
    pub(crate) fn add(&self, buffer: Buffer) -> Result<bool, PartitionError> {
        let mut state = self.lock();
        if state.released {
            drop(state);
            drop(buffer);
            return Err(PartitionError::PartitionReleased(self.partition.clone()));
        }
        if state.finished {
            drop(state);
            drop(buffer);
            return Err(PartitionError::PartitionClosed(self.partition.clone()));
        }
        if state.consumed {
            state.discarded_buffers += 1;
            drop(state);
            drop(buffer);
            return Ok(false);
        }

        let sequence_number = state.next_sequence_number;
        state.next_sequence_number += 1;
        state.queue.push_back((sequence_number, buffer));
        let listeners = state.listeners.clone();
        drop(state);

        Self::notify(listeners);
        Ok(true)
    }

    /// Marks end-of-stream. Already queued buffers stay readable.
    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        if state.finished || state.released {
            return;
        }
        state.finished = true;
        let listeners = state.listeners.clone();
        drop(state);
        Self::notify(listeners);
    }

    /// Releases the subpartition: queued buffers are recycled and attached
    /// consumers are woken to observe end-of-stream.
    ///
    /// Returns the number of buffers recycled.
    pub(crate) fn release(&self) -> usize {
        let mut state = self.lock();
        if state.released {
            return 0;
        }
        state.released = true;
        let drained: Vec<(u64, Buffer)> = state.queue.drain(..).collect();
        let listeners = state.listeners.clone();
        drop(state);

        let recycled = drained.len();
        drop(drained);
        Self::notify(listeners);
        recycled
    }

    /// Attaches a consumer and its listener.
    pub(crate) fn attach(&self, listener: Arc<dyn AvailabilityListener>) -> Result<(), PartitionError> {
        let mut state = self.lock();
        if state.released {
            return Err(PartitionError::PartitionReleased(self.partition.clone()));
        }
        state.consumers += 1;
        state.consumed = false;
        state.listeners.push(Arc::clone(&listener));
        let ready = !state.queue.is_empty() || state.finished;
        drop(state);

        if ready {
            listener.notify_data_available();
        }
        Ok(())
    }

    /// Detaches a consumer. When the last consumer leaves, queued buffers are
    /// recycled and later emissions are discarded.
    ///
    /// Returns the number of buffers recycled and whether the subpartition
    /// became fully consumed.
    pub(crate) fn detach(&self, listener: &Arc<dyn AvailabilityListener>) -> (usize, bool) {
        let mut state = self.lock();
        let target = Arc::as_ptr(listener) as *const ();
        state
            .listeners
            .retain(|l| Arc::as_ptr(l) as *const () != target);
        state.consumers = state.consumers.saturating_sub(1);
        if state.consumers > 0 {
            return (0, false);
        }
        state.consumed = true;
        let drained: Vec<(u64, Buffer)> = state.queue.drain(..).collect();
        drop(state);

        let recycled = drained.len();
        drop(drained);
        (recycled, true)
    }

    /// Non-blocking dequeue of the next buffer.
    pub(crate) fn poll(&self) -> SubpartitionPoll {
        let mut state = self.lock();
        if state.released {
            return SubpartitionPoll::EndOfStream;
        }
        match state.queue.pop_front() {
            Some((sequence_number, buffer)) => SubpartitionPoll::Buffer(BufferAndBacklog {
                buffer,
                backlog: state.queue.len(),
                sequence_number,
            }),
            None if state.finished => SubpartitionPoll::EndOfStream,
            None => SubpartitionPoll::Empty,
        }
    }

    /// Number of buffers queued and not yet consumed.
    pub fn backlog(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of buffers ever enqueued.
    pub fn total_buffers(&self) -> u64 {
        self.lock().next_sequence_number
    }

    /// Number of buffers dropped because no consumer was attached anymore.
    pub fn discarded_buffers(&self) -> u64 {
        self.lock().discarded_buffers
    }

    pub fn num_consumers(&self) -> usize {
        self.lock().consumers
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl std::fmt::Debug for ResultSubpartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ResultSubpartition")
            .field("partition", &self.partition)
            .field("index", &self.index)
            .field("backlog", &state.queue.len())
            .field("consumers", &state.consumers)
            .field("finished", &state.finished)
            .field("released", &state.released)
            .finish()
    }
}
