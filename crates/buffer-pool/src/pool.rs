// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bounded buffer pool with deferred, two-counter destruction.
//!
//! A [`BufferPool`] belongs to exactly one result partition. It:
//!
//! 1. Hands out at most `capacity` fixed-size segments. When all of them are
//!    outstanding, [`BufferPool::request_buffer`] suspends until one is
//!    recycled (backpressure).
//! 2. Keeps recycled segments on a free list for reuse.
//! 3. Tracks two independent counters: *active requesters* (parties that
//!    declared they may still need the pool) and *outstanding buffers*
//!    (segments not yet recycled).
//!
//! # Destruction
//! [`BufferPool::destroy`] only *requests* destruction. The pool completes
//! destruction when destruction was requested **and** both counters are zero.
//! Whichever call observes that condition last (destroy, unregister, or the
//! final recycle) completes it. A consumer that unregisters early can
//! therefore never tear down a pool the producer is still registered on.
//!
//! # Suspension contract
//! `request_buffer` is the only suspending operation. It is woken by a
//! recycle (one waiter per returned segment) or by a destroy request (all
//! waiters). No lock is held across the `.await`.

use crate::{Buffer, MemorySize, PoolError, PoolStats};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Mutable pool state. Every counter lives under one lock so that the
/// destruction decision sees a consistent snapshot.
#[derive(Debug, Default)]
struct PoolState {
    free: Vec<Vec<u8>>,
    /// Segments created so far (current size).
    num_created: usize,
    outstanding: usize,
    active_requesters: usize,
    destroy_requested: bool,
    destroyed: bool,
    stats: PoolStats,
}

/// Internal pool state, shared between pool handles via `Arc` and referenced
/// weakly by outstanding segments.
pub(crate) struct PoolInner {
    partition: String,
    segment_size: usize,
    capacity: usize,
    state: Mutex<PoolState>,
    available: Notify,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the last reference of a segment to give it back.
    pub(crate) fn recycle_segment(&self, segment: Vec<u8>) {
        let mut state = self.lock();
        if state.outstanding == 0 {
            drop(state);
            crate::error::fail_invariant(format!(
                "pool of partition '{}' received a segment with no buffers outstanding",
                self.partition
            ));
            return;
        }
        state.outstanding -= 1;
        state.stats.record_recycle();

        if state.destroy_requested {
            // Segment is freed here; the pool is on its way out.
            drop(segment);
            self.try_complete_destruction(&mut state);
        } else {
            state.free.push(segment);
            drop(state);
            self.available.notify_one();
        }
    }

    /// Completes destruction if it was requested and nobody needs the pool.
    fn try_complete_destruction(&self, state: &mut PoolState) -> bool {
        if state.destroyed {
            return true;
        }
        if !state.destroy_requested || state.active_requesters != 0 || state.outstanding != 0 {
            return false;
        }
        state.destroyed = true;
        state.stats.destroyed = true;
        state.free.clear();
        tracing::info!(
            "buffer pool of partition '{}' destroyed ({} segments created)",
            self.partition,
            state.num_created,
        );
        true
    }

    fn destroyed_error(&self) -> PoolError {
        PoolError::PoolDestroyed {
            partition: self.partition.clone(),
        }
    }
}

/// A bounded pool of fixed-size buffers for one result partition.
///
/// `BufferPool` is a cheap, cloneable handle; clones share the same pool.
///
/// # Example
/// ```
/// use buffer_pool::{BufferPool, MemorySize};
///
/// let pool = BufferPool::new("p-0", MemorySize::from_kb(1), 2).unwrap();
/// pool.register_requester().unwrap();
///
/// let buffer = pool.try_request_buffer().unwrap().unwrap();
/// assert_eq!(pool.outstanding_buffers(), 1);
/// drop(buffer);
/// assert_eq!(pool.outstanding_buffers(), 0);
///
/// // Destruction waits for the registered requester.
/// assert!(!pool.destroy());
/// assert!(pool.unregister_requester().unwrap());
/// assert!(pool.is_destroyed());
/// ```
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Creates a pool of at most `capacity` segments of `segment_size` bytes.
    ///
    /// Segments are allocated lazily on first request.
    pub fn new(
        partition: impl Into<String>,
        segment_size: MemorySize,
        capacity: usize,
    ) -> Result<Self, PoolError> {
        if segment_size.as_bytes() == 0 {
            return Err(PoolError::ZeroSized("segment"));
        }
        if capacity == 0 {
            return Err(PoolError::ZeroSized("buffer pool"));
        }
        let partition = partition.into();
        tracing::debug!(
            "buffer pool for partition '{partition}': {capacity} × {segment_size}"
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                partition,
                segment_size: segment_size.as_bytes(),
                capacity,
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
            }),
        })
    }

    /// Requests a buffer, suspending while the pool is exhausted.
    ///
    /// Fails with [`PoolError::PoolDestroyed`] once destruction has been
    /// requested, including while this call is suspended.
    ///
    /// # Cancel safety
    /// Cancel-safe: no segment is handed out until the call returns.
    pub async fn request_buffer(&self) -> Result<Buffer, PoolError> {
        let mut waited = false;
        loop {
            // Register for wake-ups before checking, so a recycle between the
            // check and the await is not lost.
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(buffer) = self.try_request_buffer()? {
                return Ok(buffer);
            }
            if !waited {
                waited = true;
                self.inner.lock().stats.record_backpressure();
                tracing::debug!(
                    "partition '{}' backpressured: all {} buffers outstanding",
                    self.inner.partition,
                    self.inner.capacity,
                );
            }
            notified.await;
        }
    }

    /// Non-blocking request: `Ok(None)` if every segment is outstanding.
    ///
    /// Like [`request_buffer`](Self::request_buffer), fails with
    /// [`PoolError::PoolDestroyed`] as soon as destruction is requested.
    pub fn try_request_buffer(&self) -> Result<Option<Buffer>, PoolError> {
        let mut state = self.inner.lock();
        if state.destroyed || state.destroy_requested {
            return Err(self.inner.destroyed_error());
        }

        let (segment, reused) = match state.free.pop() {
            Some(segment) => (segment, true),
            None if state.num_created < self.inner.capacity => {
                state.num_created += 1;
                (vec![0u8; self.inner.segment_size], false)
            }
            None => return Ok(None),
        };
        state.outstanding += 1;
        let outstanding = state.outstanding;
        state.stats.record_handout(reused, outstanding);
        drop(state);

        Ok(Some(Buffer::new(segment, Arc::downgrade(&self.inner))))
    }

    /// Declares that the caller may still need this pool.
    pub fn register_requester(&self) -> Result<usize, PoolError> {
        let mut state = self.inner.lock();
        if state.destroyed || state.destroy_requested {
            return Err(self.inner.destroyed_error());
        }
        state.active_requesters += 1;
        tracing::debug!(
            "partition '{}' pool: requester registered ({} active)",
            self.inner.partition,
            state.active_requesters,
        );
        Ok(state.active_requesters)
    }

    /// Withdraws a previous [`register_requester`](Self::register_requester).
    ///
    /// Returns `true` if this call completed the pool's destruction.
    /// Unregistering with no active requesters is an
    /// [`InvariantViolation`](PoolError::InvariantViolation).
    pub fn unregister_requester(&self) -> Result<bool, PoolError> {
        let mut state = self.inner.lock();
        if state.active_requesters == 0 {
            let detail = format!(
                "partition '{}' pool: unregister without an active requester",
                self.inner.partition
            );
            tracing::error!("{detail}");
            return Err(PoolError::InvariantViolation(detail));
        }
        state.active_requesters -= 1;
        tracing::debug!(
            "partition '{}' pool: requester unregistered ({} active)",
            self.inner.partition,
            state.active_requesters,
        );
        let was_destroyed = state.destroyed;
        Ok(self.inner.try_complete_destruction(&mut state) && !was_destroyed)
    }

    /// Requests destruction of the pool.
    ///
    /// Returns `true` if the pool is destroyed when the call returns. If
    /// requesters are still registered or buffers are still outstanding,
    /// destruction is deferred to whichever call drops the last of them.
    pub fn destroy(&self) -> bool {
        let mut state = self.inner.lock();
        if !state.destroy_requested {
            tracing::debug!(
                "partition '{}' pool: destroy requested ({} requesters, {} outstanding)",
                self.inner.partition,
                state.active_requesters,
                state.outstanding,
            );
        }
        state.destroy_requested = true;
        state.free.clear();
        let destroyed = self.inner.try_complete_destruction(&mut state);
        drop(state);
        // Suspended requesters must observe the destroy request.
        self.inner.available.notify_waiters();
        destroyed
    }

    /// Returns `true` once destruction has completed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Returns `true` once destruction has been requested.
    pub fn is_destroy_requested(&self) -> bool {
        self.inner.lock().destroy_requested
    }

    /// Number of parties that still declared interest in the pool.
    pub fn active_requesters(&self) -> usize {
        self.inner.lock().active_requesters
    }

    /// Number of buffers handed out and not yet recycled.
    pub fn outstanding_buffers(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Number of buffers that could be handed out without waiting.
    pub fn available_buffers(&self) -> usize {
        let state = self.inner.lock();
        if state.destroy_requested {
            return 0;
        }
        self.inner.capacity - state.outstanding
    }

    /// Maximum number of segments.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Size of every segment in bytes.
    pub fn segment_size(&self) -> usize {
        self.inner.segment_size
    }

    /// The partition this pool belongs to.
    pub fn partition(&self) -> &str {
        &self.inner.partition
    }

    /// Returns a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats.clone()
    }

    /// Returns `true` if both handles refer to the same pool.
    pub fn same_pool(&self, other: &BufferPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("BufferPool")
            .field("partition", &self.inner.partition)
            .field("segment_size", &self.inner.segment_size)
            .field("capacity", &self.inner.capacity)
            .field("outstanding", &state.outstanding)
            .field("active_requesters", &state.active_requesters)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
