// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference-counted buffer handles that recycle into their pool.
//!
//! A [`Buffer`] is a handle to one memory segment. Every handle owns one unit
//! of the segment's reference count: [`Buffer::retain`] creates a new handle
//! (+1), [`Buffer::recycle`] or dropping a handle gives its unit back (-1).
//! When the count reaches zero the segment goes back to its pool.
//!
//! The back-pointer to the pool is a `Weak`, so outstanding buffers never keep
//! a pool alive on their own. If the pool is gone by the time the last handle
//! is recycled, the segment is simply freed.

use crate::error::fail_invariant;
use crate::pool::PoolInner;
use crate::PoolError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// One memory segment plus its explicit reference count.
pub(crate) struct Segment {
    data: Vec<u8>,
    /// Number of readable bytes.
    len: usize,
    ref_count: AtomicUsize,
    recycler: Weak<PoolInner>,
}

impl Drop for Segment {
    fn drop(&mut self) {
        let remaining = self.ref_count.load(Ordering::Acquire);
        if remaining != 0 {
            fail_invariant(format!(
                "segment freed while {remaining} references are still counted"
            ));
        }
        let data = std::mem::take(&mut self.data);
        if let Some(pool) = self.recycler.upgrade() {
            pool.recycle_segment(data);
        }
    }
}

/// A handle to a pooled memory segment.
///
/// Buffers are handed out by [`BufferPool`](crate::BufferPool) with a
/// reference count of one. While a buffer has a single holder it can be
/// written with [`Buffer::write`]; once retained it is read-only.
pub struct Buffer {
    /// `None` once this handle's reference has been given back.
    segment: Option<Arc<Segment>>,
}

impl Buffer {
    pub(crate) fn new(data: Vec<u8>, recycler: Weak<PoolInner>) -> Self {
        Self {
            segment: Some(Arc::new(Segment {
                data,
                len: 0,
                ref_count: AtomicUsize::new(1),
                recycler,
            })),
        }
    }

    fn segment(&self) -> &Segment {
        // Only `recycle(self)` and `drop` clear the segment, and both consume
        // the handle.
        self.segment.as_deref().expect("live buffer handle")
    }

    /// Copies `data` into the segment, replacing its previous contents.
    ///
    /// Fails with [`PoolError::BufferShared`] once the buffer has been
    /// retained, and with [`PoolError::RecordTooLarge`] if `data` exceeds the
    /// segment capacity.
    pub fn write(&mut self, data: &[u8]) -> Result<(), PoolError> {
        let holders = self.ref_count();
        let segment = self
            .segment
            .as_mut()
            .and_then(Arc::get_mut)
            .ok_or(PoolError::BufferShared { holders })?;

        if data.len() > segment.data.len() {
            return Err(PoolError::RecordTooLarge {
                record_bytes: data.len(),
                segment_bytes: segment.data.len(),
            });
        }
        segment.data[..data.len()].copy_from_slice(data);
        segment.len = data.len();
        Ok(())
    }

    /// Returns the readable bytes of this buffer.
    pub fn as_slice(&self) -> &[u8] {
        let segment = self.segment();
        &segment.data[..segment.len]
    }

    /// Returns the number of readable bytes.
    pub fn len(&self) -> usize {
        self.segment().len
    }

    /// Returns `true` if nothing has been written into the buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the size of the underlying memory segment.
    pub fn capacity(&self) -> usize {
        self.segment().data.len()
    }

    /// Returns the current reference count of the segment.
    pub fn ref_count(&self) -> usize {
        self.segment
            .as_ref()
            .map_or(0, |s| s.ref_count.load(Ordering::Acquire))
    }

    /// Hands out another reference to the same segment.
    pub fn retain(&self) -> Buffer {
        let segment = self.segment.as_ref().expect("live buffer handle");
        segment.ref_count.fetch_add(1, Ordering::AcqRel);
        Buffer {
            segment: Some(Arc::clone(segment)),
        }
    }

    /// Gives this handle's reference back. The segment returns to its pool
    /// when the last reference is recycled.
    ///
    /// Returns [`PoolError::InvariantViolation`] if the reference count was
    /// already zero, which means some handle was created without a matching
    /// [`retain`](Buffer::retain).
    pub fn recycle(mut self) -> Result<(), PoolError> {
        self.release_ref()
    }

    fn release_ref(&mut self) -> Result<(), PoolError> {
        let Some(segment) = self.segment.take() else {
            return Ok(());
        };
        let result = segment
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map(|_| ())
            .map_err(|_| {
                PoolError::InvariantViolation("buffer recycled with a reference count of zero".into())
            });
        if result.is_err() {
            tracing::error!("double recycle detected on a {} byte segment", segment.data.len());
            // Keep the segment's own drop check quiet; the error is reported here.
            std::mem::forget(segment);
        }
        result
    }

    /// Creates a second handle without touching the reference count.
    #[cfg(test)]
    pub(crate) fn alias_without_retain(&self) -> Buffer {
        Buffer {
            segment: self.segment.clone(),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Err(e) = self.release_ref() {
            fail_invariant(e.to_string());
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.segment.as_ref().map(|s| s.len))
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{BufferPool, MemorySize, PoolError};

    fn pool(capacity: usize) -> BufferPool {
        BufferPool::new("test-partition", MemorySize::from_bytes(64), capacity).unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let pool = pool(1);
        let mut buf = pool.try_request_buffer().unwrap().unwrap();
        assert!(buf.is_empty());
        buf.write(b"hello").unwrap();
        assert_eq!(buf.as_slice(), b"hello");
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn test_record_too_large() {
        let pool = pool(1);
        let mut buf = pool.try_request_buffer().unwrap().unwrap();
        let err = buf.write(&[0u8; 65]).unwrap_err();
        assert_eq!(
            err,
            PoolError::RecordTooLarge {
                record_bytes: 65,
                segment_bytes: 64
            }
        );
    }

    #[test]
    fn test_retained_buffer_is_read_only() {
        let pool = pool(1);
        let mut buf = pool.try_request_buffer().unwrap().unwrap();
        buf.write(b"abc").unwrap();
        let other = buf.retain();
        assert_eq!(buf.ref_count(), 2);
        assert!(matches!(buf.write(b"x"), Err(PoolError::BufferShared { holders: 2 })));
        assert_eq!(other.as_slice(), b"abc");
    }

    #[test]
    fn test_segment_returns_after_last_reference() {
        let pool = pool(1);
        let buf = pool.try_request_buffer().unwrap().unwrap();
        let second = buf.retain();

        buf.recycle().unwrap();
        assert_eq!(pool.outstanding_buffers(), 1);
        assert_eq!(second.ref_count(), 1);

        second.recycle().unwrap();
        assert_eq!(pool.outstanding_buffers(), 0);
        assert_eq!(pool.stats().recycled_segments, 1);
    }

    #[test]
    fn test_double_recycle_is_rejected() {
        let pool = pool(1);
        let buf = pool.try_request_buffer().unwrap().unwrap();
        let alias = buf.alias_without_retain();

        buf.recycle().unwrap();
        let err = alias.recycle().unwrap_err();
        assert!(matches!(err, PoolError::InvariantViolation(_)));
    }

    #[test]
    fn test_buffer_outlives_pool_handle() {
        let pool = pool(1);
        let mut buf = pool.try_request_buffer().unwrap().unwrap();
        buf.write(b"late").unwrap();
        drop(pool);
        // The pool is gone; recycling frees the segment instead.
        assert_eq!(buf.as_slice(), b"late");
        buf.recycle().unwrap();
    }
}
