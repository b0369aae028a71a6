// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pool statistics for profiling and diagnostics.
//!
//! [`PoolStats`] tracks how a partition's buffer pool was used: how often
//! segments were reused, how often the producer hit backpressure, and how
//! many buffers were outstanding at peak.

/// Cumulative statistics about buffer pool usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Number of successful buffer handouts.
    pub total_requests: u64,
    /// Handouts served from the free list.
    pub reused_segments: u64,
    /// Handouts that required a fresh segment.
    pub fresh_segments: u64,
    /// Requests that had to wait for a recycle.
    pub backpressure_waits: u64,
    /// Number of segments returned to the pool.
    pub recycled_segments: u64,
    /// Highest number of simultaneously outstanding buffers.
    pub peak_outstanding: usize,
    /// Whether the pool completed destruction.
    pub destroyed: bool,
}

impl PoolStats {
    /// Returns the reuse ratio in `[0.0, 1.0]`, or `0.0` with no requests.
    pub fn reuse_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.reused_segments as f64 / self.total_requests as f64
    }

    pub(crate) fn record_handout(&mut self, reused: bool, outstanding: usize) {
        self.total_requests += 1;
        if reused {
            self.reused_segments += 1;
        } else {
            self.fresh_segments += 1;
        }
        self.peak_outstanding = self.peak_outstanding.max(outstanding);
    }

    pub(crate) fn record_backpressure(&mut self) {
        self.backpressure_waits += 1;
    }

    pub(crate) fn record_recycle(&mut self) {
        self.recycled_segments += 1;
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Buffers: {} requests ({} reused, {} fresh, {:.0}% reuse), \
             {} backpressure waits, {} recycled, peak {} outstanding{}",
            self.total_requests,
            self.reused_segments,
            self.fresh_segments,
            self.reuse_ratio() * 100.0,
            self.backpressure_waits,
            self.recycled_segments,
            self.peak_outstanding,
            if self.destroyed { ", destroyed" } else { "" },
        )
    }
}
