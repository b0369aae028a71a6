// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Exchange profiling metrics.
//!
//! [`ExchangeMetrics`] collects per-task and aggregate record counts and
//! timings for one job run, together with the final statistics of the
//! partition's buffer pool.

use buffer_pool::PoolStats;
use std::time::Duration;

/// Which side of the exchange a task ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TaskRole {
    Producer,
    Consumer,
}

/// Metrics for a single task.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskMetrics {
    /// Task name.
    pub task_name: String,
    pub role: TaskRole,
    /// Records emitted (producer) or read (consumer).
    pub records: usize,
    /// Payload bytes emitted or read.
    pub bytes: usize,
    /// Wall-clock time from invoke to cleanup.
    pub duration: Duration,
}

/// Aggregate metrics for a complete job run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExchangeMetrics {
    /// Total wall-clock time for the run.
    pub total_duration: Duration,
    pub records_emitted: usize,
    pub records_consumed: usize,
    /// Per-task metrics (only with profiling enabled).
    pub task_metrics: Vec<TaskMetrics>,
    /// Pool statistics at the end of the run.
    pub pool_stats: PoolStats,
}

impl ExchangeMetrics {
    /// Creates an empty metrics container.
    pub fn new() -> Self {
        Self {
            total_duration: Duration::ZERO,
            records_emitted: 0,
            records_consumed: 0,
            task_metrics: Vec::new(),
            pool_stats: PoolStats::default(),
        }
    }

    /// Records the outcome of one task. Per-task detail is only kept when
    /// `profiling` is set.
    pub fn record_task(&mut self, task: TaskMetrics, profiling: bool) {
        match task.role {
            TaskRole::Producer => self.records_emitted += task.records,
            TaskRole::Consumer => self.records_consumed += task.records,
        }
        if profiling {
            self.task_metrics.push(task);
        }
    }

    /// Finalises metrics with the total wall-clock time and pool statistics.
    pub fn finalise(&mut self, total: Duration, pool_stats: PoolStats) {
        self.total_duration = total;
        self.pool_stats = pool_stats;
    }

    /// Returns emitted records per second.
    pub fn records_per_second(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs <= 0.0 || self.records_emitted == 0 {
            return 0.0;
        }
        self.records_emitted as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Exchange: {:.2}ms total, {} records emitted, {} consumed, \
             {} tasks profiled ({:.1} rec/s); {}",
            self.total_duration.as_secs_f64() * 1000.0,
            self.records_emitted,
            self.records_consumed,
            self.task_metrics.len(),
            self.records_per_second(),
            self.pool_stats.summary(),
        )
    }
}

impl Default for ExchangeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(role: TaskRole, records: usize) -> TaskMetrics {
        TaskMetrics {
            task_name: format!("{role:?}"),
            role,
            records,
            bytes: records * 1024,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_empty_metrics() {
        let m = ExchangeMetrics::new();
        assert_eq!(m.records_per_second(), 0.0);
        assert!(m.task_metrics.is_empty());
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = ExchangeMetrics::new();
        m.record_task(task(TaskRole::Producer, 8), true);
        m.record_task(task(TaskRole::Consumer, 1), true);
        m.finalise(Duration::from_millis(400), PoolStats::default());

        assert_eq!(m.records_emitted, 8);
        assert_eq!(m.records_consumed, 1);
        assert_eq!(m.task_metrics.len(), 2);
        assert!((m.records_per_second() - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_profiling_disabled_keeps_totals() {
        let mut m = ExchangeMetrics::new();
        m.record_task(task(TaskRole::Producer, 3), false);
        assert_eq!(m.records_emitted, 3);
        assert!(m.task_metrics.is_empty());
    }

    #[test]
    fn test_summary_format() {
        let mut m = ExchangeMetrics::new();
        m.record_task(task(TaskRole::Producer, 5), true);
        m.finalise(Duration::from_millis(10), PoolStats::default());

        let s = m.summary();
        assert!(s.contains("Exchange:"));
        assert!(s.contains("5 records emitted"));
        assert!(s.contains("Buffers:"));
    }

    #[test]
    fn test_serialises() {
        let mut m = ExchangeMetrics::new();
        m.record_task(task(TaskRole::Consumer, 2), true);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"records_consumed\":2"));
        assert!(json.contains("\"Consumer\""));
    }
}
