// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: producer and consumers exchanging data through a
//! shared pool.
//!
//! These tests exercise the complete flow from partition and gate setup →
//! concurrent emit / read → early or concurrent release, proving that the
//! pool is reclaimed exactly when its last requester leaves and never while
//! the producer still needs it.

use buffer_pool::{BufferPool, MemorySize, PoolError};
use input_gate::{InputChannel, InputGate, LocalInputChannel};
use result_partition::{
    PartitionError, PartitionState, ResultPartition, ResultPartitionId, ResultPartitionManager,
    ResultPartitionType,
};
use runtime::{
    ExchangeConfig, ExchangeJob, PartialReceiver, RuntimeError, SingleBufferReceiver,
    SlowBufferSender,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Barrier};

// ── Helpers ────────────────────────────────────────────────────

const RECORD_SIZE: usize = 1024;

struct Exchange {
    manager: Arc<ResultPartitionManager>,
    partition: Arc<ResultPartition>,
    pool: BufferPool,
}

/// A pipelined partition with `subpartitions` queues over a pool of
/// `capacity` 1 KB buffers, registered with a fresh manager.
fn exchange(capacity: usize, subpartitions: usize) -> Exchange {
    let manager = Arc::new(ResultPartitionManager::new());
    let id = ResultPartitionId::new("sender", 0);
    let pool = BufferPool::new(id.to_string(), MemorySize::from_kb(1), capacity).unwrap();
    let partition = ResultPartition::new(
        id,
        ResultPartitionType::Pipelined,
        subpartitions,
        pool.clone(),
    )
    .unwrap();
    manager.register(Arc::clone(&partition)).unwrap();
    Exchange {
        manager,
        partition,
        pool,
    }
}

/// A gate with one local channel on `subpartition`, partitions requested.
fn gate(ex: &Exchange, subpartition: usize) -> InputGate {
    let channel = LocalInputChannel::new(
        0,
        ex.partition.id().clone(),
        subpartition,
        Arc::clone(&ex.manager),
    );
    let gate = InputGate::new(
        format!("receiver-{subpartition}"),
        vec![Box::new(channel) as Box<dyn InputChannel>],
    );
    gate.finish_read_recovered_state();
    gate.request_partitions().unwrap();
    gate
}

fn record(i: usize) -> Vec<u8> {
    vec![i as u8; RECORD_SIZE]
}

/// Spins (yielding) until `cond` holds; fails after five seconds.
async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

// ── Scenario 1: partial consumption while producing ────────────

/// The consumer reads one buffer and releases its channel exactly after the
/// producer's second emit; the producer then emits the remaining six.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_consume_forced_race() {
    let ex = exchange(2, 1);
    let gate = gate(&ex, 0);
    let (emitted_tx, mut emitted_rx) = watch::channel(0usize);
    let (released_tx, released_rx) = oneshot::channel::<()>();

    let producer = {
        let partition = Arc::clone(&ex.partition);
        let pool = ex.pool.clone();
        tokio::spawn(async move {
            let mut released_rx = Some(released_rx);
            for i in 0..8 {
                partition.emit(&record(i), 0).await?;
                emitted_tx.send_replace(i + 1);
                if i + 1 == 2 {
                    // Hold here until the consumer has released mid-stream.
                    if let Some(rx) = released_rx.take() {
                        rx.await.expect("consumer signals release");
                    }
                }
                assert!(!pool.is_destroyed(), "pool destroyed while producing");
            }
            partition.finish()
        })
    };

    let consumer = {
        let pool = ex.pool.clone();
        tokio::spawn(async move {
            let first = gate.get_next().await.unwrap().expect("first buffer");
            assert_eq!(first.buffer.as_slice(), record(0).as_slice());
            first.buffer.recycle().unwrap();

            emitted_rx.wait_for(|n| *n >= 2).await.unwrap();
            gate.close().unwrap();

            // Only the producer's registration remains.
            assert!(!pool.is_destroyed());
            assert_eq!(pool.active_requesters(), 1);
            released_tx.send(()).unwrap();
        })
    };

    consumer.await.unwrap();
    producer.await.unwrap().expect("all eight emits succeed");

    assert_eq!(ex.partition.state(), PartitionState::Finished);
    assert!(!ex.pool.is_destroyed());
    assert_eq!(ex.partition.consumed_subpartitions(), 1);
    assert!(ex.partition.subpartition(0).unwrap().discarded_buffers() >= 5);

    ex.manager.release_partition(ex.partition.id()).unwrap();
    assert!(ex.pool.is_destroyed());
    assert_eq!(ex.pool.active_requesters(), 0);
    assert_eq!(ex.pool.outstanding_buffers(), 0);
}

/// The job-level rendition with the original timing: eight 1 KB records
/// with a 50 ms gap, a receiver that reads one buffer and stops.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_consume_with_timing() {
    let config = ExchangeConfig {
        segment_size: "1K".into(),
        buffers_per_partition: 2,
        ..Default::default()
    };
    let output = ExchangeJob::new(config)
        .named("partial")
        .with_sender(SlowBufferSender::new(8, RECORD_SIZE, Duration::from_millis(50)))
        .with_receiver(SingleBufferReceiver)
        .deploy()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(output.metrics.records_emitted, 8);
    assert_eq!(output.metrics.records_consumed, 1);
    assert!(output.pool_destroyed);
    assert_eq!(output.active_requesters, 0);
}

/// The job-level rendition with the release pinned to the producer's
/// progress instead of wall-clock timing. Two buffers are all a full pool
/// lets the producer get ahead of a consumer that holds one unread.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_consume_job_with_progress() {
    let (progress_tx, progress_rx) = watch::channel(0usize);
    let config = ExchangeConfig {
        segment_size: "1K".into(),
        buffers_per_partition: 2,
        ..Default::default()
    };
    let output = ExchangeJob::new(config)
        .with_sender(SlowBufferSender::new(8, RECORD_SIZE, Duration::ZERO).with_progress(progress_tx))
        .with_receiver(PartialReceiver::new(1).release_after(progress_rx, 2))
        .deploy()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(output.metrics.records_emitted, 8);
    assert_eq!(output.metrics.records_consumed, 1);
    assert!(output.pool_destroyed);
}

// ── Scenario 2: backpressure ───────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_emit_waits_for_recycle() {
    let ex = exchange(1, 1);
    let gate = gate(&ex, 0);

    ex.partition.emit(b"first", 0).await.unwrap();
    let second = {
        let partition = Arc::clone(&ex.partition);
        tokio::spawn(async move { partition.emit(b"second", 0).await })
    };

    let pool = ex.pool.clone();
    eventually(|| pool.stats().backpressure_waits == 1).await;
    assert!(!second.is_finished());
    assert_eq!(ex.pool.outstanding_buffers(), 1);

    let first = gate.get_next().await.unwrap().unwrap();
    assert_eq!(first.buffer.as_slice(), b"first");
    drop(first);

    second.await.unwrap().unwrap();
    let next = gate.get_next().await.unwrap().unwrap();
    assert_eq!(next.buffer.as_slice(), b"second");
}

// ── Scenario 3: release with unread buffers ────────────────────

#[tokio::test]
async fn test_release_recycles_held_buffers() {
    let ex = exchange(4, 1);
    let gate = gate(&ex, 0);
    let before = ex.pool.outstanding_buffers();

    ex.partition.emit(&record(1), 0).await.unwrap();
    ex.partition.emit(&record(2), 0).await.unwrap();
    assert_eq!(ex.pool.outstanding_buffers(), before + 2);

    gate.close().unwrap();
    assert_eq!(ex.pool.outstanding_buffers(), before);
    assert_eq!(ex.pool.stats().recycled_segments, 2);
    assert_eq!(ex.pool.active_requesters(), 1);
    assert!(!ex.pool.is_destroyed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_consumer_releases_channel() {
    let ex = exchange(4, 1);
    let gate = gate(&ex, 0);
    ex.partition.emit(&record(1), 0).await.unwrap();
    ex.partition.emit(&record(2), 0).await.unwrap();
    assert_eq!(ex.pool.active_requesters(), 2);

    // A consumer that holds one buffer and never finishes; cancelled from
    // outside.
    let consumer = tokio::spawn(async move {
        let held = gate.get_next().await;
        std::future::pending::<()>().await;
        drop(held);
    });
    let partition = Arc::clone(&ex.partition);
    eventually(|| partition.subpartition(0).unwrap().backlog() == 1).await;
    assert_eq!(ex.pool.outstanding_buffers(), 2);

    consumer.abort();
    assert!(consumer.await.unwrap_err().is_cancelled());

    assert_eq!(ex.pool.outstanding_buffers(), 0);
    assert_eq!(ex.pool.active_requesters(), 1);
    assert!(!ex.pool.is_destroyed());
}

// ── Scenario 4: emit after finish ──────────────────────────────

#[tokio::test]
async fn test_emit_after_finish_leaves_pool_untouched() {
    let ex = exchange(4, 1);
    let gate = gate(&ex, 0);
    ex.partition.emit(&record(1), 0).await.unwrap();
    ex.partition.finish().unwrap();

    let stats = ex.pool.stats();
    let outstanding = ex.pool.outstanding_buffers();
    assert!(matches!(
        ex.partition.emit(&record(2), 0).await,
        Err(PartitionError::PartitionClosed(_))
    ));
    assert_eq!(ex.pool.stats(), stats);
    assert_eq!(ex.pool.outstanding_buffers(), outstanding);

    assert!(gate.get_next().await.unwrap().is_some());
    assert!(gate.get_next().await.unwrap().is_none());
}

// ── Scenario 5: concurrent release ─────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_release_destroys_once() {
    for round in 0..50 {
        let ex = exchange(2, 1);
        let gate = gate(&ex, 0);
        ex.partition.emit(&record(round), 0).await.unwrap();
        ex.partition.finish().unwrap();
        while gate.get_next().await.unwrap().is_some() {}

        let barrier = Arc::new(Barrier::new(2));
        let producer = {
            let barrier = Arc::clone(&barrier);
            let partition = Arc::clone(&ex.partition);
            tokio::spawn(async move {
                barrier.wait().await;
                partition.release()
            })
        };
        let consumer = {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                gate.close()
            })
        };

        producer.await.unwrap().unwrap();
        consumer.await.unwrap().unwrap();

        assert!(ex.pool.is_destroyed(), "round {round}");
        assert_eq!(ex.pool.active_requesters(), 0);
        assert!(ex.pool.stats().destroyed);
        assert!(matches!(
            ex.pool.unregister_requester(),
            Err(PoolError::InvariantViolation(_))
        ));
    }
}

// ── Property: no premature destruction ─────────────────────────

#[tokio::test]
async fn test_consumers_cannot_destroy_producing_pool() {
    for consumers in 1..=4 {
        let ex = exchange(4, consumers);
        let gates: Vec<_> = (0..consumers).map(|i| gate(&ex, i)).collect();
        ex.partition.broadcast(&record(0)).await.unwrap();

        for g in &gates {
            g.close().unwrap();
            assert!(!ex.pool.is_destroyed());
        }
        assert_eq!(ex.pool.active_requesters(), 1);

        // The producer carries on as if nothing happened.
        for i in 1..10 {
            ex.partition.broadcast(&record(i)).await.unwrap();
        }
        ex.partition.finish().unwrap();
        assert!(!ex.pool.is_destroyed());

        ex.partition.release().unwrap();
        assert!(ex.pool.is_destroyed());
    }
}

// ── Property: eventual reclamation ─────────────────────────────

#[tokio::test]
async fn test_pool_reclaimed_after_last_requester() {
    let ex = exchange(4, 2);
    let g0 = gate(&ex, 0);
    let g1 = gate(&ex, 1);
    ex.partition.emit(&record(0), 0).await.unwrap();
    let held = g0.get_next().await.unwrap().unwrap();

    ex.partition.release().unwrap();
    g0.close().unwrap();
    assert!(!ex.pool.is_destroyed(), "a requester is still registered");

    g1.close().unwrap();
    assert!(ex.pool.is_destroy_requested());
    assert!(!ex.pool.is_destroyed(), "a buffer is still outstanding");

    drop(held);
    assert!(ex.pool.is_destroyed());
    assert!(matches!(
        ex.pool.request_buffer().await,
        Err(PoolError::PoolDestroyed { .. })
    ));
}

// ── Property: order preservation ───────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_order_preserved_under_backpressure() {
    const RECORDS: usize = 200;
    let ex = exchange(3, 1);
    let gate = gate(&ex, 0);

    let producer = {
        let partition = Arc::clone(&ex.partition);
        tokio::spawn(async move {
            for i in 0..RECORDS {
                partition.emit(&(i as u32).to_le_bytes(), 0).await?;
            }
            partition.finish()
        })
    };

    let mut seen = Vec::with_capacity(RECORDS);
    while let Some(next) = gate.get_next().await.unwrap() {
        let bytes: [u8; 4] = next.buffer.as_slice().try_into().unwrap();
        seen.push(u32::from_le_bytes(bytes) as usize);
    }
    producer.await.unwrap().unwrap();

    assert_eq!(seen, (0..RECORDS).collect::<Vec<_>>());
    assert!(ex.pool.stats().peak_outstanding <= 3);
}

// ── Property: reference-count conservation ─────────────────────

#[tokio::test]
async fn test_broadcast_buffer_returns_after_every_holder() {
    let ex = exchange(2, 3);
    let gates: Vec<_> = (0..3).map(|i| gate(&ex, i)).collect();
    ex.partition.broadcast(b"shared").await.unwrap();
    assert_eq!(ex.pool.outstanding_buffers(), 1);

    let mut held = Vec::new();
    for g in &gates {
        held.push(g.get_next().await.unwrap().unwrap().buffer);
    }
    assert_eq!(held[0].ref_count(), 3);

    while let Some(buffer) = held.pop() {
        assert_eq!(ex.pool.outstanding_buffers(), 1);
        buffer.recycle().unwrap();
    }
    assert_eq!(ex.pool.outstanding_buffers(), 0);
    assert_eq!(ex.pool.stats().recycled_segments, 1);
}

// ── Property: idempotent release ───────────────────────────────

#[tokio::test]
async fn test_release_twice_decrements_once() {
    let ex = exchange(2, 1);
    let channel = LocalInputChannel::new(0, ex.partition.id().clone(), 0, Arc::clone(&ex.manager));
    channel
        .request_subpartition(Arc::new(tokio::sync::Notify::new()))
        .unwrap();
    assert_eq!(ex.pool.active_requesters(), 2);

    channel.release().unwrap();
    channel.release().unwrap();
    assert_eq!(ex.pool.active_requesters(), 1);

    ex.partition.release().unwrap();
    ex.partition.release().unwrap();
    ex.partition.fail("late").unwrap();
    assert_eq!(ex.pool.active_requesters(), 0);
    assert!(ex.pool.is_destroyed());

    drop(channel);
    assert_eq!(ex.pool.active_requesters(), 0);
}

// ── Blocking partitions ────────────────────────────────────────

/// Nothing reads a blocking partition before it finishes, so a producer
/// that outgrows the pool must fail the job rather than wait forever.
#[tokio::test]
async fn test_blocking_job_larger_than_pool_fails() {
    let config = ExchangeConfig {
        segment_size: "1K".into(),
        buffers_per_partition: 2,
        partition_type: "blocking".into(),
        ..Default::default()
    };
    let job = ExchangeJob::new(config)
        .with_sender(SlowBufferSender::new(4, 16, Duration::ZERO))
        .with_receiver(PartialReceiver::draining())
        .deploy()
        .unwrap();
    let pool = job.buffer_pool().unwrap().clone();
    let manager = Arc::clone(job.manager());

    let result = tokio::time::timeout(Duration::from_secs(3), job.run())
        .await
        .expect("blocking job over capacity must not hang");
    assert!(matches!(
        result,
        Err(RuntimeError::PartitionError(
            PartitionError::BlockingPoolExhausted { capacity: 2, .. }
        ))
    ));
    assert!(pool.is_destroyed());
    assert_eq!(pool.active_requesters(), 0);
    assert_eq!(manager.num_partitions(), 0);
}

// ── Config Roundtrip ───────────────────────────────────────────

#[test]
fn test_config_toml_roundtrip() {
    let config = ExchangeConfig::default();
    let toml = config.to_toml().unwrap();
    let back = ExchangeConfig::from_toml(&toml).unwrap();
    assert_eq!(back.segment_size, config.segment_size);
    assert_eq!(back.buffers_per_partition, config.buffers_per_partition);
}
