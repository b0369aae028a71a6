// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for complete producer → consumer exchanges.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use runtime::{ExchangeConfig, ExchangeJob, PartialReceiver, SlowBufferSender};
use std::time::Duration;

fn config(buffers: usize) -> ExchangeConfig {
    ExchangeConfig {
        segment_size: "4K".into(),
        buffers_per_partition: buffers,
        enable_profiling: false,
        ..Default::default()
    }
}

fn bench_full_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .build()
        .unwrap();

    let mut group = c.benchmark_group("full_drain_1k_records");
    for buffers in [1usize, 8, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(buffers), &buffers, |b, &buffers| {
            b.to_async(&runtime).iter(|| async move {
                ExchangeJob::new(config(buffers))
                    .with_sender(SlowBufferSender::new(1000, 1024, Duration::ZERO))
                    .with_receiver(PartialReceiver::draining())
                    .deploy()
                    .unwrap()
                    .run()
                    .await
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_partial_consume(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .build()
        .unwrap();

    c.bench_function("partial_consume_1_of_1000", |b| {
        b.to_async(&runtime).iter(|| async {
            ExchangeJob::new(config(8))
                .with_sender(SlowBufferSender::new(1000, 1024, Duration::ZERO))
                .with_receiver(PartialReceiver::new(1))
                .deploy()
                .unwrap()
                .run()
                .await
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_full_drain, bench_partial_consume);
criterion_main!(benches);
