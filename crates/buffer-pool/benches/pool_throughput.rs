// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for buffer handout and recycling.

use buffer_pool::{BufferPool, MemorySize};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_request_recycle(c: &mut Criterion) {
    let pool = BufferPool::new("bench", MemorySize::from_kb(32), 128).unwrap();
    let payload = vec![7u8; 1024];

    c.bench_function("request_write_recycle_1k", |b| {
        b.iter(|| {
            let mut buffer = pool.try_request_buffer().unwrap().unwrap();
            buffer.write(&payload).unwrap();
            buffer.recycle().unwrap();
        })
    });
}

fn bench_retain_recycle(c: &mut Criterion) {
    let pool = BufferPool::new("bench", MemorySize::from_kb(4), 8).unwrap();

    c.bench_function("retain_4_recycle", |b| {
        b.iter(|| {
            let buffer = pool.try_request_buffer().unwrap().unwrap();
            let copies: Vec<_> = (0..4).map(|_| buffer.retain()).collect();
            buffer.recycle().unwrap();
            for copy in copies {
                copy.recycle().unwrap();
            }
        })
    });
}

fn bench_async_request(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let pool = BufferPool::new("bench", MemorySize::from_kb(32), 128).unwrap();

    c.bench_function("async_request_recycle", |b| {
        b.to_async(&runtime).iter(|| async {
            let buffer = pool.request_buffer().await.unwrap();
            drop(buffer);
        })
    });
}

criterion_group!(
    benches,
    bench_request_recycle,
    bench_retain_recycle,
    bench_async_request
);
criterion_main!(benches);
