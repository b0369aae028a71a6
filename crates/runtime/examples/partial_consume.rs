// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: a consumer that stops after a few buffers while the producer
//! keeps writing.
//!
//! Runs the same job with different pool capacities and reads, showing that
//! the producer always completes and the pool is always reclaimed once the
//! job releases the partition.
//!
//! ```bash
//! cargo run -p runtime --example partial_consume
//! ```

use runtime::{ExchangeConfig, ExchangeJob, PartialReceiver, SlowBufferSender};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing.
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .init();

    println!(
        "{:<10} {:>8} {:>10} {:>10} {:>12} {:>10}",
        "Buffers", "Reads", "Emitted", "Consumed", "Backpressure", "Destroyed",
    );
    println!("{}", "-".repeat(66));

    for buffers in [1usize, 4, 32] {
        for reads in [0usize, 1, 16] {
            let config = ExchangeConfig {
                segment_size: "1K".into(),
                buffers_per_partition: buffers,
                ..Default::default()
            };
            // 0 reads drains the stream, as with `exchange-rt run -n 0`.
            let receiver = if reads == 0 {
                PartialReceiver::draining()
            } else {
                PartialReceiver::new(reads)
            };
            let output = ExchangeJob::new(config)
                .named(format!("demo-{buffers}-{reads}"))
                .with_sender(SlowBufferSender::new(64, 1024, Duration::from_micros(200)))
                .with_receiver(receiver)
                .deploy()?
                .run()
                .await?;

            println!(
                "{:<10} {:>8} {:>10} {:>10} {:>12} {:>10}",
                buffers,
                if reads == 0 { "all".to_string() } else { reads.to_string() },
                output.metrics.records_emitted,
                output.metrics.records_consumed,
                output.metrics.pool_stats.backpressure_waits,
                output.pool_destroyed,
            );
        }
    }

    Ok(())
}
