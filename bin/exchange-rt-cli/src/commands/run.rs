// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `exchange-rt run` command: deploy one exchange and run it to completion.

use buffer_pool::MemorySize;
use result_partition::ResultPartitionType;
use runtime::{ExchangeConfig, ExchangeJob, JobOutput, PartialReceiver, SlowBufferSender};
use std::time::Duration;

/// What the producer emits and how much each consumer reads.
#[derive(Debug)]
pub struct Workload {
    pub records: usize,
    pub record_size: String,
    pub gap: Duration,
    /// Buffers each consumer reads; `0` drains the subpartition.
    pub read_count: usize,
}

pub async fn execute(config: ExchangeConfig, workload: Workload, json: bool) -> anyhow::Result<()> {
    config.validate()?;
    let record_size = MemorySize::parse(&workload.record_size)?;
    // Nobody reads a blocking partition before it finishes.
    if config.resolve_partition_type()? == ResultPartitionType::Blocking
        && workload.records > config.buffers_per_partition
    {
        anyhow::bail!(
            "a blocking partition must hold every record: {} records > {} buffers",
            workload.records,
            config.buffers_per_partition,
        );
    }

    if !json {
        println!("╔══════════════════════════════════════════════════════╗");
        println!("║          exchange-rt · Pipelined Data Exchange       ║");
        println!("╚══════════════════════════════════════════════════════╝");
        println!();
        println!("  Config:");
        println!("   Segment size:   {}", config.segment_size);
        println!("   Pool capacity:  {} buffers", config.buffers_per_partition);
        println!("   Partition:      {} x{}", config.partition_type, config.num_subpartitions);
        println!(
            "   Workload:       {} records of {} every {}ms",
            workload.records,
            record_size,
            workload.gap.as_millis(),
        );
        println!(
            "   Consumers read: {}",
            if workload.read_count == 0 {
                "everything".to_string()
            } else {
                format!("{} buffer(s)", workload.read_count)
            },
        );
        println!();
        println!("  [1/2] Deploying partition, pool and gates...");
    }

    let mut job = ExchangeJob::new(config.clone())
        .named("exchange-rt")
        .with_sender(SlowBufferSender::new(
            workload.records,
            record_size.as_bytes(),
            workload.gap,
        ));
    for _ in 0..config.num_subpartitions {
        job = job.with_receiver(receiver(workload.read_count));
    }
    let job = job.deploy()?;

    if !json {
        if let Some(pool) = job.buffer_pool() {
            println!(
                "   Pool for {} ready: {} buffers, {} requester(s)",
                pool.partition(),
                pool.capacity(),
                pool.active_requesters(),
            );
        }
        println!("  [2/2] Running tasks...");
        println!();
    }

    let output = job.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output.metrics)?);
    } else {
        print_results(&output);
    }
    if !output.pool_destroyed {
        tracing::warn!(
            "pool not destroyed after the run ({} requester(s) still registered)",
            output.active_requesters,
        );
    }
    Ok(())
}

fn receiver(read_count: usize) -> PartialReceiver {
    if read_count == 0 {
        PartialReceiver::draining()
    } else {
        PartialReceiver::new(read_count)
    }
}

fn print_results(output: &JobOutput) {
    let stats = &output.metrics.pool_stats;
    println!("  Results:");
    println!("   Records emitted:   {}", output.metrics.records_emitted);
    println!("   Records consumed:  {}", output.metrics.records_consumed);
    for task in &output.metrics.task_metrics {
        println!(
            "   {:<18} {:?}: {} records in {:.2}ms",
            task.task_name,
            task.role,
            task.records,
            task.duration.as_secs_f64() * 1000.0,
        );
    }
    println!();
    println!("  Pool:");
    println!("   Requests:          {} ({} reused)", stats.total_requests, stats.reused_segments);
    println!("   Backpressure:      {} wait(s)", stats.backpressure_waits);
    println!("   Peak outstanding:  {}", stats.peak_outstanding);
    println!("   Destroyed:         {}", output.pool_destroyed);
    println!();
    println!("  Metrics:");
    println!("   {}", output.metrics.summary());
    println!();
}
