// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # exchange-rt
//!
//! Command-line interface for the pipelined data-exchange runtime.
//!
//! ## Usage
//! ```bash
//! # A slow producer and a consumer that stops after one buffer
//! exchange-rt run --records 8 --record-size 1K --gap-ms 50 --read-count 1
//!
//! # Same exchange, described by a config file
//! exchange-rt -c exchange.toml run
//!
//! # Print the effective configuration
//! exchange-rt config
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "exchange-rt",
    about = "Buffer-pool backed pipelined data exchange with partial consumption",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (overrides CLI arguments).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one producer against one consumer per subpartition.
    Run {
        /// Size of one pooled buffer (e.g., "32K").
        #[arg(short = 's', long, default_value = "32K")]
        segment_size: String,

        /// Maximum number of buffers in the partition's pool.
        #[arg(short, long, default_value_t = 128)]
        buffers: usize,

        /// Number of subpartitions (and consumer tasks).
        #[arg(long, default_value_t = 1)]
        subpartitions: usize,

        /// Partition type: pipelined or blocking.
        #[arg(short, long, default_value = "pipelined")]
        partition_type: String,

        /// Records the producer emits.
        #[arg(short, long, default_value_t = 8)]
        records: usize,

        /// Size of one record (e.g., "1K").
        #[arg(long, default_value = "1K")]
        record_size: String,

        /// Pause between two records, in milliseconds.
        #[arg(long, default_value_t = 50)]
        gap_ms: u64,

        /// Buffers each consumer reads before it stops (0 reads everything).
        #[arg(short = 'n', long, default_value_t = 1)]
        read_count: usize,

        /// Print the metrics as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            segment_size,
            buffers,
            subpartitions,
            partition_type,
            records,
            record_size,
            gap_ms,
            read_count,
            json,
        } => {
            let config = match cli.config {
                Some(path) => runtime::ExchangeConfig::from_file(&path)?,
                None => runtime::ExchangeConfig {
                    segment_size,
                    buffers_per_partition: buffers,
                    num_subpartitions: subpartitions,
                    partition_type,
                    enable_profiling: true,
                },
            };
            let workload = commands::run::Workload {
                records,
                record_size,
                gap: std::time::Duration::from_millis(gap_ms),
                read_count,
            };
            commands::run::execute(config, workload, json).await
        }
        Commands::Config => commands::config::execute(cli.config.as_deref()),
    }
}
