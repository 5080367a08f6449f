// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # edge-rt
//!
//! Command-line interface for the edge graph runtime.
//!
//! ## Usage
//! ```bash
//! # Inspect a model: tensors, negotiation result, arena plan
//! edge-rt inspect --model ./models/mobilenet --backends planar,cpu
//!
//! # Run one inference on synthetic inputs under a deadline
//! edge-rt run --model ./models/mobilenet --memory-budget 4M \
//!     --input-shape image=1,224,224,3 --timeout-ms 500
//!
//! # Latency statistics over repeated runs
//! edge-rt benchmark --model ./models/mobilenet --iterations 100
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::EngineArgs;

#[derive(Parser)]
#[command(
    name = "edge-rt",
    about = "Operator-graph inference runtime for embedded and latency-sensitive hosts",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file; command-line flags override it.
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
    /// Run one inference on synthetic inputs.
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Abandon the run after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Time repeated inference runs.
    Benchmark {
        #[command(flatten)]
        engine: EngineArgs,

        /// Number of timed runs (after one warm-up run).
        #[arg(short = 'n', long, default_value_t = 20)]
        iterations: usize,
    },

    /// Inspect a model: graph summary, resolved tensors, negotiation result.
    Inspect {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { engine, timeout_ms } => {
            let config = engine.resolve(cli.config.as_deref())?;
            commands::run::execute(config, timeout_ms).await
        }
        Commands::Benchmark { engine, iterations } => {
            let config = engine.resolve(cli.config.as_deref())?;
            commands::benchmark::execute(config, iterations).await
        }
        Commands::Inspect { engine } => {
            let config = engine.resolve(cli.config.as_deref())?;
            commands::inspect::execute(config).await
        }
    }
}
