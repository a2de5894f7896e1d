// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # norm-check
//!
//! Command-line interface for the layer-normalization kernel oracle.
//!
//! ## Usage
//! ```bash
//! # Run the built-in scenario battery against the reference kernel
//! norm-check check
//!
//! # Run a scenario file, emit a JSON report
//! norm-check check --config scenarios.toml --json
//!
//! # Sweep the shape battery across element types
//! norm-check sweep --dtypes f64,f32,f16,bf16
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "norm-check",
    about = "Test oracle for layer-normalization kernels",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario battery and report per-case results.
    Check {
        /// Path to a TOML scenario file (defaults to the built-in battery).
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Override the RNG seed from the scenario file.
        #[arg(long)]
        seed: Option<u64>,

        /// Emit the full report as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Run the shape battery at each element type and print a summary table.
    Sweep {
        /// Comma-separated element types to sweep.
        #[arg(long, default_value = "f64,f32,f16,bf16")]
        dtypes: String,

        /// Override the RNG seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Check { config, seed, json } => commands::check::execute(config, seed, json),
        Commands::Sweep { dtypes, seed } => commands::sweep::execute(&dtypes, seed),
    }
}
