// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `norm-check check` command: run a scenario battery and report results.

use anyhow::Context;
use norm_oracle::{run_battery, CheckConfig, ReferenceKernel};
use std::path::PathBuf;

pub fn execute(config: Option<PathBuf>, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => CheckConfig::from_file(&path)
            .with_context(|| format!("loading scenario file '{}'", path.display()))?,
        None => CheckConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }

    tracing::info!("running {} cases with seed {}", config.cases.len(), config.seed);
    let report = run_battery(&ReferenceKernel, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("╔══════════════════════════════════════════════════════╗");
        println!("║             norm-check · Oracle Battery             ║");
        println!("╚══════════════════════════════════════════════════════╝");
        println!();
        println!("  Kernel: {}", report.kernel);
        println!("  Seed:   {}", config.seed);
        println!("  Cases:  {}", report.cases.len());
        println!();
        for case in &report.cases {
            println!("  {}", case.line());
        }
        println!();
        println!("  {}", report.summary());
    }

    if !report.passed() {
        anyhow::bail!(
            "{} of {} cases failed",
            report.cases.len() - report.num_passed(),
            report.cases.len()
        );
    }
    Ok(())
}
