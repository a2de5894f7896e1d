// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `norm-check sweep` command: run the shape battery at each element type.

use norm_oracle::{run_battery, CheckConfig, ReferenceKernel};
use tensor_core::DType;

pub fn execute(dtypes: &str, seed: Option<u64>) -> anyhow::Result<()> {
    let dtypes: Vec<DType> = dtypes
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<DType>().map_err(anyhow::Error::msg))
        .collect::<Result<_, _>>()?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              norm-check · Dtype Sweep               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!(
        "  {:<6} {:>6}/{:<6} {:>14} {:>14}",
        "dtype", "pass", "cases", "worst fwd", "worst grad"
    );

    let mut all_passed = true;
    for dtype in dtypes {
        let mut config = CheckConfig {
            cases: CheckConfig::battery_for(dtype),
            ..Default::default()
        };
        if let Some(seed) = seed {
            config.seed = seed;
        }

        let report = run_battery(&ReferenceKernel, &config)?;
        all_passed &= report.passed();
        println!(
            "  {:<6} {:>6}/{:<6} {:>14.2e} {:>14.2e}",
            dtype.as_str(),
            report.num_passed(),
            report.cases.len(),
            report.worst_forward_error(),
            report.worst_grad_error(),
        );
    }

    println!();
    if !all_passed {
        anyhow::bail!("sweep had failing cases");
    }
    println!("  all dtypes passed");
    Ok(())
}
