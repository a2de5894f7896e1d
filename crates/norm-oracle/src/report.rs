// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Structured results of an oracle run.
//!
//! [`CaseReport`] captures every comparison and property check for one case;
//! [`CheckReport`] aggregates a battery. Both serialize to JSON for machine
//! consumption, and `summary()` renders the human line the CLI prints.

use crate::tolerance::Comparison;
use tensor_core::DType;

/// Result of the statistical-identity check: pre-affine output rows must
/// have mean ≈ 0 and variance matching the normalized expectation.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IdentityCheck {
    /// Largest |row mean| seen.
    pub max_row_mean: f64,
    /// Largest deviation of a row's variance from its expected value.
    pub max_variance_deviation: f64,
    /// Whether both stayed inside the case's tolerance band.
    pub passed: bool,
}

/// Result of the first-order gradient check: a central finite difference of
/// the probe loss along a fixed direction against the analytic directional
/// derivative.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TaylorCheck {
    /// Finite-difference estimate of the directional derivative.
    pub finite_difference: f64,
    /// Analytic directional derivative from the kernel's input gradient.
    pub analytic: f64,
    /// Relative disagreement between the two.
    pub rel_error: f64,
    /// Whether the disagreement stayed under the check's threshold.
    pub passed: bool,
}

/// Everything the oracle measured for one case.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CaseReport {
    /// Case name from the spec.
    pub name: String,
    /// Element type.
    pub dtype: DType,
    /// Input shape.
    pub shape: Vec<usize>,
    /// First normalized axis.
    pub begin_norm_axis: usize,
    /// Kernel output vs reference output.
    pub forward: Comparison,
    /// Kernel mean vs reference mean.
    pub mean: Comparison,
    /// Kernel variance vs reference variance.
    pub variance: Comparison,
    /// Kernel input gradient vs reference input gradient.
    pub grad_input: Comparison,
    /// Scale-gradient comparison, present iff scale participated.
    pub grad_scale: Option<Comparison>,
    /// Bias-gradient comparison, present iff bias participated.
    pub grad_bias: Option<Comparison>,
    /// Statistical-identity property check.
    pub identity: IdentityCheck,
    /// First-order gradient check; `None` when skipped (reduced precision or
    /// oversized case).
    pub taylor: Option<TaylorCheck>,
    /// Reduced-precision consistency against the f32 path; `None` for full
    /// precisions.
    pub precision: Option<Comparison>,
    /// Conjunction of every check above.
    pub passed: bool,
}

impl CaseReport {
    /// Renders the one-line summary the CLI prints per case.
    pub fn line(&self) -> String {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        let mut line = format!(
            "[{verdict}] {} ({} {:?} axis={}): fwd {:.1e}, grad {:.1e}, identity {:.1e}",
            self.name,
            self.dtype,
            self.shape,
            self.begin_norm_axis,
            self.forward.max_abs_error,
            self.grad_input.max_abs_error,
            self.identity.max_row_mean,
        );
        if let Some(t) = &self.taylor {
            line.push_str(&format!(", taylor {:.1e}", t.rel_error));
        }
        if let Some(p) = &self.precision {
            line.push_str(&format!(", f32-path {:.1e}", p.max_abs_error));
        }
        line
    }
}

/// Aggregate result of a battery run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    /// Name of the kernel under test.
    pub kernel: String,
    /// Per-case results in battery order.
    pub cases: Vec<CaseReport>,
}

impl CheckReport {
    /// Returns `true` when every case passed.
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    /// Number of cases that passed.
    pub fn num_passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    /// Largest forward output error across the battery.
    pub fn worst_forward_error(&self) -> f64 {
        self.cases
            .iter()
            .map(|c| c.forward.max_abs_error)
            .fold(0.0, f64::max)
    }

    /// Largest input-gradient error across the battery.
    pub fn worst_grad_error(&self) -> f64 {
        self.cases
            .iter()
            .map(|c| c.grad_input.max_abs_error)
            .fold(0.0, f64::max)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "oracle: {}/{} cases passed for kernel '{}', worst fwd err {:.1e}, worst grad err {:.1e}",
            self.num_passed(),
            self.cases.len(),
            self.kernel,
            self.worst_forward_error(),
            self.worst_grad_error(),
        )
    }
}
