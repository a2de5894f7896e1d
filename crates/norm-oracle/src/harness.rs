// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runs check cases through a kernel and scores them.
//!
//! Per case the harness runs four checks:
//! 1. kernel forward vs reference forward (output, mean, variance);
//! 2. kernel backward vs reference backward (input and parameter gradients);
//! 3. the statistical identity on the kernel's pre-affine output;
//! 4. a first-order gradient check of the kernel's input gradient
//!    (full precisions on moderately sized cases only);
//! plus, for reduced-precision cases, consistency of the narrow data path
//! against the f32 path on the same values.

use crate::case::CheckCase;
use crate::config::CheckConfig;
use crate::kernel::NormKernel;
use crate::report::{CaseReport, CheckReport, IdentityCheck, TaylorCheck};
use crate::tolerance::{compare, Comparison, Tolerance};
use crate::OracleError;
use rand::{rngs::StdRng, SeedableRng};
use tensor_core::{DType, NormConfig, Shape, Tensor};

/// Cases above this element count skip the finite-difference gradient check;
/// the analytic comparison still covers them.
const TAYLOR_MAX_ELEMENTS: usize = 16_384;

/// Materializes and runs every case in the config against `kernel`.
pub fn run_battery(
    kernel: &dyn NormKernel,
    config: &CheckConfig,
) -> Result<CheckReport, OracleError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut cases = Vec::with_capacity(config.cases.len());

    for spec in &config.cases {
        let case = CheckCase::materialize(spec, &mut rng)?;
        let report = run_case(kernel, &case, config)?;
        tracing::info!("{}", report.line());
        cases.push(report);
    }

    let report = CheckReport {
        kernel: kernel.name().to_string(),
        cases,
    };
    tracing::info!("{}", report.summary());
    Ok(report)
}

/// Runs a single materialized case against `kernel`.
pub fn run_case(
    kernel: &dyn NormKernel,
    case: &CheckCase,
    config: &CheckConfig,
) -> Result<CaseReport, OracleError> {
    let spec = &case.spec;
    let tol = config.tolerance_for(spec.dtype);
    let norm_cfg = NormConfig {
        begin_norm_axis: spec.begin_norm_axis,
        epsilon: spec.epsilon,
        keep_scale_bias_f32: config.keep_scale_bias_f32,
    };

    let scale_view = case.scale.as_ref().map(|t| t.view());
    let bias_view = case.bias.as_ref().map(|t| t.view());

    // Reference forward/backward.
    let expected = tensor_core::layer_norm(
        &case.input.view(),
        scale_view.as_ref(),
        bias_view.as_ref(),
        &norm_cfg,
    )?;
    let expected_grads = tensor_core::layer_norm_grad(
        &case.input.view(),
        &case.grad_output.view(),
        scale_view.as_ref(),
        bias_view.as_ref(),
        &expected.mean.view(),
        &expected.variance.view(),
        &norm_cfg,
    )?;

    // Kernel under test, running backward from its own statistics.
    let actual = kernel.forward(
        &case.input.view(),
        scale_view.as_ref(),
        bias_view.as_ref(),
        &norm_cfg,
    )?;
    let actual_grads = kernel.backward(
        &case.input.view(),
        &case.grad_output.view(),
        scale_view.as_ref(),
        bias_view.as_ref(),
        &actual.mean.view(),
        &actual.variance.view(),
        &norm_cfg,
    )?;

    let forward = compare(
        &actual.output.to_f64_vec(),
        &expected.output.to_f64_vec(),
        tol,
    );
    let mean = compare(&actual.mean.to_f64_vec(), &expected.mean.to_f64_vec(), tol);
    let variance = compare(
        &actual.variance.to_f64_vec(),
        &expected.variance.to_f64_vec(),
        tol,
    );
    let grad_input = compare(
        &actual_grads.grad_input.to_f64_vec(),
        &expected_grads.grad_input.to_f64_vec(),
        tol,
    );
    let grad_scale = compare_optional(
        kernel.name(),
        &spec.name,
        "grad_scale",
        actual_grads.grad_scale.as_ref(),
        expected_grads.grad_scale.as_ref(),
        tol,
    )?;
    let grad_bias = compare_optional(
        kernel.name(),
        &spec.name,
        "grad_bias",
        actual_grads.grad_bias.as_ref(),
        expected_grads.grad_bias.as_ref(),
        tol,
    )?;

    let identity = identity_check(kernel, case, &norm_cfg, tol)?;
    let taylor = taylor_check(kernel, case, &norm_cfg, &actual_grads.grad_input)?;
    let precision = precision_check(case, &norm_cfg, tol)?;

    let passed = forward.ok()
        && mean.ok()
        && variance.ok()
        && grad_input.ok()
        && grad_scale.as_ref().map_or(true, Comparison::ok)
        && grad_bias.as_ref().map_or(true, Comparison::ok)
        && identity.passed
        && taylor.as_ref().map_or(true, |t| t.passed)
        && precision.as_ref().map_or(true, Comparison::ok);

    Ok(CaseReport {
        name: spec.name.clone(),
        dtype: spec.dtype,
        shape: spec.shape.clone(),
        begin_norm_axis: spec.begin_norm_axis,
        forward,
        mean,
        variance,
        grad_input,
        grad_scale,
        grad_bias,
        identity,
        taylor,
        precision,
        passed,
    })
}

fn compare_optional(
    kernel: &str,
    case: &str,
    label: &str,
    actual: Option<&Tensor>,
    expected: Option<&Tensor>,
    tol: Tolerance,
) -> Result<Option<Comparison>, OracleError> {
    match (actual, expected) {
        (None, None) => Ok(None),
        (Some(a), Some(e)) => Ok(Some(compare(&a.to_f64_vec(), &e.to_f64_vec(), tol))),
        (a, _) => Err(OracleError::Kernel {
            kernel: kernel.to_string(),
            case: case.to_string(),
            detail: format!(
                "{label} presence mismatch: kernel returned {}, reference returned the opposite",
                if a.is_some() { "Some" } else { "None" }
            ),
        }),
    }
}

/// Checks the statistical identity on the kernel's pre-affine output: every
/// row must have mean ≈ 0 and variance equal to `raw / (raw + eps)`, which
/// is ≈ 1 away from constant rows and 0 in the degenerate D = 1 case.
fn identity_check(
    kernel: &dyn NormKernel,
    case: &CheckCase,
    cfg: &NormConfig,
    tol: Tolerance,
) -> Result<IdentityCheck, OracleError> {
    let plain = kernel.forward(&case.input.view(), None, None, cfg)?;
    let y = plain.output.to_f64_vec();
    let adjusted = plain.variance.to_f64_vec();

    let (n, d) = case
        .input
        .shape()
        .split_at(cfg.begin_norm_axis)
        .ok_or_else(|| {
            OracleError::Config(format!(
                "case '{}': begin_norm_axis {} out of range",
                case.spec.name, cfg.begin_norm_axis
            ))
        })?;

    let mut max_row_mean = 0.0f64;
    let mut max_variance_deviation = 0.0f64;
    let mut passed = true;
    for i in 0..n {
        let row = &y[i * d..(i + 1) * d];
        let m = row.iter().sum::<f64>() / d as f64;
        let v = row.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / d as f64;
        let expected_v = (adjusted[i] - cfg.epsilon).max(0.0) / adjusted[i];
        max_row_mean = max_row_mean.max(m.abs());
        max_variance_deviation = max_variance_deviation.max((v - expected_v).abs());
        passed = passed && tol.allclose(m, 0.0) && tol.allclose(v, expected_v);
    }

    Ok(IdentityCheck {
        max_row_mean,
        max_variance_deviation,
        passed,
    })
}

/// First-order gradient check: perturbs the input along the sign of the
/// kernel's own gradient (no cancellation in the directional derivative) and
/// compares a central finite difference of the probe loss
/// `L(x) = Σ grad_output ∘ y(x)` against the analytic value.
fn taylor_check(
    kernel: &dyn NormKernel,
    case: &CheckCase,
    cfg: &NormConfig,
    grad_input: &Tensor,
) -> Result<Option<TaylorCheck>, OracleError> {
    let dtype = case.spec.dtype;
    let len = case.input.shape().num_elements();
    if dtype.is_reduced_precision() || len > TAYLOR_MAX_ELEMENTS {
        tracing::debug!(
            "case '{}': gradient check skipped ({})",
            case.spec.name,
            if dtype.is_reduced_precision() {
                "reduced precision"
            } else {
                "oversized"
            }
        );
        return Ok(None);
    }

    let (h, threshold) = match dtype {
        DType::F64 => (1e-5, 1e-5),
        _ => (1e-3, 1e-2),
    };

    let x = case.input.to_f64_vec();
    let gy = case.grad_output.to_f64_vec();
    let grad = grad_input.to_f64_vec();
    let direction: Vec<f64> = grad
        .iter()
        .map(|&g| if g >= 0.0 { 1.0 } else { -1.0 })
        .collect();

    let scale_view = case.scale.as_ref().map(|t| t.view());
    let bias_view = case.bias.as_ref().map(|t| t.view());
    let shape = case.input.shape().clone();

    let loss_at = |values: &[f64]| -> Result<f64, OracleError> {
        let tensor = tensor_from_f64(shape.clone(), values, dtype)?;
        let out = kernel.forward(&tensor.view(), scale_view.as_ref(), bias_view.as_ref(), cfg)?;
        Ok(out
            .output
            .to_f64_vec()
            .iter()
            .zip(&gy)
            .map(|(&y, &g)| y * g)
            .sum())
    };

    let plus: Vec<f64> = x.iter().zip(&direction).map(|(&v, &u)| v + h * u).collect();
    let minus: Vec<f64> = x.iter().zip(&direction).map(|(&v, &u)| v - h * u).collect();
    let finite_difference = (loss_at(&plus)? - loss_at(&minus)?) / 2.0;
    let analytic: f64 = grad
        .iter()
        .zip(&direction)
        .map(|(&g, &u)| g * h * u)
        .sum();

    let rel_error = (finite_difference - analytic).abs() / analytic.abs().max(1e-9);
    Ok(Some(TaylorCheck {
        finite_difference,
        analytic,
        rel_error,
        passed: rel_error <= threshold,
    }))
}

fn tensor_from_f64(shape: Shape, values: &[f64], dtype: DType) -> Result<Tensor, OracleError> {
    let tensor = match dtype {
        DType::F64 => Tensor::from_f64(shape, values)?,
        _ => {
            let narrow: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            Tensor::from_f32(shape, &narrow)?
        }
    };
    Ok(tensor)
}

/// For reduced-precision cases, runs the reference on an f32 twin of the
/// same data and compares the two forward outputs. Captures expected
/// precision loss, not kernel defects, hence the reference on both sides.
fn precision_check(
    case: &CheckCase,
    cfg: &NormConfig,
    tol: Tolerance,
) -> Result<Option<Comparison>, OracleError> {
    if !case.spec.dtype.is_reduced_precision() {
        return Ok(None);
    }

    let shape = case.input.shape().clone();
    let wide_input = Tensor::from_f32(shape, &case.input.to_f32_vec())?;
    let wide_scale = upcast_param(case.scale.as_ref())?;
    let wide_bias = upcast_param(case.bias.as_ref())?;

    let scale_view = case.scale.as_ref().map(|t| t.view());
    let bias_view = case.bias.as_ref().map(|t| t.view());
    let narrow = tensor_core::layer_norm(
        &case.input.view(),
        scale_view.as_ref(),
        bias_view.as_ref(),
        cfg,
    )?;

    let wide_scale_view = wide_scale.as_ref().map(|t| t.view());
    let wide_bias_view = wide_bias.as_ref().map(|t| t.view());
    let wide = tensor_core::layer_norm(
        &wide_input.view(),
        wide_scale_view.as_ref(),
        wide_bias_view.as_ref(),
        cfg,
    )?;

    Ok(Some(compare(
        &narrow.output.to_f64_vec(),
        &wide.output.to_f64_vec(),
        tol,
    )))
}

fn upcast_param(param: Option<&Tensor>) -> Result<Option<Tensor>, OracleError> {
    let Some(t) = param else {
        return Ok(None);
    };
    Ok(Some(Tensor::from_f32(
        t.shape().clone(),
        &t.to_f32_vec(),
    )?))
}
