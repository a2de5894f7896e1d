// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer normalization backward reference.
//!
//! Given the upstream gradient and the statistics saved by the forward pass,
//! computes the analytic gradients with respect to the input and, when they
//! participated, the scale and bias parameters. Purely closed-form; the only
//! approximation is floating-point rounding.

use super::layer_norm_op::{param_to_f32, split_norm_axes, validate_param, NormConfig};
use crate::{DType, Shape, Tensor, TensorError, TensorView};
use num_traits::Float;

/// Result of the backward reference.
#[derive(Debug)]
pub struct LayerNormGrads {
    /// Gradient with respect to the input; same shape and dtype as the input.
    pub grad_input: Tensor,
    /// Gradient with respect to scale, length D; present iff scale
    /// participated in the forward pass. Matches the parameter's dtype.
    pub grad_scale: Option<Tensor>,
    /// Gradient with respect to bias, length D; present iff bias
    /// participated. Matches the parameter's dtype.
    pub grad_bias: Option<Tensor>,
}

/// Computes the layer-normalization backward reference.
///
/// `mean` and `variance` must be the statistics produced by the matching
/// forward call (variance already epsilon-adjusted). Absent scale/bias are
/// treated as 1 and 0 in every formula; only the presence of the parameter
/// gradients changes, never which correction terms are applied.
///
/// # Errors
/// - [`TensorError::InvalidShape`] if `begin_norm_axis` exceeds the rank or
///   a dimension is zero.
/// - [`TensorError::ShapeMismatch`] if `grad_output` differs from the input
///   shape, the statistics are not length N, or a parameter is not rank-1
///   length D.
/// - [`TensorError::UnsupportedDType`] for operand dtypes that cannot have
///   come from the forward pass.
/// - [`TensorError::InvalidConfig`] if a row's stored variance is not
///   positive.
#[allow(clippy::too_many_arguments)]
pub fn layer_norm_grad(
    input: &TensorView<'_>,
    grad_output: &TensorView<'_>,
    scale: Option<&TensorView<'_>>,
    bias: Option<&TensorView<'_>>,
    mean: &TensorView<'_>,
    variance: &TensorView<'_>,
    config: &NormConfig,
) -> Result<LayerNormGrads, TensorError> {
    const OP: &str = "layer_norm_grad";

    let (n, d) = split_norm_axes(OP, input.shape(), config.begin_norm_axis)?;

    if grad_output.shape() != input.shape() {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            lhs: grad_output.shape().clone(),
            rhs: input.shape().clone(),
        });
    }
    if grad_output.dtype() != input.dtype() {
        return Err(TensorError::UnsupportedDType {
            op: OP,
            dtype: grad_output.dtype(),
        });
    }
    validate_param(OP, scale, d, input.dtype())?;
    validate_param(OP, bias, d, input.dtype())?;
    validate_stats(OP, mean, n, input.dtype())?;
    validate_stats(OP, variance, n, input.dtype())?;

    match input.dtype() {
        DType::F64 => {
            let terms = grad_rows(
                OP,
                input.as_f64_slice(),
                grad_output.as_f64_slice(),
                scale.map(|t| t.as_f64_slice()),
                mean.as_f64_slice(),
                variance.as_f64_slice(),
                n,
                d,
                scale.is_some(),
                bias.is_some(),
            )?;
            Ok(LayerNormGrads {
                grad_input: Tensor::from_f64(input.shape().clone(), &terms.grad_input)?,
                grad_scale: terms
                    .grad_scale
                    .map(|g| Tensor::from_f64(Shape::vector(d), &g))
                    .transpose()?,
                grad_bias: terms
                    .grad_bias
                    .map(|g| Tensor::from_f64(Shape::vector(d), &g))
                    .transpose()?,
            })
        }
        DType::F32 => {
            let terms = grad_rows(
                OP,
                input.as_f32_slice(),
                grad_output.as_f32_slice(),
                scale.map(|t| t.as_f32_slice()),
                mean.as_f32_slice(),
                variance.as_f32_slice(),
                n,
                d,
                scale.is_some(),
                bias.is_some(),
            )?;
            Ok(LayerNormGrads {
                grad_input: Tensor::from_f32(input.shape().clone(), &terms.grad_input)?,
                grad_scale: terms
                    .grad_scale
                    .map(|g| Tensor::from_f32(Shape::vector(d), &g))
                    .transpose()?,
                grad_bias: terms
                    .grad_bias
                    .map(|g| Tensor::from_f32(Shape::vector(d), &g))
                    .transpose()?,
            })
        }
        DType::F16 | DType::BF16 => {
            // Upcast boundary: mirror the forward pass at f32.
            let src = input.to_f32_vec();
            let grad_y = grad_output.to_f32_vec();
            let scale_v = param_to_f32(scale, input.dtype(), config);

            let terms = grad_rows(
                OP,
                &src,
                &grad_y,
                scale_v.as_deref(),
                mean.as_f32_slice(),
                variance.as_f32_slice(),
                n,
                d,
                scale.is_some(),
                bias.is_some(),
            )?;

            // Parameter gradients land in the parameter's own dtype;
            // grad_input returns to the input's storage dtype.
            let scale_dtype = scale.map(|v| v.dtype()).unwrap_or(input.dtype());
            let bias_dtype = bias.map(|v| v.dtype()).unwrap_or(input.dtype());
            Ok(LayerNormGrads {
                grad_input: Tensor::from_f32_cast(
                    input.shape().clone(),
                    &terms.grad_input,
                    input.dtype(),
                )?,
                grad_scale: terms
                    .grad_scale
                    .map(|g| Tensor::from_f32_cast(Shape::vector(d), &g, scale_dtype))
                    .transpose()?,
                grad_bias: terms
                    .grad_bias
                    .map(|g| Tensor::from_f32_cast(Shape::vector(d), &g, bias_dtype))
                    .transpose()?,
            })
        }
    }
}

struct GradTerms<T> {
    grad_input: Vec<T>,
    grad_scale: Option<Vec<T>>,
    grad_bias: Option<Vec<T>>,
}

/// Computes the analytic gradients on the `[N, D]` row view.
///
/// The input gradient is the sum of three terms per element:
/// a direct term `gy * rsqrt(var) * s`, a broadcast mean correction
/// `(1/D) * Σ_j(-rsqrt(var) * gy * s)`, and a variance correction
/// `Σ_j(-(1/var) * (x - mean) * gy * s) * (1/D) * rsqrt(var) * (x - mean)`.
#[allow(clippy::too_many_arguments)]
fn grad_rows<T: Float>(
    op: &'static str,
    src: &[T],
    grad_y: &[T],
    scale: Option<&[T]>,
    mean: &[T],
    variance: &[T],
    n: usize,
    d: usize,
    want_scale_grad: bool,
    want_bias_grad: bool,
) -> Result<GradTerms<T>, TensorError> {
    let count = T::from(d).ok_or_else(|| TensorError::Numeric {
        op,
        detail: format!("row length {d} not representable in compute precision"),
    })?;

    let mut grad_input = vec![T::zero(); src.len()];
    let mut grad_scale = want_scale_grad.then(|| vec![T::zero(); d]);
    let mut grad_bias = want_bias_grad.then(|| vec![T::zero(); d]);

    for row in 0..n {
        let offset = row * d;
        let row_src = &src[offset..offset + d];
        let row_gy = &grad_y[offset..offset + d];
        let row_mean = mean[row];
        let row_var = variance[row];

        if !row_var.is_finite() {
            return Err(TensorError::Numeric {
                op,
                detail: format!("row {row} has a non-finite variance"),
            });
        }
        if row_var <= T::zero() {
            return Err(TensorError::InvalidConfig {
                op,
                detail: format!("row {row} has non-positive adjusted variance"),
            });
        }

        let inv_std = row_var.sqrt().recip();
        let inv_var = row_var.recip();

        // Row sums feeding the mean and variance corrections. The mean
        // correction analytically carries a second summand proportional to
        // Σ_j (x[j] - mean), which is identically zero for a row centered on
        // its own mean, so only this sum survives.
        let mut mean_sum = T::zero();
        let mut var_sum = T::zero();
        for j in 0..d {
            let s = scale.map_or_else(T::one, |g| g[j]);
            let gy = row_gy[j];
            let centered = row_src[j] - row_mean;
            mean_sum = mean_sum - inv_std * gy * s;
            var_sum = var_sum - inv_var * centered * gy * s;
        }
        let mean_term = mean_sum / count;

        for j in 0..d {
            let s = scale.map_or_else(T::one, |g| g[j]);
            let gy = row_gy[j];
            let centered = row_src[j] - row_mean;

            let direct = gy * inv_std * s;
            let var_term = var_sum * (centered * inv_std / count);
            grad_input[offset + j] = direct + mean_term + var_term;

            if let Some(gs) = grad_scale.as_mut() {
                gs[j] = gs[j] + centered * inv_std * gy;
            }
            if let Some(gb) = grad_bias.as_mut() {
                gb[j] = gb[j] + gy;
            }
        }
    }

    Ok(GradTerms {
        grad_input,
        grad_scale,
        grad_bias,
    })
}

/// Validates a statistics operand: rank 1, length N, in the forward pass's
/// compute precision (f32 for reduced-precision inputs).
fn validate_stats(
    op: &'static str,
    stats: &TensorView<'_>,
    n: usize,
    input_dtype: DType,
) -> Result<(), TensorError> {
    if stats.shape().rank() != 1 || stats.shape().num_elements() != n {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: stats.shape().clone(),
            rhs: Shape::vector(n),
        });
    }
    let expected = match input_dtype {
        DType::F64 => DType::F64,
        _ => DType::F32,
    };
    if stats.dtype() != expected {
        return Err(TensorError::UnsupportedDType {
            op,
            dtype: stats.dtype(),
        });
    }
    Ok(())
}
