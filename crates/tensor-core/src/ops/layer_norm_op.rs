// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer normalization forward reference.
//!
//! The input is factored into an `[N, D]` row view at `begin_norm_axis`:
//! N outer rows, each normalized over its D-element suffix:
//!
//! `y = scale * (x - mean) / sqrt(var + eps) + bias`
//!
//! Per-row mean and epsilon-adjusted variance are returned alongside the
//! output so the backward pass can reuse them. `F64`/`F32` inputs compute in
//! their own precision; `F16`/`BF16` inputs are upcast to `f32` for every
//! arithmetic step and only the final output is downcast.

use crate::{DType, Shape, Tensor, TensorError, TensorView};
use num_traits::Float;

/// Parameters shared by the forward and backward reference routines.
#[derive(Debug, Clone, Copy)]
pub struct NormConfig {
    /// First normalized axis: dimensions before it form the outer rows,
    /// dimensions from it onward are flattened into the normalized suffix.
    /// `begin_norm_axis == rank` is legal and yields the degenerate D = 1.
    pub begin_norm_axis: usize,
    /// Stabilizer added to the population variance.
    pub epsilon: f64,
    /// When a reduced-precision input carries `F32` scale/bias, keep them at
    /// f32 (`true`) or round them through the storage dtype first (`false`).
    /// Accumulation precision only; the formula is identical either way.
    pub keep_scale_bias_f32: bool,
}

impl NormConfig {
    /// Creates a config with the default precision handling
    /// (`keep_scale_bias_f32 = true`).
    pub fn new(begin_norm_axis: usize, epsilon: f64) -> Self {
        Self {
            begin_norm_axis,
            epsilon,
            keep_scale_bias_f32: true,
        }
    }
}

impl Default for NormConfig {
    fn default() -> Self {
        Self::new(1, 1e-5)
    }
}

/// Result of the forward reference: the normalized tensor plus the per-row
/// statistics needed by the backward pass.
#[derive(Debug)]
pub struct LayerNormOutput {
    /// Normalized (and optionally scaled/shifted) tensor; same shape and
    /// dtype as the input.
    pub output: Tensor,
    /// Per-row mean, length N.
    pub mean: Tensor,
    /// Per-row epsilon-adjusted variance (population variance + epsilon),
    /// length N.
    pub variance: Tensor,
}

/// Computes the layer-normalization forward reference.
///
/// `scale` and `bias` are optional rank-1 tensors of length D, broadcast over
/// the normalized suffix of every row; absent parameters behave as 1 and 0.
/// Their dtype must match the input, except that `F32` parameters are
/// accepted alongside an `F16`/`BF16` input (mixed-precision convention,
/// governed by [`NormConfig::keep_scale_bias_f32`]).
///
/// # Errors
/// - [`TensorError::InvalidShape`] if `begin_norm_axis` exceeds the rank or
///   a dimension is zero.
/// - [`TensorError::ShapeMismatch`] if a parameter is not rank-1 length D.
/// - [`TensorError::UnsupportedDType`] if a parameter dtype is not accepted.
/// - [`TensorError::InvalidConfig`] if a row's adjusted variance is not
///   positive (a non-positive epsilon meeting a constant row).
pub fn layer_norm(
    input: &TensorView<'_>,
    scale: Option<&TensorView<'_>>,
    bias: Option<&TensorView<'_>>,
    config: &NormConfig,
) -> Result<LayerNormOutput, TensorError> {
    const OP: &str = "layer_norm";

    let (n, d) = split_norm_axes(OP, input.shape(), config.begin_norm_axis)?;
    validate_param(OP, scale, d, input.dtype())?;
    validate_param(OP, bias, d, input.dtype())?;

    match input.dtype() {
        DType::F64 => {
            let src = input.as_f64_slice();
            let scale_s = scale.map(|t| t.as_f64_slice());
            let bias_s = bias.map(|t| t.as_f64_slice());

            let mut output = vec![0f64; src.len()];
            let mut mean = vec![0f64; n];
            let mut variance = vec![0f64; n];
            normalize_rows(
                OP,
                src,
                scale_s,
                bias_s,
                config.epsilon,
                n,
                d,
                &mut output,
                &mut mean,
                &mut variance,
            )?;

            Ok(LayerNormOutput {
                output: Tensor::from_f64(input.shape().clone(), &output)?,
                mean: Tensor::from_f64(Shape::vector(n), &mean)?,
                variance: Tensor::from_f64(Shape::vector(n), &variance)?,
            })
        }
        DType::F32 => {
            let src = input.as_f32_slice();
            let scale_s = scale.map(|t| t.as_f32_slice());
            let bias_s = bias.map(|t| t.as_f32_slice());

            let mut output = vec![0f32; src.len()];
            let mut mean = vec![0f32; n];
            let mut variance = vec![0f32; n];
            normalize_rows(
                OP,
                src,
                scale_s,
                bias_s,
                config.epsilon as f32,
                n,
                d,
                &mut output,
                &mut mean,
                &mut variance,
            )?;

            Ok(LayerNormOutput {
                output: Tensor::from_f32(input.shape().clone(), &output)?,
                mean: Tensor::from_f32(Shape::vector(n), &mean)?,
                variance: Tensor::from_f32(Shape::vector(n), &variance)?,
            })
        }
        DType::F16 | DType::BF16 => {
            // Upcast boundary: all arithmetic runs at f32.
            let src = input.to_f32_vec();
            let scale_v = param_to_f32(scale, input.dtype(), config);
            let bias_v = param_to_f32(bias, input.dtype(), config);

            let mut output = vec![0f32; src.len()];
            let mut mean = vec![0f32; n];
            let mut variance = vec![0f32; n];
            normalize_rows(
                OP,
                &src,
                scale_v.as_deref(),
                bias_v.as_deref(),
                config.epsilon as f32,
                n,
                d,
                &mut output,
                &mut mean,
                &mut variance,
            )?;

            // Downcast boundary: only the output returns to the storage
            // dtype; statistics stay at the compute precision.
            Ok(LayerNormOutput {
                output: Tensor::from_f32_cast(input.shape().clone(), &output, input.dtype())?,
                mean: Tensor::from_f32(Shape::vector(n), &mean)?,
                variance: Tensor::from_f32(Shape::vector(n), &variance)?,
            })
        }
    }
}

/// Normalizes each of the `n` rows of `src` over its `d`-element suffix.
///
/// Generic over the compute precision; callers pick `f64` or `f32` and
/// handle any storage-type conversion outside.
#[allow(clippy::too_many_arguments)]
fn normalize_rows<T: Float>(
    op: &'static str,
    src: &[T],
    scale: Option<&[T]>,
    bias: Option<&[T]>,
    epsilon: T,
    n: usize,
    d: usize,
    dst: &mut [T],
    mean_out: &mut [T],
    var_out: &mut [T],
) -> Result<(), TensorError> {
    let count = T::from(d).ok_or_else(|| TensorError::Numeric {
        op,
        detail: format!("row length {d} not representable in compute precision"),
    })?;

    for row in 0..n {
        let offset = row * d;
        let row_src = &src[offset..offset + d];
        let row_dst = &mut dst[offset..offset + d];

        let mut sum = T::zero();
        for &v in row_src {
            sum = sum + v;
        }
        let mean = sum / count;

        // Population variance plus epsilon; the adjusted value is what the
        // backward pass differentiates against, so it is what gets stored.
        let mut sq_sum = T::zero();
        for &v in row_src {
            let centered = v - mean;
            sq_sum = sq_sum + centered * centered;
        }
        let variance = sq_sum / count + epsilon;

        if !variance.is_finite() {
            return Err(TensorError::Numeric {
                op,
                detail: format!("row {row} produced a non-finite variance"),
            });
        }
        if variance <= T::zero() {
            return Err(TensorError::InvalidConfig {
                op,
                detail: format!(
                    "row {row} has non-positive adjusted variance; epsilon must be positive"
                ),
            });
        }

        let inv_std = variance.sqrt().recip();
        for (j, (out, &v)) in row_dst.iter_mut().zip(row_src.iter()).enumerate() {
            let mut y = (v - mean) * inv_std;
            if let Some(g) = scale {
                y = y * g[j];
            }
            if let Some(b) = bias {
                y = y + b[j];
            }
            *out = y;
        }

        mean_out[row] = mean;
        var_out[row] = variance;
    }

    Ok(())
}

/// Factors `shape` into `(N, D)` at `axis`, rejecting out-of-range axes and
/// zero-sized dimensions.
pub(crate) fn split_norm_axes(
    op: &'static str,
    shape: &Shape,
    axis: usize,
) -> Result<(usize, usize), TensorError> {
    if shape.has_zero_dim() {
        return Err(TensorError::InvalidShape {
            op,
            detail: format!("shape {shape} has a zero-sized dimension"),
        });
    }
    shape.split_at(axis).ok_or_else(|| TensorError::InvalidShape {
        op,
        detail: format!(
            "begin_norm_axis {axis} out of range for rank {}",
            shape.rank()
        ),
    })
}

/// Validates an optional scale/bias operand: rank 1, length D, and a dtype
/// that either matches the input or is `F32` next to a reduced-precision
/// input.
pub(crate) fn validate_param(
    op: &'static str,
    param: Option<&TensorView<'_>>,
    d: usize,
    input_dtype: DType,
) -> Result<(), TensorError> {
    let Some(t) = param else {
        return Ok(());
    };
    if t.shape().rank() != 1 || t.shape().num_elements() != d {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: t.shape().clone(),
            rhs: Shape::vector(d),
        });
    }
    let accepted = t.dtype() == input_dtype
        || (input_dtype.is_reduced_precision() && t.dtype() == DType::F32);
    if !accepted {
        return Err(TensorError::UnsupportedDType {
            op,
            dtype: t.dtype(),
        });
    }
    Ok(())
}

/// Materializes an optional parameter at f32 for a reduced-precision run.
///
/// `F32` parameters round through the storage dtype first when
/// `keep_scale_bias_f32` is off; narrow parameters upcast unchanged.
pub(crate) fn param_to_f32(
    param: Option<&TensorView<'_>>,
    storage: DType,
    config: &NormConfig,
) -> Option<Vec<f32>> {
    let t = param?;
    let mut values = t.to_f32_vec();
    if t.dtype() == DType::F32 && !config.keep_scale_bias_f32 {
        for v in &mut values {
            *v = storage.round_f32(*v);
        }
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_f32(rng: &mut StdRng, len: usize) -> Vec<f32> {
        (0..len).map(|_| rng.gen::<f32>()).collect()
    }

    /// Straightforward per-element recomputation in f64, kept deliberately
    /// independent of the production loop structure.
    fn naive_f64(
        x: &[f64],
        scale: Option<&[f64]>,
        bias: Option<&[f64]>,
        epsilon: f64,
        n: usize,
        d: usize,
    ) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut y = vec![0.0; x.len()];
        let mut means = vec![0.0; n];
        let mut vars = vec![0.0; n];
        for i in 0..n {
            let row = &x[i * d..(i + 1) * d];
            let mean = row.iter().sum::<f64>() / d as f64;
            let var = row.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / d as f64 + epsilon;
            for j in 0..d {
                let mut v = (row[j] - mean) / var.sqrt();
                if let Some(g) = scale {
                    v *= g[j];
                }
                if let Some(b) = bias {
                    v += b[j];
                }
                y[i * d + j] = v;
            }
            means[i] = mean;
            vars[i] = var;
        }
        (y, means, vars)
    }

    fn max_abs_diff(a: &[f32], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| (x as f64 - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_rows_are_standardized() {
        let mut rng = StdRng::seed_from_u64(123);
        let data = random_f32(&mut rng, 4 * 16);
        let x = Tensor::from_f32(Shape::matrix(4, 16), &data).unwrap();

        let result = layer_norm(&x.view(), None, None, &NormConfig::new(1, 1e-5)).unwrap();
        let y = result.output.as_f32_slice();

        for row in 0..4 {
            let r = &y[row * 16..(row + 1) * 16];
            let mean: f32 = r.iter().sum::<f32>() / 16.0;
            let var: f32 = r.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / 16.0;
            assert!(mean.abs() < 1e-5, "row {row} mean {mean}");
            assert!((var - 1.0).abs() < 1e-3, "row {row} variance {var}");
        }
    }

    #[test]
    fn test_matches_naive_4d_with_affine() {
        // [2, 3, 4, 5] normalized from axis 1: N = 2, D = 60.
        let mut rng = StdRng::seed_from_u64(123);
        let data = random_f32(&mut rng, 120);
        let scale = random_f32(&mut rng, 60);
        let bias = random_f32(&mut rng, 60);

        let x = Tensor::from_f32(Shape::new(vec![2, 3, 4, 5]), &data).unwrap();
        let g = Tensor::from_f32(Shape::vector(60), &scale).unwrap();
        let b = Tensor::from_f32(Shape::vector(60), &bias).unwrap();

        let result = layer_norm(
            &x.view(),
            Some(&g.view()),
            Some(&b.view()),
            &NormConfig::new(1, 1e-5),
        )
        .unwrap();

        let data64: Vec<f64> = data.iter().map(|&v| v as f64).collect();
        let scale64: Vec<f64> = scale.iter().map(|&v| v as f64).collect();
        let bias64: Vec<f64> = bias.iter().map(|&v| v as f64).collect();
        let (want_y, want_mean, want_var) =
            naive_f64(&data64, Some(&scale64), Some(&bias64), 1e-5, 2, 60);

        assert!(max_abs_diff(result.output.as_f32_slice(), &want_y) < 1e-4);
        assert!(max_abs_diff(result.mean.as_f32_slice(), &want_mean) < 1e-4);
        assert!(max_abs_diff(result.variance.as_f32_slice(), &want_var) < 1e-4);
        assert_eq!(result.output.shape(), x.shape());
        assert_eq!(result.mean.shape(), &Shape::vector(2));
        assert_eq!(result.variance.shape(), &Shape::vector(2));
    }

    #[test]
    fn test_f64_path_matches_naive() {
        let mut rng = StdRng::seed_from_u64(7);
        let data: Vec<f64> = (0..2 * 6 * 6 * 3).map(|_| rng.gen::<f64>()).collect();
        let x = Tensor::from_f64(Shape::new(vec![2, 6, 6, 3]), &data).unwrap();

        let result = layer_norm(&x.view(), None, None, &NormConfig::new(1, 1e-5)).unwrap();
        let (want_y, _, _) = naive_f64(&data, None, None, 1e-5, 2, 108);

        let got = result.output.as_f64_slice();
        let worst = got
            .iter()
            .zip(&want_y)
            .map(|(&a, &b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 1e-12, "worst diff {worst}");
    }

    #[test]
    fn test_shape_idempotent_over_every_axis() {
        let mut rng = StdRng::seed_from_u64(42);
        let shape = Shape::new(vec![2, 3, 4, 5]);
        let data = random_f32(&mut rng, shape.num_elements());
        let x = Tensor::from_f32(shape.clone(), &data).unwrap();

        for axis in 0..=4 {
            let result = layer_norm(&x.view(), None, None, &NormConfig::new(axis, 1e-5)).unwrap();
            assert_eq!(result.output.shape(), &shape, "axis {axis}");
            let (n, _) = shape.split_at(axis).unwrap();
            assert_eq!(result.mean.shape(), &Shape::vector(n), "axis {axis}");
            assert_eq!(result.variance.shape(), &Shape::vector(n), "axis {axis}");
        }
    }

    #[test]
    fn test_degenerate_single_element_rows() {
        // begin_norm_axis == rank: every element is its own row, variance is
        // exactly epsilon and the normalized value is zero.
        let x = Tensor::from_f32(Shape::vector(4), &[1.0, -2.0, 3.5, 0.0]).unwrap();
        let result = layer_norm(&x.view(), None, None, &NormConfig::new(1, 1e-5)).unwrap();

        assert!(result.output.as_f32_slice().iter().all(|&v| v == 0.0));
        assert!(result
            .variance
            .as_f32_slice()
            .iter()
            .all(|&v| (v - 1e-5).abs() < 1e-10));
    }

    #[test]
    fn test_degenerate_rows_with_bias_yield_bias() {
        let x = Tensor::from_f32(Shape::vector(3), &[5.0, 5.0, 5.0]).unwrap();
        let g = Tensor::from_f32(Shape::vector(1), &[2.0]).unwrap();
        let b = Tensor::from_f32(Shape::vector(1), &[7.0]).unwrap();

        let result = layer_norm(
            &x.view(),
            Some(&g.view()),
            Some(&b.view()),
            &NormConfig::new(1, 1e-5),
        )
        .unwrap();
        assert_eq!(result.output.as_f32_slice(), &[7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_axis_out_of_range() {
        let x = Tensor::from_f32(Shape::matrix(2, 3), &[0.0; 6]).unwrap();
        let err = layer_norm(&x.view(), None, None, &NormConfig::new(3, 1e-5)).unwrap_err();
        assert!(matches!(err, TensorError::InvalidShape { .. }), "{err}");
    }

    #[test]
    fn test_zero_dim_rejected() {
        let x = Tensor::from_f32(Shape::new(vec![2, 0]), &[]).unwrap();
        let err = layer_norm(&x.view(), None, None, &NormConfig::new(1, 1e-5)).unwrap_err();
        assert!(matches!(err, TensorError::InvalidShape { .. }), "{err}");
    }

    #[test]
    fn test_scale_length_mismatch() {
        let x = Tensor::from_f32(Shape::matrix(2, 3), &[0.5; 6]).unwrap();
        let g = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let err = layer_norm(&x.view(), Some(&g.view()), None, &NormConfig::new(1, 1e-5))
            .unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_param_dtype_rejected() {
        // An f64 parameter next to an f32 input is not accepted.
        let x = Tensor::from_f32(Shape::matrix(2, 3), &[0.5; 6]).unwrap();
        let g = Tensor::from_f64(Shape::vector(3), &[1.0; 3]).unwrap();
        let err = layer_norm(&x.view(), Some(&g.view()), None, &NormConfig::new(1, 1e-5))
            .unwrap_err();
        assert!(matches!(err, TensorError::UnsupportedDType { .. }), "{err}");
    }

    #[test]
    fn test_zero_epsilon_on_constant_row() {
        let x = Tensor::from_f32(Shape::matrix(1, 4), &[2.0; 4]).unwrap();
        let err = layer_norm(&x.view(), None, None, &NormConfig::new(1, 0.0)).unwrap_err();
        assert!(matches!(err, TensorError::InvalidConfig { .. }), "{err}");
    }

    #[test]
    fn test_f16_tracks_f32_path() {
        let mut rng = StdRng::seed_from_u64(123);
        let shape = Shape::new(vec![2, 6, 6, 3]);
        let data = random_f32(&mut rng, shape.num_elements());

        let x32 = Tensor::from_f32(shape.clone(), &data).unwrap();
        let x16 = Tensor::from_f32_cast(shape.clone(), &data, DType::F16).unwrap();

        let cfg = NormConfig::new(1, 1e-5);
        let r32 = layer_norm(&x32.view(), None, None, &cfg).unwrap();
        let r16 = layer_norm(&x16.view(), None, None, &cfg).unwrap();

        assert_eq!(r16.output.dtype(), DType::F16);
        assert_eq!(r16.mean.dtype(), DType::F32);

        let y32 = r32.output.to_f64_vec();
        let y16 = r16.output.to_f64_vec();
        let worst = y32
            .iter()
            .zip(&y16)
            .map(|(&a, &b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 1e-2, "worst diff {worst}");
    }

    #[test]
    fn test_bf16_tracks_f32_path() {
        let mut rng = StdRng::seed_from_u64(321);
        let shape = Shape::matrix(10, 20);
        let data = random_f32(&mut rng, shape.num_elements());

        let x32 = Tensor::from_f32(shape.clone(), &data).unwrap();
        let xb = Tensor::from_f32_cast(shape.clone(), &data, DType::BF16).unwrap();

        let cfg = NormConfig::new(1, 1e-5);
        let r32 = layer_norm(&x32.view(), None, None, &cfg).unwrap();
        let rb = layer_norm(&xb.view(), None, None, &cfg).unwrap();

        let y32 = r32.output.to_f64_vec();
        let yb = rb.output.to_f64_vec();
        let worst = y32
            .iter()
            .zip(&yb)
            .map(|(&a, &b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(worst < 5e-2, "worst diff {worst}");
    }

    #[test]
    fn test_keep_scale_bias_flag_changes_accumulation_only() {
        // Scale values that do not survive an f16 round-trip.
        let shape = Shape::matrix(4, 8);
        let data: Vec<f32> = (0..32).map(|i| (i as f32).sin()).collect();
        let scale: Vec<f32> = (0..8).map(|i| 1.0005 + i as f32 * 1e-4).collect();

        let x = Tensor::from_f32_cast(shape.clone(), &data, DType::F16).unwrap();
        let g = Tensor::from_f32(Shape::vector(8), &scale).unwrap();

        let kept = layer_norm(
            &x.view(),
            Some(&g.view()),
            None,
            &NormConfig {
                begin_norm_axis: 1,
                epsilon: 1e-5,
                keep_scale_bias_f32: true,
            },
        )
        .unwrap();
        let rounded = layer_norm(
            &x.view(),
            Some(&g.view()),
            None,
            &NormConfig {
                begin_norm_axis: 1,
                epsilon: 1e-5,
                keep_scale_bias_f32: false,
            },
        )
        .unwrap();

        // Rounding the parameters first must reproduce the run where the
        // caller pre-rounded them.
        let pre_rounded: Vec<f32> = scale.iter().map(|&v| DType::F16.round_f32(v)).collect();
        let g16 = Tensor::from_f32_cast(Shape::vector(8), &pre_rounded, DType::F16).unwrap();
        let want = layer_norm(
            &x.view(),
            Some(&g16.view()),
            None,
            &NormConfig::new(1, 1e-5),
        )
        .unwrap();

        assert_eq!(
            rounded.output.as_f16_slice(),
            want.output.as_f16_slice(),
            "rounded-parameter path must match pre-rounded parameters"
        );
        // And both paths stay within the reduced-precision band of each other.
        let a = kept.output.to_f64_vec();
        let b = rounded.output.to_f64_vec();
        let worst = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| (x - y).abs())
            .fold(0.0, f64::max);
        assert!(worst < 1e-2, "worst diff {worst}");
    }
}
