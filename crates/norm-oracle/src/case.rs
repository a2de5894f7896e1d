// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Seeded random materialization of check cases.
//!
//! Values are uniform in [0, 1), generated at f64 and cast through the
//! case's storage dtype so a reduced-precision case holds exactly what a
//! narrow buffer would hold.

use crate::{CaseSpec, OracleError};
use rand::{rngs::StdRng, Rng};
use tensor_core::{DType, Shape, Tensor};

/// A fully materialized case: concrete tensors for one run.
#[derive(Debug)]
pub struct CheckCase {
    /// The specification this case was built from.
    pub spec: CaseSpec,
    /// Input tensor in the case's dtype.
    pub input: Tensor,
    /// Scale parameter, present iff `spec.has_scale`.
    pub scale: Option<Tensor>,
    /// Bias parameter, present iff `spec.has_bias`.
    pub bias: Option<Tensor>,
    /// Upstream gradient, same shape and dtype as the input.
    pub grad_output: Tensor,
}

impl CheckCase {
    /// Builds the case's tensors from the spec using `rng`.
    pub fn materialize(spec: &CaseSpec, rng: &mut StdRng) -> Result<Self, OracleError> {
        let shape = Shape::from(spec.shape.clone());
        let (_, d) = shape.split_at(spec.begin_norm_axis).ok_or_else(|| {
            OracleError::Config(format!(
                "case '{}': begin_norm_axis {} out of range for shape {}",
                spec.name, spec.begin_norm_axis, shape
            ))
        })?;

        let param_dtype = if spec.dtype.is_reduced_precision() && spec.params_f32 {
            DType::F32
        } else {
            spec.dtype
        };

        let input = random_tensor(rng, shape.clone(), spec.dtype, 1.0)?;
        let scale = if spec.has_scale {
            Some(random_tensor(rng, Shape::vector(d), param_dtype, 1.0)?)
        } else {
            None
        };
        let bias = if spec.has_bias {
            Some(random_tensor(rng, Shape::vector(d), param_dtype, 1.0)?)
        } else {
            None
        };
        let grad_output = random_tensor(rng, shape, spec.dtype, spec.grad_damping)?;

        Ok(Self {
            spec: spec.clone(),
            input,
            scale,
            bias,
            grad_output,
        })
    }
}

fn random_tensor(
    rng: &mut StdRng,
    shape: Shape,
    dtype: DType,
    damping: f64,
) -> Result<Tensor, OracleError> {
    let len = shape.num_elements();
    let tensor = match dtype {
        DType::F64 => {
            let values: Vec<f64> = (0..len).map(|_| rng.gen::<f64>() * damping).collect();
            Tensor::from_f64(shape, &values)?
        }
        _ => {
            let values: Vec<f32> = (0..len)
                .map(|_| (rng.gen::<f64>() * damping) as f32)
                .collect();
            Tensor::from_f32_cast(shape, &values, dtype)?
        }
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_materialize_shapes_and_dtypes() {
        let spec = CaseSpec::new("t", vec![2, 3, 4], 1);
        let mut rng = StdRng::seed_from_u64(1);
        let case = CheckCase::materialize(&spec, &mut rng).unwrap();

        assert_eq!(case.input.shape().dims(), &[2, 3, 4]);
        assert_eq!(case.grad_output.shape().dims(), &[2, 3, 4]);
        assert_eq!(case.scale.as_ref().unwrap().shape().dims(), &[12]);
        assert_eq!(case.bias.as_ref().unwrap().shape().dims(), &[12]);
    }

    #[test]
    fn test_materialize_is_deterministic() {
        let spec = CaseSpec::new("t", vec![4, 4], 1);
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        let ca = CheckCase::materialize(&spec, &mut a).unwrap();
        let cb = CheckCase::materialize(&spec, &mut b).unwrap();
        assert_eq!(ca.input.as_bytes(), cb.input.as_bytes());
        assert_eq!(ca.grad_output.as_bytes(), cb.grad_output.as_bytes());
    }

    #[test]
    fn test_absent_params_are_not_generated() {
        let spec = CaseSpec::new("t", vec![4, 4], 1).with_affine(false, false);
        let mut rng = StdRng::seed_from_u64(2);
        let case = CheckCase::materialize(&spec, &mut rng).unwrap();
        assert!(case.scale.is_none());
        assert!(case.bias.is_none());
    }

    #[test]
    fn test_params_f32_for_narrow_case() {
        let spec = CaseSpec::new("t", vec![4, 4], 1)
            .with_dtype(DType::F16)
            .with_f32_params();
        let mut rng = StdRng::seed_from_u64(3);
        let case = CheckCase::materialize(&spec, &mut rng).unwrap();
        assert_eq!(case.input.dtype(), DType::F16);
        assert_eq!(case.scale.as_ref().unwrap().dtype(), DType::F32);
        assert_eq!(case.bias.as_ref().unwrap().dtype(), DType::F32);
    }

    #[test]
    fn test_damping_bounds_gradient() {
        let spec = CaseSpec::new("t", vec![8, 8], 1).damped(0.1);
        let mut rng = StdRng::seed_from_u64(4);
        let case = CheckCase::materialize(&spec, &mut rng).unwrap();
        assert!(case
            .grad_output
            .as_f32_slice()
            .iter()
            .all(|&v| (0.0..=0.1).contains(&v)));
    }

    #[test]
    fn test_bad_axis_is_config_error() {
        let spec = CaseSpec::new("t", vec![2, 2], 5);
        let mut rng = StdRng::seed_from_u64(5);
        let err = CheckCase::materialize(&spec, &mut rng).unwrap_err();
        assert!(matches!(err, OracleError::Config(_)), "{err}");
    }
}
