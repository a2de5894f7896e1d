// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The kernel-under-test seam.
//!
//! A production kernel (compiled CPU/GPU implementation, foreign binding,
//! whatever) implements [`NormKernel`] and the harness compares it against
//! the reference on every case. [`ReferenceKernel`] is the built-in
//! implementation backed by the `tensor-core` routines; running it through
//! the harness exercises the oracle's property checks on the reference
//! itself.

use crate::OracleError;
use tensor_core::{LayerNormGrads, LayerNormOutput, NormConfig, TensorView};

/// A layer-normalization implementation the oracle can interrogate.
pub trait NormKernel {
    /// Short kernel name for reports and logs.
    fn name(&self) -> &'static str;

    /// Runs the forward pass.
    fn forward(
        &self,
        input: &TensorView<'_>,
        scale: Option<&TensorView<'_>>,
        bias: Option<&TensorView<'_>>,
        config: &NormConfig,
    ) -> Result<LayerNormOutput, OracleError>;

    /// Runs the backward pass from the statistics saved by `forward`.
    #[allow(clippy::too_many_arguments)]
    fn backward(
        &self,
        input: &TensorView<'_>,
        grad_output: &TensorView<'_>,
        scale: Option<&TensorView<'_>>,
        bias: Option<&TensorView<'_>>,
        mean: &TensorView<'_>,
        variance: &TensorView<'_>,
        config: &NormConfig,
    ) -> Result<LayerNormGrads, OracleError>;
}

/// The reference implementation.
#[derive(Debug, Default)]
pub struct ReferenceKernel;

impl NormKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn forward(
        &self,
        input: &TensorView<'_>,
        scale: Option<&TensorView<'_>>,
        bias: Option<&TensorView<'_>>,
        config: &NormConfig,
    ) -> Result<LayerNormOutput, OracleError> {
        Ok(tensor_core::layer_norm(input, scale, bias, config)?)
    }

    fn backward(
        &self,
        input: &TensorView<'_>,
        grad_output: &TensorView<'_>,
        scale: Option<&TensorView<'_>>,
        bias: Option<&TensorView<'_>>,
        mean: &TensorView<'_>,
        variance: &TensorView<'_>,
        config: &NormConfig,
    ) -> Result<LayerNormGrads, OracleError> {
        Ok(tensor_core::layer_norm_grad(
            input,
            grad_output,
            scale,
            bias,
            mean,
            variance,
            config,
        )?)
    }
}
