// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scenario configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! seed = 123
//! keep_scale_bias_f32 = true
//!
//! [[tolerance]]
//! dtype = "f16"
//! atol = 2e-2
//! rtol = 2e-2
//!
//! [[cases]]
//! name = "small-4d-axis1"
//! shape = [2, 3, 4, 5]
//! begin_norm_axis = 1
//! dtype = "f32"
//! epsilon = 1e-5
//! ```

use crate::tolerance::Tolerance;
use std::path::Path;
use tensor_core::DType;

/// One check case: a shape, a normalization axis, an element type, and which
/// affine parameters participate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CaseSpec {
    /// Case name used in reports and logs.
    pub name: String,
    /// Input tensor shape.
    pub shape: Vec<usize>,
    /// First normalized axis.
    pub begin_norm_axis: usize,
    /// Element type (default `f32`).
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    /// Variance stabilizer (default `1e-5`).
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Whether a scale parameter participates (default `true`).
    #[serde(default = "default_true")]
    pub has_scale: bool,
    /// Whether a bias parameter participates (default `true`).
    #[serde(default = "default_true")]
    pub has_bias: bool,
    /// Multiplier applied to the generated upstream gradient; large shapes
    /// use 0.1 to keep column sums in a comparable range (default `1.0`).
    #[serde(default = "default_one")]
    pub grad_damping: f64,
    /// For reduced-precision cases, supply scale/bias at f32 instead of the
    /// storage dtype, exercising the `keep_scale_bias_f32` toggle.
    #[serde(default)]
    pub params_f32: bool,
}

fn default_dtype() -> DType {
    DType::F32
}

fn default_epsilon() -> f64 {
    1e-5
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    123
}

impl CaseSpec {
    /// Creates an f32 case with both affine parameters and default epsilon.
    pub fn new(name: &str, shape: Vec<usize>, begin_norm_axis: usize) -> Self {
        Self {
            name: name.to_string(),
            shape,
            begin_norm_axis,
            dtype: default_dtype(),
            epsilon: default_epsilon(),
            has_scale: true,
            has_bias: true,
            grad_damping: 1.0,
            params_f32: false,
        }
    }

    /// Replaces the element type.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Sets which affine parameters participate.
    pub fn with_affine(mut self, has_scale: bool, has_bias: bool) -> Self {
        self.has_scale = has_scale;
        self.has_bias = has_bias;
        self
    }

    /// Damps the generated upstream gradient by `factor`.
    pub fn damped(mut self, factor: f64) -> Self {
        self.grad_damping = factor;
        self
    }

    /// Supplies the affine parameters at f32 (reduced-precision cases only).
    pub fn with_f32_params(mut self) -> Self {
        self.params_f32 = true;
        self
    }
}

/// A per-dtype tolerance override.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ToleranceSpec {
    /// Element type the override applies to.
    pub dtype: DType,
    /// Absolute tolerance.
    pub atol: f64,
    /// Relative tolerance.
    pub rtol: f64,
}

/// Configuration for an oracle run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CheckConfig {
    /// RNG seed for case materialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Keep f32 scale/bias at f32 during reduced-precision runs; `false`
    /// rounds them through the storage dtype first.
    #[serde(default = "default_true")]
    pub keep_scale_bias_f32: bool,
    /// Per-dtype tolerance overrides; unlisted dtypes use the defaults.
    #[serde(default)]
    pub tolerance: Vec<ToleranceSpec>,
    /// The check cases to run.
    pub cases: Vec<CaseSpec>,
}

impl CheckConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::OracleError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::OracleError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::OracleError> {
        toml::from_str(toml_str)
            .map_err(|e| super::OracleError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::OracleError> {
        toml::to_string_pretty(self)
            .map_err(|e| super::OracleError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves the tolerance band for a dtype, applying any override.
    pub fn tolerance_for(&self, dtype: DType) -> Tolerance {
        self.tolerance
            .iter()
            .find(|t| t.dtype == dtype)
            .map(|t| Tolerance::new(t.atol, t.rtol))
            .unwrap_or_else(|| Tolerance::for_dtype(dtype))
    }

    /// The shape battery at a single element type, used by dtype sweeps.
    pub fn battery_for(dtype: DType) -> Vec<CaseSpec> {
        base_battery()
            .into_iter()
            .map(|c| c.with_dtype(dtype))
            .collect()
    }
}

/// The f32 shape battery: the affine-presence matrix on a small 4-D tensor,
/// the degenerate single-element-suffix case, and the larger production
/// shapes with damped gradients.
fn base_battery() -> Vec<CaseSpec> {
    vec![
        CaseSpec::new("small-4d-axis1", vec![2, 3, 4, 5], 1),
        CaseSpec::new("small-4d-axis3", vec![2, 3, 4, 5], 3),
        CaseSpec::new("small-4d-scale-only", vec![2, 3, 4, 5], 1).with_affine(true, false),
        CaseSpec::new("small-4d-bias-only", vec![2, 3, 4, 5], 1).with_affine(false, true),
        CaseSpec::new("small-4d-no-affine", vec![2, 3, 4, 5], 1).with_affine(false, false),
        CaseSpec::new("degenerate-d1", vec![2, 3, 4, 5], 4),
        CaseSpec::new("tall-matrix", vec![512, 1024], 1),
        CaseSpec::new("wide-rows-damped", vec![92, 513, 129], 2).damped(0.1),
        CaseSpec::new("long-suffix", vec![3, 34, 1134], 2),
        CaseSpec::new("no-scale-17x129", vec![17, 129], 1).with_affine(false, true),
    ]
}

impl Default for CheckConfig {
    fn default() -> Self {
        let mut cases = base_battery();
        cases.push(CaseSpec::new("f64-small", vec![2, 6, 6, 3], 1).with_dtype(DType::F64));
        cases.push(CaseSpec::new("f16-small", vec![2, 6, 6, 3], 1).with_dtype(DType::F16));
        cases.push(CaseSpec::new("bf16-small", vec![2, 6, 6, 3], 1).with_dtype(DType::BF16));
        cases.push(
            CaseSpec::new("f16-params-f32", vec![10, 20], 1)
                .with_dtype(DType::F16)
                .with_f32_params(),
        );

        Self {
            seed: default_seed(),
            keep_scale_bias_f32: true,
            tolerance: Vec::new(),
            cases,
        }
    }
}
