// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-precision tolerance bands and elementwise comparison.
//!
//! A pair `(actual, expected)` matches when
//! `|actual - expected| <= atol + rtol * |expected|`, the same acceptance
//! rule production kernel checks use. Bands default per element type and can
//! be overridden from the scenario file.

use tensor_core::DType;

/// Absolute/relative tolerance band for one comparison.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tolerance {
    /// Absolute tolerance.
    pub atol: f64,
    /// Relative tolerance, scaled by the expected value's magnitude.
    pub rtol: f64,
}

impl Tolerance {
    /// Creates a tolerance band.
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// Returns the default band for an element type: 1e-4 for the full
    /// precisions, 1e-2 for the 16-bit types (expected precision loss, not
    /// a defect).
    pub fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F64 | DType::F32 => Self::new(1e-4, 1e-4),
            DType::F16 | DType::BF16 => Self::new(1e-2, 1e-2),
        }
    }

    /// Returns `true` when `actual` is within this band of `expected`.
    pub fn allclose(&self, actual: f64, expected: f64) -> bool {
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// Outcome of comparing two equally-shaped value buffers.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Comparison {
    /// Number of elements compared.
    pub compared: usize,
    /// Number of elements outside the tolerance band.
    pub mismatches: usize,
    /// Largest absolute difference seen.
    pub max_abs_error: f64,
    /// Largest relative difference seen (guarded against zero expectations).
    pub max_rel_error: f64,
    /// Index of the largest absolute difference.
    pub worst_index: usize,
}

impl Comparison {
    /// Returns `true` when every element was inside the band.
    pub fn ok(&self) -> bool {
        self.mismatches == 0
    }
}

/// Compares `actual` against `expected` elementwise.
///
/// # Panics
/// Panics if the slices differ in length; the harness always compares
/// equally-shaped outputs.
pub fn compare(actual: &[f64], expected: &[f64], tolerance: Tolerance) -> Comparison {
    assert_eq!(
        actual.len(),
        expected.len(),
        "comparison requires equal lengths"
    );

    let mut result = Comparison {
        compared: actual.len(),
        mismatches: 0,
        max_abs_error: 0.0,
        max_rel_error: 0.0,
        worst_index: 0,
    };

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        let abs = (a - e).abs();
        let rel = abs / e.abs().max(1e-12);
        if abs > result.max_abs_error {
            result.max_abs_error = abs;
            result.worst_index = i;
        }
        if rel > result.max_rel_error {
            result.max_rel_error = rel;
        }
        if !tolerance.allclose(a, e) {
            result.mismatches += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        assert_eq!(Tolerance::for_dtype(DType::F64), Tolerance::new(1e-4, 1e-4));
        assert_eq!(Tolerance::for_dtype(DType::F32), Tolerance::new(1e-4, 1e-4));
        assert_eq!(Tolerance::for_dtype(DType::F16), Tolerance::new(1e-2, 1e-2));
        assert_eq!(Tolerance::for_dtype(DType::BF16), Tolerance::new(1e-2, 1e-2));
    }

    #[test]
    fn test_allclose_combines_atol_and_rtol() {
        let tol = Tolerance::new(1e-3, 1e-2);
        // Absolute slack near zero.
        assert!(tol.allclose(0.0005, 0.0));
        assert!(!tol.allclose(0.01, 0.0));
        // Relative slack for large magnitudes.
        assert!(tol.allclose(101.0, 100.0));
        assert!(!tol.allclose(103.0, 100.0));
    }

    #[test]
    fn test_compare_tracks_worst_element() {
        let tol = Tolerance::new(1e-6, 0.0);
        let expected = [1.0, 2.0, 3.0];
        let actual = [1.0, 2.5, 3.0000001];
        let cmp = compare(&actual, &expected, tol);

        assert_eq!(cmp.compared, 3);
        assert_eq!(cmp.mismatches, 1);
        assert_eq!(cmp.worst_index, 1);
        assert!((cmp.max_abs_error - 0.5).abs() < 1e-12);
        assert!(!cmp.ok());
    }

    #[test]
    fn test_compare_identical_is_clean() {
        let tol = Tolerance::for_dtype(DType::F32);
        let values = [0.1, -0.2, 0.3];
        let cmp = compare(&values, &values, tol);
        assert!(cmp.ok());
        assert_eq!(cmp.max_abs_error, 0.0);
    }
}
