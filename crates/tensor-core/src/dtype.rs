// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

use half::{bf16, f16};
use std::fmt;

/// Enumerates the floating-point types a [`crate::Tensor`] can hold.
///
/// The reference kernels use `DType` to decide memory layout and which
/// compute precision to run at: `F64` and `F32` compute natively, while the
/// reduced-precision types (`F16`, `BF16`) are upcast to `F32` for all
/// arithmetic and downcast only at the output boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 64-bit IEEE 754 floating point.
    F64,
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F64 => 8,
            DType::F32 => 4,
            DType::F16 => 2,
            DType::BF16 => 2,
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F64 => "f64",
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
        }
    }

    /// Returns `true` for the 16-bit types that compute through an f32 upcast.
    pub fn is_reduced_precision(self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }

    /// Rounds an `f32` value through this type's storage representation.
    ///
    /// For `F16`/`BF16` the value loses precision exactly as it would when
    /// stored in a tensor of this dtype; `F64` and `F32` pass through
    /// unchanged.
    pub fn round_f32(self, value: f32) -> f32 {
        match self {
            DType::F64 | DType::F32 => value,
            DType::F16 => f16::from_f32(value).to_f32(),
            DType::BF16 => bf16::from_f32(value).to_f32(),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "f64" | "float64" => Ok(DType::F64),
            "f32" | "float32" => Ok(DType::F32),
            "f16" | "float16" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            other => Err(format!(
                "unknown dtype '{other}'; expected one of f64, f32, f16, bf16"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bytes() {
        assert_eq!(DType::F64.size_bytes(), 8);
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::F16.size_bytes(), 2);
        assert_eq!(DType::BF16.size_bytes(), 2);
    }

    #[test]
    fn test_reduced_precision() {
        assert!(!DType::F64.is_reduced_precision());
        assert!(!DType::F32.is_reduced_precision());
        assert!(DType::F16.is_reduced_precision());
        assert!(DType::BF16.is_reduced_precision());
    }

    #[test]
    fn test_round_f32_is_lossy_for_narrow_types() {
        // 1.0005 is not representable in f16 (10 mantissa bits).
        let v = 1.0005f32;
        assert_eq!(DType::F32.round_f32(v), v);
        assert_ne!(DType::F16.round_f32(v), v);
        assert_ne!(DType::BF16.round_f32(v), v);
        // The rounded value is still close.
        assert!((DType::F16.round_f32(v) - v).abs() < 1e-3);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("f32".parse::<DType>().unwrap(), DType::F32);
        assert_eq!("bfloat16".parse::<DType>().unwrap(), DType::BF16);
        assert_eq!(" F64 ".parse::<DType>().unwrap(), DType::F64);
        assert!("i8".parse::<DType>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DType::BF16), "bf16");
        assert_eq!(format!("{}", DType::F64), "f64");
    }
}
