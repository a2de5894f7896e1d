// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.
//!
//! All failures are synchronous and final: malformed shapes and bad
//! configurations are programming errors on the caller's side, never
//! transient conditions to retry.

use crate::Shape;

/// Errors that can occur during tensor construction and the normalization
/// reference operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the given shape and dtype.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A shape violates the operation's structural requirements
    /// (normalization axis out of range, zero-sized dimension).
    #[error("invalid shape for {op}: {detail}")]
    InvalidShape { op: &'static str, detail: String },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The tensor's data type is not accepted for this operand.
    #[error("unsupported dtype {dtype:?} for operation {op}")]
    UnsupportedDType {
        op: &'static str,
        dtype: crate::DType,
    },

    /// The caller's configuration makes the computation ill-defined
    /// (a non-positive epsilon meeting a zero-variance row).
    #[error("invalid configuration for {op}: {detail}")]
    InvalidConfig { op: &'static str, detail: String },

    /// A numeric computation produced a non-finite intermediate.
    #[error("numeric error in {op}: {detail}")]
    Numeric { op: &'static str, detail: String },
}
