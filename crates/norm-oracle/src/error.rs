// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the oracle harness.

/// Errors that can occur while materializing and running check cases.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// A scenario file or case specification is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A tensor operation failed while building or checking a case.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// The kernel under test violated the oracle contract (wrong output
    /// structure rather than wrong values).
    #[error("kernel '{kernel}' failed on case '{case}': {detail}")]
    Kernel {
        kernel: String,
        case: String,
        detail: String,
    },
}
