// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for numeric kernels.

/// Errors reported by kernels that validate their arguments or can fail
/// numerically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    /// Buffer lengths or operand extents are inconsistent.
    #[error("shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// A dimension, stride or leading dimension is out of its valid range.
    #[error("bad dimensions in {op}: {detail}")]
    BadDimensions { op: &'static str, detail: String },

    /// The operation requires `M == N`.
    #[error("{op} requires a square matrix, got {rows}x{cols}")]
    NotSquare {
        op: &'static str,
        rows: usize,
        cols: usize,
    },

    /// A pivot fell below the singularity tolerance.
    #[error("singular matrix in {op}: pivot {index} has magnitude {magnitude:e}")]
    SingularMatrix {
        op: &'static str,
        index: usize,
        magnitude: f64,
    },

    /// An iterative solver hit its iteration limit.
    #[error("{op} did not converge after {iterations} iterations")]
    MaxIterations { op: &'static str, iterations: usize },

    /// The requested combination is not implemented.
    #[error("{op} is not supported: {detail}")]
    Unsupported { op: &'static str, detail: String },
}

impl KernelError {
    pub(crate) fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn dims(op: &'static str, detail: impl Into<String>) -> Self {
        Self::BadDimensions {
            op,
            detail: detail.into(),
        }
    }
}

/// Checks that `what` holds at least `need` elements.
pub(crate) fn ensure_len(
    op: &'static str,
    what: &str,
    len: usize,
    need: usize,
) -> Result<(), KernelError> {
    if len < need {
        return Err(KernelError::shape(
            op,
            format!("{what} has {len} elements, needs {need}"),
        ));
    }
    Ok(())
}

/// Elements spanned by a row-major `rows × cols` matrix with leading
/// dimension `ld`. Zero when either extent is zero.
pub(crate) fn matrix_footprint(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * ld + cols
    }
}

/// Checks `ld ≥ cols` and that `buf` covers a `rows × cols` matrix.
pub(crate) fn check_matrix(
    op: &'static str,
    what: &str,
    len: usize,
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<(), KernelError> {
    if ld < cols.max(1) {
        return Err(KernelError::dims(
            op,
            format!("leading dimension of {what} is {ld}, must be at least {}", cols.max(1)),
        ));
    }
    ensure_len(op, what, len, matrix_footprint(rows, cols, ld))
}
