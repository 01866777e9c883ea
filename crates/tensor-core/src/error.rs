// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use kernels::KernelError;
use memory_manager::MemoryError;
use scheduler::SchedulerError;

use crate::{DType, Shape};

/// Errors that can occur during tensor operations.
///
/// Argument problems are reported before any kernel runs; numerical
/// conditions (a singular pivot, a solver that does not converge) come
/// back from the kernel unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer does not hold exactly one element per position.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// Operand layouts or buffer lengths disagree inside a kernel.
    #[error("shape mismatch in {op}: {detail}")]
    Layout { op: &'static str, detail: String },

    /// A dimension, axis or window parameter is out of range.
    #[error("bad dimensions in {op}: {detail}")]
    BadDimensions { op: &'static str, detail: String },

    /// Operand dtypes disagree for an operation that does not convert.
    #[error("dtype mismatch in {op}: expected {expected}, got {actual}")]
    DTypeMismatch {
        op: &'static str,
        expected: DType,
        actual: DType,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A view would address elements outside its parent's buffer.
    #[error("view out of bounds: {detail}")]
    ViewOutOfBounds { detail: String },

    /// The operation requires a square matrix.
    #[error("{op} requires a square matrix, got {rows}x{cols}")]
    NotSquare {
        op: &'static str,
        rows: usize,
        cols: usize,
    },

    /// An LU pivot fell below the singularity tolerance.
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

    /// A buffer pool tier schedule was rejected.
    #[error("bad tier configuration {tiers:?}: {reason}")]
    BadTierConfig {
        tiers: Vec<usize>,
        reason: &'static str,
    },

    /// The worker pool could not be configured.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<KernelError> for TensorError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::ShapeMismatch { op, detail } => TensorError::Layout { op, detail },
            KernelError::BadDimensions { op, detail } => TensorError::BadDimensions { op, detail },
            KernelError::NotSquare { op, rows, cols } => TensorError::NotSquare { op, rows, cols },
            KernelError::SingularMatrix {
                op,
                index,
                magnitude,
            } => TensorError::SingularMatrix {
                op,
                index,
                magnitude,
            },
            KernelError::MaxIterations { op, iterations } => {
                TensorError::MaxIterations { op, iterations }
            }
            KernelError::Unsupported { op, detail } => TensorError::Unsupported { op, detail },
        }
    }
}

impl From<MemoryError> for TensorError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::BadTiers { tiers, reason } => TensorError::BadTierConfig { tiers, reason },
            MemoryError::Config(detail) => TensorError::Config(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_errors_keep_their_category() {
        let e: TensorError = KernelError::NotSquare {
            op: "getri",
            rows: 2,
            cols: 3,
        }
        .into();
        assert_eq!(
            e,
            TensorError::NotSquare {
                op: "getri",
                rows: 2,
                cols: 3
            }
        );

        let e: TensorError = KernelError::SingularMatrix {
            op: "getrf_ip",
            index: 1,
            magnitude: 0.0,
        }
        .into();
        assert!(matches!(e, TensorError::SingularMatrix { index: 1, .. }));
    }

    #[test]
    fn test_bad_tiers_maps_to_tier_config() {
        let e: TensorError = MemoryError::BadTiers {
            tiers: vec![4, 2],
            reason: "tiers must be strictly increasing",
        }
        .into();
        assert!(matches!(e, TensorError::BadTierConfig { .. }));
        assert!(e.to_string().contains("[4, 2]"));
    }

    #[test]
    fn test_shape_mismatch_display() {
        let e = TensorError::ShapeMismatch {
            op: "add",
            lhs: Shape::matrix(2, 2),
            rhs: Shape::vector(3),
        };
        assert_eq!(e.to_string(), "incompatible shapes for add: [2, 2] vs [3]");
    }
}
