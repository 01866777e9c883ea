// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Dense BLAS-style kernels over row-major storage.
//!
//! Matrices are `(buffer, rows, cols, ld)` with element `(i, j)` at
//! `i * ld + j`; vectors in level 1 carry a positive increment. Every public
//! entry point validates its operands and returns
//! [`KernelError`](crate::KernelError) before touching data. A zero `M` or
//! `N` is always a successful no-op.
//!
//! Two scalar rules hold throughout: with `β = 0` the destination is
//! written without being read (a NaN there does not leak into the result),
//! and with `α = 0` the product term is skipped entirely.

pub mod batched;
pub mod level1;
pub mod level2;
pub mod level3;

pub use batched::{gemm_batched, gemm_strided_batched, gemv_batched, gemv_strided_batched};
pub use level1::{asum, axpy, copy, dot, iamax, nrm2, scal, swap};
pub use level2::{gemv, gemv_n, gemv_t, ger, symv, trmv};
pub use level3::{gemm, gemm_nn, gemm_nt, gemm_tn, gemm_tt, syrk, trmm};

use crate::element::Element;
use crate::error::{ensure_len, KernelError};

/// Which triangle of a matrix is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

/// Whether an operand is used as stored or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    No,
    Yes,
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    NonUnit,
    Unit,
}

/// Which side a triangular operand multiplies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Trans {
    /// Stored `(rows, cols)` of an operand whose `op()` is `rows × cols`.
    #[inline]
    pub fn stored(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            Trans::No => (rows, cols),
            Trans::Yes => (cols, rows),
        }
    }
}

/// Elements spanned by `n` entries at increment `inc`.
pub(crate) fn vector_footprint(n: usize, inc: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n - 1) * inc + 1
    }
}

pub(crate) fn check_vector(
    op: &'static str,
    what: &str,
    len: usize,
    n: usize,
    inc: usize,
) -> Result<(), KernelError> {
    if inc == 0 {
        return Err(KernelError::dims(op, format!("increment of {what} must be positive")));
    }
    ensure_len(op, what, len, vector_footprint(n, inc))
}

/// `y ← α·acc + β·y`, never reading `y` when `β = 0`.
#[inline(always)]
pub(crate) fn blend<T: Element>(y: &mut T, acc: T, alpha: T, beta: T) {
    let scaled = alpha.elem_mul(acc);
    *y = if beta == T::zero() {
        scaled
    } else {
        scaled.elem_add(beta.elem_mul(*y))
    };
}

/// Applies the `β` rule to a destination row.
#[inline]
pub(crate) fn scale_row<T: Element>(row: &mut [T], beta: T) {
    if beta == T::zero() {
        row.fill(T::zero());
    } else if beta != T::one() {
        for v in row.iter_mut() {
            *v = beta.elem_mul(*v);
        }
    }
}

/// Runs `f(first_row, rows, chunk)` over bands of a row-major matrix.
///
/// `region` must be exactly the matrix footprint. With enough `work` the
/// bands go to the worker pool; each band's chunk starts at its first row.
pub(crate) fn row_bands<T, F>(region: &mut [T], rows: usize, ld: usize, work: usize, f: F)
where
    T: Send,
    F: Fn(usize, usize, &mut [T]) + Sync,
{
    if rows == 0 || region.is_empty() {
        return;
    }
    if rows > 1 && scheduler::should_parallelize(work) {
        scheduler::for_each_chunk_mut(region, ld, |first, chunk| {
            f(first, chunk.len().div_ceil(ld), chunk)
        });
    } else {
        f(0, rows, region);
    }
}

/// Read access to a triangular `op(A)`: zero outside the referenced
/// triangle, one on a unit diagonal.
#[derive(Clone, Copy)]
pub(crate) struct Triangular<'a, T> {
    pub a: &'a [T],
    pub lda: usize,
    pub uplo: Uplo,
    pub trans: Trans,
    pub diag: Diag,
}

impl<T: Element> Triangular<'_, T> {
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        let (r, c) = match self.trans {
            Trans::No => (i, j),
            Trans::Yes => (j, i),
        };
        let inside = match self.uplo {
            Uplo::Upper => c >= r,
            Uplo::Lower => c <= r,
        };
        if !inside {
            T::zero()
        } else if r == c && self.diag == Diag::Unit {
            T::one()
        } else {
            self.a[r * self.lda + c]
        }
    }
}
