// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Level 2: matrix-vector operations.
//!
//! Vectors are packed. `symv` and `trmv` read full row-major storage and
//! only touch the triangle named by `uplo`.

use super::{blend, row_bands, scale_row, Diag, Trans, Triangular, Uplo};
use crate::element::Element;
use crate::error::{check_matrix, ensure_len, matrix_footprint, KernelError};

/// `y ← α·op(A)·x + β·y` with `A` stored `m × n`.
#[allow(clippy::too_many_arguments)]
pub fn gemv<T: Element>(
    trans: Trans,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<(), KernelError> {
    match trans {
        Trans::No => gemv_n(m, n, alpha, a, lda, x, beta, y),
        Trans::Yes => gemv_t(m, n, alpha, a, lda, x, beta, y),
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn check_gemv<T>(
    op: &'static str,
    trans: Trans,
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    x_len: usize,
    y_len: usize,
) -> Result<(), KernelError> {
    check_matrix(op, "A", a.len(), m, n, lda)?;
    let (xn, yn) = match trans {
        Trans::No => (n, m),
        Trans::Yes => (m, n),
    };
    ensure_len(op, "x", x_len, xn)?;
    ensure_len(op, "y", y_len, yn)
}

/// `y ← α·A·x + β·y`, `A` is `m × n`, `y` has `m` entries.
#[allow(clippy::too_many_arguments)]
pub fn gemv_n<T: Element>(
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_gemv("gemv_n", Trans::No, m, n, a, lda, x.len(), y.len())?;
    gemv_n_unchecked(m, n, alpha, a, lda, x, beta, y);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn gemv_n_unchecked<T: Element>(
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    let x = &x[..n];
    row_bands(&mut y[..m], m, 1, m * n, |first, _, ys| {
        for (r, yi) in ys.iter_mut().enumerate() {
            if alpha == T::zero() {
                blend(yi, T::zero(), T::zero(), beta);
                continue;
            }
            let row = &a[(first + r) * lda..(first + r) * lda + n];
            let mut acc = T::zero();
            for (&aij, &xj) in row.iter().zip(x) {
                acc = acc.elem_add(aij.elem_mul(xj));
            }
            blend(yi, acc, alpha, beta);
        }
    });
}

/// `y ← α·Aᵀ·x + β·y`, `A` stored `m × n`, `y` has `n` entries.
#[allow(clippy::too_many_arguments)]
pub fn gemv_t<T: Element>(
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_gemv("gemv_t", Trans::Yes, m, n, a, lda, x.len(), y.len())?;
    gemv_t_unchecked(m, n, alpha, a, lda, x, beta, y);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn gemv_t_unchecked<T: Element>(
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    // Split over output columns; each column accumulates over rows in order.
    row_bands(&mut y[..n], n, 1, m * n, |first, cols, ys| {
        scale_row(ys, beta);
        if alpha == T::zero() {
            return;
        }
        for (i, &xi) in x[..m].iter().enumerate() {
            let s = alpha.elem_mul(xi);
            let row = &a[i * lda + first..i * lda + first + cols];
            for (yj, &aij) in ys.iter_mut().zip(row) {
                *yj = yj.elem_add(s.elem_mul(aij));
            }
        }
    });
}

/// Rank-1 update `A ← A + α·x·yᵀ`, `A` is `m × n`.
pub fn ger<T: Element>(
    m: usize,
    n: usize,
    alpha: T,
    x: &[T],
    y: &[T],
    a: &mut [T],
    lda: usize,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_matrix("ger", "A", a.len(), m, n, lda)?;
    ensure_len("ger", "x", x.len(), m)?;
    ensure_len("ger", "y", y.len(), n)?;
    if alpha == T::zero() {
        return Ok(());
    }
    let y = &y[..n];
    let region = &mut a[..matrix_footprint(m, n, lda)];
    row_bands(region, m, lda, m * n, |first, rows, chunk| {
        for r in 0..rows {
            let s = alpha.elem_mul(x[first + r]);
            let row = &mut chunk[r * lda..r * lda + n];
            for (aij, &yj) in row.iter_mut().zip(y) {
                *aij = aij.elem_add(s.elem_mul(yj));
            }
        }
    });
    Ok(())
}

/// Symmetric `y ← α·A·x + β·y` with `A` `n × n` in full storage; only the
/// `uplo` triangle is read.
#[allow(clippy::too_many_arguments)]
pub fn symv<T: Element>(
    uplo: Uplo,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_gemv("symv", Trans::No, n, n, a, lda, x.len(), y.len())?;
    let x = &x[..n];
    let at = |i: usize, j: usize| {
        let upper = j >= i;
        if upper == (uplo == Uplo::Upper) || i == j {
            a[i * lda + j]
        } else {
            a[j * lda + i]
        }
    };
    row_bands(&mut y[..n], n, 1, n * n, |first, _, ys| {
        for (r, yi) in ys.iter_mut().enumerate() {
            let i = first + r;
            let mut acc = T::zero();
            if alpha != T::zero() {
                for (j, &xj) in x.iter().enumerate() {
                    acc = acc.elem_add(at(i, j).elem_mul(xj));
                }
            }
            blend(yi, acc, alpha, beta);
        }
    });
    Ok(())
}

/// Triangular `x ← op(A)·x` with `A` `n × n` in full storage.
///
/// With [`Diag::Unit`] the stored diagonal is ignored and taken as 1.
pub fn trmv<T: Element>(
    uplo: Uplo,
    trans: Trans,
    diag: Diag,
    n: usize,
    a: &[T],
    lda: usize,
    x: &mut [T],
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_matrix("trmv", "A", a.len(), n, n, lda)?;
    ensure_len("trmv", "x", x.len(), n)?;
    let tri = Triangular {
        a,
        lda,
        uplo,
        trans,
        diag,
    };
    let mut out = memory_manager::acquire::<T>(n);
    {
        let src = &x[..n];
        row_bands(&mut out[..], n, 1, n * n, |first, _, ys| {
            for (r, yi) in ys.iter_mut().enumerate() {
                let i = first + r;
                let mut acc = T::zero();
                for (j, &xj) in src.iter().enumerate() {
                    acc = acc.elem_add(tri.get(i, j).elem_mul(xj));
                }
                *yi = acc;
            }
        });
    }
    x[..n].copy_from_slice(&out);
    Ok(())
}
