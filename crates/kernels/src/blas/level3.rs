// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Level 3: matrix-matrix operations.
//!
//! `gemm` parallelises over bands of output rows. When `B` is used as
//! stored, each output row is built as a sequence of saxpy updates over
//! rows of `B` (ikj order), so the inner loop walks memory sequentially; a
//! transposed `B` instead turns the inner loop into a dot product over two
//! contiguous rows.

use super::{blend, row_bands, scale_row, Diag, Side, Trans, Triangular, Uplo};
use crate::element::Element;
use crate::error::{check_matrix, matrix_footprint, KernelError};

/// `C ← α·op(A)·op(B) + β·C` where `op(A)` is `m × k`, `op(B)` is `k × n`
/// and `C` is `m × n`.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Element>(
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_gemm("gemm", trans_a, trans_b, m, n, k, a.len(), lda, b.len(), ldb, c.len(), ldc)?;
    gemm_unchecked(trans_a, trans_b, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn check_gemm(
    op: &'static str,
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    a_len: usize,
    lda: usize,
    b_len: usize,
    ldb: usize,
    c_len: usize,
    ldc: usize,
) -> Result<(), KernelError> {
    let (ar, ac) = trans_a.stored(m, k);
    let (br, bc) = trans_b.stored(k, n);
    check_matrix(op, "A", a_len, ar, ac, lda)?;
    check_matrix(op, "B", b_len, br, bc, ldb)?;
    check_matrix(op, "C", c_len, m, n, ldc)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn gemm_unchecked<T: Element>(
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) {
    let a_at = |i: usize, p: usize| match trans_a {
        Trans::No => a[i * lda + p],
        Trans::Yes => a[p * lda + i],
    };
    let region = &mut c[..matrix_footprint(m, n, ldc)];
    row_bands(region, m, ldc, m * n * k.max(1), |first, rows, chunk| {
        for r in 0..rows {
            let i = first + r;
            let c_row = &mut chunk[r * ldc..r * ldc + n];
            if alpha == T::zero() || k == 0 {
                scale_row(c_row, beta);
                continue;
            }
            match trans_b {
                Trans::No => {
                    scale_row(c_row, beta);
                    for p in 0..k {
                        let a_ip = alpha.elem_mul(a_at(i, p));
                        let b_row = &b[p * ldb..p * ldb + n];
                        for (cij, &bpj) in c_row.iter_mut().zip(b_row) {
                            *cij = cij.elem_add(a_ip.elem_mul(bpj));
                        }
                    }
                }
                Trans::Yes => {
                    for (j, cij) in c_row.iter_mut().enumerate() {
                        let b_row = &b[j * ldb..j * ldb + k];
                        let mut acc = T::zero();
                        for (p, &bjp) in b_row.iter().enumerate() {
                            acc = acc.elem_add(a_at(i, p).elem_mul(bjp));
                        }
                        blend(cij, acc, alpha, beta);
                    }
                }
            }
        }
    });
}

macro_rules! gemm_variant {
    ($(#[$doc:meta])* $name:ident, $ta:expr, $tb:expr) => {
        $(#[$doc])*
        #[allow(clippy::too_many_arguments)]
        pub fn $name<T: Element>(
            m: usize,
            n: usize,
            k: usize,
            alpha: T,
            a: &[T],
            lda: usize,
            b: &[T],
            ldb: usize,
            beta: T,
            c: &mut [T],
            ldc: usize,
        ) -> Result<(), KernelError> {
            gemm($ta, $tb, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc)
        }
    };
}

gemm_variant!(
    /// `C ← α·A·B + β·C`.
    gemm_nn, Trans::No, Trans::No
);
gemm_variant!(
    /// `C ← α·A·Bᵀ + β·C`; `B` is stored `n × k`.
    gemm_nt, Trans::No, Trans::Yes
);
gemm_variant!(
    /// `C ← α·Aᵀ·B + β·C`; `A` is stored `k × m`.
    gemm_tn, Trans::Yes, Trans::No
);
gemm_variant!(
    /// `C ← α·Aᵀ·Bᵀ + β·C`.
    gemm_tt, Trans::Yes, Trans::Yes
);

/// Symmetric rank-k update of the `uplo` triangle of `C` (`n × n`):
/// `C ← α·A·Aᵀ + β·C` (`A` is `n × k`) or, transposed,
/// `C ← α·Aᵀ·A + β·C` (`A` is `k × n`). The other triangle is untouched.
#[allow(clippy::too_many_arguments)]
pub fn syrk<T: Element>(
    uplo: Uplo,
    trans: Trans,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    let (ar, ac) = trans.stored(n, k);
    check_matrix("syrk", "A", a.len(), ar, ac, lda)?;
    check_matrix("syrk", "C", c.len(), n, n, ldc)?;
    let a_at = |i: usize, p: usize| match trans {
        Trans::No => a[i * lda + p],
        Trans::Yes => a[p * lda + i],
    };
    let region = &mut c[..matrix_footprint(n, n, ldc)];
    row_bands(region, n, ldc, n * n * k.max(1), |first, rows, chunk| {
        for r in 0..rows {
            let i = first + r;
            let cols = match uplo {
                Uplo::Upper => i..n,
                Uplo::Lower => 0..i + 1,
            };
            for j in cols {
                let mut acc = T::zero();
                if alpha != T::zero() {
                    for p in 0..k {
                        acc = acc.elem_add(a_at(i, p).elem_mul(a_at(j, p)));
                    }
                }
                blend(&mut chunk[r * ldc + j], acc, alpha, beta);
            }
        }
    });
    Ok(())
}

/// Triangular matrix-matrix product in place on `B` (`m × n`):
/// `B ← α·op(A)·B` for [`Side::Left`] (`A` is `m × m`) or
/// `B ← α·B·op(A)` for [`Side::Right`] (`A` is `n × n`).
#[allow(clippy::too_many_arguments)]
pub fn trmm<T: Element>(
    side: Side,
    uplo: Uplo,
    trans: Trans,
    diag: Diag,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    b: &mut [T],
    ldb: usize,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    let order = match side {
        Side::Left => m,
        Side::Right => n,
    };
    check_matrix("trmm", "A", a.len(), order, order, lda)?;
    check_matrix("trmm", "B", b.len(), m, n, ldb)?;
    let tri = Triangular {
        a,
        lda,
        uplo,
        trans,
        diag,
    };
    let mut out = memory_manager::acquire::<T>(m * n);
    {
        let src: &[T] = b;
        row_bands(&mut out[..], m, n, m * n * order, |first, rows, chunk| {
            for r in 0..rows {
                let i = first + r;
                for j in 0..n {
                    let mut acc = T::zero();
                    if alpha != T::zero() {
                        for p in 0..order {
                            let term = match side {
                                Side::Left => tri.get(i, p).elem_mul(src[p * ldb + j]),
                                Side::Right => src[i * ldb + p].elem_mul(tri.get(p, j)),
                            };
                            acc = acc.elem_add(term);
                        }
                    }
                    chunk[r * n + j] = alpha.elem_mul(acc);
                }
            }
        });
    }
    for i in 0..m {
        b[i * ldb..i * ldb + n].copy_from_slice(&out[i * n..(i + 1) * n]);
    }
    Ok(())
}
