// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! LU factorisation with partial pivoting, and inversion from it.
//!
//! `ipiv[k]` is the row swapped with row `k` at step `k`, so
//! `P·A = L·U` where `P` applies the swaps in order `k = 0, 1, …`.

use super::{set_identity, swap_rows};
use crate::blas::row_bands;
use crate::element::{lit, Real};
use crate::error::{check_matrix, ensure_len, matrix_footprint, KernelError};

/// Pivots with a magnitude below this are treated as singular.
pub const SINGULAR_TOLERANCE: f64 = 1e-6;

fn singular(op: &'static str, index: usize, pivot: f64) -> KernelError {
    KernelError::SingularMatrix {
        op,
        index,
        magnitude: pivot.abs(),
    }
}

/// In-place LU of the `m × n` matrix `a`: `L` (unit diagonal, implicit)
/// below the diagonal and `U` on and above it. `ipiv` receives
/// `min(m, n)` pivot rows.
pub fn getrf_ip<T: Real>(
    m: usize,
    n: usize,
    a: &mut [T],
    lda: usize,
    ipiv: &mut [usize],
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_matrix("getrf_ip", "A", a.len(), m, n, lda)?;
    let steps = m.min(n);
    ensure_len("getrf_ip", "ipiv", ipiv.len(), steps)?;
    let tol = lit::<T>(SINGULAR_TOLERANCE);
    let a = &mut a[..matrix_footprint(m, n, lda)];

    for k in 0..steps {
        let mut p = k;
        let mut best = a[k * lda + k].abs();
        for i in k + 1..m {
            let v = a[i * lda + k].abs();
            if v > best {
                best = v;
                p = i;
            }
        }
        ipiv[k] = p;
        swap_rows(a, lda, k, p, n);

        let akk = a[k * lda + k];
        if akk.abs() < tol {
            return Err(singular("getrf_ip", k, akk.as_f64()));
        }
        if k + 1 == m {
            continue;
        }

        let (top, rest) = a.split_at_mut((k + 1) * lda);
        let pivot_row = &top[k * lda..k * lda + n];
        let rows = m - k - 1;
        row_bands(rest, rows, lda, rows * (n - k), |_, band_rows, chunk| {
            for r in 0..band_rows {
                let row = &mut chunk[r * lda..r * lda + n];
                let l = row[k] / akk;
                row[k] = l;
                for (x, &u) in row[k + 1..].iter_mut().zip(&pivot_row[k + 1..]) {
                    *x = *x - l * u;
                }
            }
        });
    }
    Ok(())
}

/// LU of `a` into separate factors: `L` is `m × min(m, n)` with a unit
/// diagonal, `U` is `min(m, n) × n`. Entries outside each triangle are
/// written as zero; `a` is not modified.
#[allow(clippy::too_many_arguments)]
pub fn getrf<T: Real>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    l: &mut [T],
    ldl: usize,
    u: &mut [T],
    ldu: usize,
    ipiv: &mut [usize],
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    let steps = m.min(n);
    check_matrix("getrf", "A", a.len(), m, n, lda)?;
    check_matrix("getrf", "L", l.len(), m, steps, ldl)?;
    check_matrix("getrf", "U", u.len(), steps, n, ldu)?;

    let mut work = memory_manager::acquire::<T>(m * n);
    for i in 0..m {
        work[i * n..(i + 1) * n].copy_from_slice(&a[i * lda..i * lda + n]);
    }
    getrf_ip(m, n, &mut work, n, ipiv)?;

    for i in 0..m {
        for j in 0..steps {
            l[i * ldl + j] = if i > j {
                work[i * n + j]
            } else if i == j {
                T::one()
            } else {
                T::zero()
            };
        }
    }
    for i in 0..steps {
        for j in 0..n {
            u[i * ldu + j] = if j >= i { work[i * n + j] } else { T::zero() };
        }
    }
    Ok(())
}

/// Inverse of an `n × n` matrix from its in-place LU factors and pivots.
pub fn getri<T: Real>(
    n: usize,
    lu: &[T],
    lda: usize,
    ipiv: &[usize],
    inv: &mut [T],
    ldinv: usize,
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_matrix("getri", "LU", lu.len(), n, n, lda)?;
    check_matrix("getri", "inverse", inv.len(), n, n, ldinv)?;
    ensure_len("getri", "ipiv", ipiv.len(), n)?;
    if let Some(&bad) = ipiv[..n].iter().find(|&&p| p >= n) {
        return Err(KernelError::dims("getri", format!("pivot row {bad} out of range")));
    }
    let tol = lit::<T>(SINGULAR_TOLERANCE);
    for i in 0..n {
        let uii = lu[i * lda + i];
        if uii.abs() < tol {
            return Err(singular("getri", i, uii.as_f64()));
        }
    }

    // Start from P, replaying the swaps in factorisation order.
    set_identity(inv, n, ldinv);
    for (k, &p) in ipiv[..n].iter().enumerate() {
        swap_rows(inv, ldinv, k, p, n);
    }

    // Forward solve with unit-lower L, then back solve with U. Rows of the
    // result are updated as whole rows so inner loops stay contiguous.
    for i in 0..n {
        for k in 0..i {
            let lik = lu[i * lda + k];
            if lik == T::zero() {
                continue;
            }
            let (head, tail) = inv.split_at_mut(i * ldinv);
            let src = &head[k * ldinv..k * ldinv + n];
            for (x, &y) in tail[..n].iter_mut().zip(src) {
                *x = *x - lik * y;
            }
        }
    }
    for i in (0..n).rev() {
        for k in i + 1..n {
            let uik = lu[i * lda + k];
            if uik == T::zero() {
                continue;
            }
            let (head, tail) = inv.split_at_mut(k * ldinv);
            let src = &tail[..n];
            for (x, &y) in head[i * ldinv..i * ldinv + n].iter_mut().zip(src) {
                *x = *x - uik * y;
            }
        }
        let r = T::one() / lu[i * lda + i];
        for x in &mut inv[i * ldinv..i * ldinv + n] {
            *x = *x * r;
        }
    }
    Ok(())
}

/// `A⁻¹` for a square `a`, factorising a pooled copy.
pub fn inverse<T: Real>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    inv: &mut [T],
    ldinv: usize,
) -> Result<(), KernelError> {
    if m != n {
        return Err(KernelError::NotSquare {
            op: "inverse",
            rows: m,
            cols: n,
        });
    }
    if n == 0 {
        return Ok(());
    }
    check_matrix("inverse", "A", a.len(), n, n, lda)?;
    let mut work = memory_manager::acquire::<T>(n * n);
    for i in 0..n {
        work[i * n..(i + 1) * n].copy_from_slice(&a[i * lda..i * lda + n]);
    }
    let mut ipiv = memory_manager::acquire::<usize>(n);
    getrf_ip(n, n, &mut work, n, &mut ipiv)?;
    getri(n, &work, n, &ipiv, inv, ldinv)
}
