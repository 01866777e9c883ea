// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Householder QR.
//!
//! [`geqrf`] leaves `R` on and above the diagonal and the reflector
//! vectors below it. Reflector `k` is `H_k = I − τ_k·v·vᵀ` with `v[k] = 1`
//! implicit and `v[i] = a[i, k]` for `i > k`. [`orgqr`] multiplies the
//! reflectors out into an explicit orthogonal `Q`.

use super::set_identity;
use crate::element::Real;
use crate::error::{check_matrix, ensure_len, KernelError};

/// Applies `H = I − τ·v·vᵀ` (reflector `k` of `qr`) to column `j` of `x`,
/// rows `k..m`.
#[inline]
#[allow(clippy::too_many_arguments)]
fn reflect_column<T: Real>(
    qr: &[T],
    ldqr: usize,
    k: usize,
    tau: T,
    x: &mut [T],
    ldx: usize,
    j: usize,
    m: usize,
) {
    let mut w = x[k * ldx + j];
    for i in k + 1..m {
        w = w + qr[i * ldqr + k] * x[i * ldx + j];
    }
    let s = tau * w;
    x[k * ldx + j] = x[k * ldx + j] - s;
    for i in k + 1..m {
        x[i * ldx + j] = x[i * ldx + j] - s * qr[i * ldqr + k];
    }
}

/// QR factorisation of the `m × n` matrix `a` in place. `tau` receives
/// `min(m, n)` reflector scales.
pub fn geqrf<T: Real>(
    m: usize,
    n: usize,
    a: &mut [T],
    lda: usize,
    tau: &mut [T],
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_matrix("geqrf", "A", a.len(), m, n, lda)?;
    let steps = m.min(n);
    ensure_len("geqrf", "tau", tau.len(), steps)?;

    for k in 0..steps {
        // Scaled norm of the column tail below the diagonal.
        let mut scale = T::zero();
        for i in k + 1..m {
            let v = a[i * lda + k].abs();
            if v > scale {
                scale = v;
            }
        }
        if scale == T::zero() {
            tau[k] = T::zero();
            continue;
        }
        let mut ssq = T::zero();
        for i in k + 1..m {
            let v = a[i * lda + k] / scale;
            ssq = ssq + v * v;
        }
        let alpha = a[k * lda + k];
        let xnorm = scale * ssq.sqrt();
        let mut beta = alpha.hypot(xnorm);
        if alpha >= T::zero() {
            beta = -beta;
        }
        tau[k] = (beta - alpha) / beta;
        let inv = T::one() / (alpha - beta);
        for i in k + 1..m {
            a[i * lda + k] = a[i * lda + k] * inv;
        }
        a[k * lda + k] = beta;

        // Apply H_k to the trailing columns.
        for j in k + 1..n {
            let mut w = a[k * lda + j];
            for i in k + 1..m {
                w = w + a[i * lda + k] * a[i * lda + j];
            }
            let s = tau[k] * w;
            a[k * lda + j] = a[k * lda + j] - s;
            for i in k + 1..m {
                let v = a[i * lda + k];
                a[i * lda + j] = a[i * lda + j] - s * v;
            }
        }
    }
    Ok(())
}

/// Forms the full `m × m` orthogonal `Q = H_0·H_1·…·H_{k−1}` from the first
/// `k` reflectors of a [`geqrf`] result.
#[allow(clippy::too_many_arguments)]
pub fn orgqr<T: Real>(
    m: usize,
    n: usize,
    k: usize,
    a: &[T],
    lda: usize,
    tau: &[T],
    q: &mut [T],
    ldq: usize,
) -> Result<(), KernelError> {
    if m == 0 {
        return Ok(());
    }
    check_matrix("orgqr", "Q", q.len(), m, m, ldq)?;
    set_identity(q, m, ldq);
    let k = k.min(m.min(n));
    if k == 0 {
        return Ok(());
    }
    check_matrix("orgqr", "A", a.len(), m, n, lda)?;
    ensure_len("orgqr", "tau", tau.len(), k)?;

    for r in (0..k).rev() {
        if tau[r] == T::zero() {
            continue;
        }
        for j in r..m {
            reflect_column(a, lda, r, tau[r], q, ldq, j, m);
        }
    }
    Ok(())
}
