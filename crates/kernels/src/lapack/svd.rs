// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Thin SVD by one-sided Jacobi rotations, and the pseudo-inverse.

use super::set_identity;
use crate::element::{lit, Real};
use crate::error::{check_matrix, ensure_len, KernelError};

/// Sweeps over all column pairs before [`gesvd`] gives up.
pub const SVD_MAX_SWEEPS: usize = 60;

/// Relative cut-off below which [`pinv`] treats a singular value as zero.
pub const PINV_TOLERANCE: f64 = 1e-10;

/// Rotates columns `p` and `q` of a row-major matrix with `rows` rows.
#[inline]
fn rotate<T: Real>(x: &mut [T], ld: usize, rows: usize, p: usize, q: usize, c: T, s: T) {
    for i in 0..rows {
        let xp = x[i * ld + p];
        let xq = x[i * ld + q];
        x[i * ld + p] = c * xp - s * xq;
        x[i * ld + q] = s * xp + c * xq;
    }
}

/// Thin SVD `A = U·diag(S)·Vᵀ` of an `m × n` matrix with `m ≥ n`.
///
/// `U` is `m × n` with orthonormal columns, `S` holds `n` values in
/// descending order and `Vᵀ` is `n × n`. Columns of `U` that belong to a
/// zero singular value are left as zero.
#[allow(clippy::too_many_arguments)]
pub fn gesvd<T: Real>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    u: &mut [T],
    ldu: usize,
    s: &mut [T],
    vt: &mut [T],
    ldvt: usize,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    if m < n {
        return Err(KernelError::dims(
            "gesvd",
            format!("thin SVD needs rows >= cols, got {m}x{n}"),
        ));
    }
    check_matrix("gesvd", "A", a.len(), m, n, lda)?;
    check_matrix("gesvd", "U", u.len(), m, n, ldu)?;
    check_matrix("gesvd", "Vt", vt.len(), n, n, ldvt)?;
    ensure_len("gesvd", "S", s.len(), n)?;

    let mut w = memory_manager::acquire::<T>(m * n);
    for i in 0..m {
        w[i * n..(i + 1) * n].copy_from_slice(&a[i * lda..i * lda + n]);
    }
    let mut v = memory_manager::acquire::<T>(n * n);
    set_identity(&mut v, n, n);

    let tol = T::epsilon() * lit::<T>(4.0);
    let negligible = T::epsilon() * T::epsilon();
    let mut converged = false;
    for _ in 0..SVD_MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in p + 1..n {
                let (mut alpha, mut beta, mut gamma) = (T::zero(), T::zero(), T::zero());
                for i in 0..m {
                    let wp = w[i * n + p];
                    let wq = w[i * n + q];
                    alpha = alpha + wp * wp;
                    beta = beta + wq * wq;
                    gamma = gamma + wp * wq;
                }
                if gamma == T::zero() || gamma.abs() <= tol * (alpha * beta).sqrt() {
                    continue;
                }
                // A column negligible next to its partner stays put.
                if alpha <= negligible * beta || beta <= negligible * alpha {
                    continue;
                }
                rotated = true;
                let zeta = (beta - alpha) / (lit::<T>(2.0) * gamma);
                let sign = if zeta >= T::zero() { T::one() } else { -T::one() };
                let t = sign / (zeta.abs() + (T::one() + zeta * zeta).sqrt());
                let c = T::one() / (T::one() + t * t).sqrt();
                let sn = c * t;
                rotate(&mut w, n, m, p, q, c, sn);
                rotate(&mut v, n, n, p, q, c, sn);
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(KernelError::MaxIterations {
            op: "gesvd",
            iterations: SVD_MAX_SWEEPS,
        });
    }

    // Column norms are the singular values; order them descending.
    let mut norms = memory_manager::acquire::<T>(n);
    for (j, sj) in norms.iter_mut().enumerate() {
        let mut acc = T::zero();
        for i in 0..m {
            acc = acc + w[i * n + j] * w[i * n + j];
        }
        *sj = acc.sqrt();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| {
        norms[y]
            .partial_cmp(&norms[x])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (dst, &src) in order.iter().enumerate() {
        let sigma = norms[src];
        s[dst] = sigma;
        let inv = if sigma > T::zero() {
            T::one() / sigma
        } else {
            T::zero()
        };
        for i in 0..m {
            u[i * ldu + dst] = w[i * n + src] * inv;
        }
        for i in 0..n {
            vt[dst * ldvt + i] = v[i * n + src];
        }
    }
    Ok(())
}

/// Moore–Penrose pseudo-inverse of the `m × n` matrix `a` into the
/// `n × m` matrix `out`.
///
/// Singular values at or below `tol·max(S)` are dropped; `None` uses
/// [`PINV_TOLERANCE`]. Wide matrices are handled through their transpose.
#[allow(clippy::too_many_arguments)]
pub fn pinv<T: Real>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    out: &mut [T],
    ldout: usize,
    tol: Option<T>,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_matrix("pinv", "A", a.len(), m, n, lda)?;
    check_matrix("pinv", "output", out.len(), n, m, ldout)?;
    let tol = tol.unwrap_or_else(|| lit(PINV_TOLERANCE));

    // Factor B = A (tall) or B = Aᵀ (wide); B is r × c with r ≥ c.
    let wide = m < n;
    let (r, c) = if wide { (n, m) } else { (m, n) };
    let mut b = memory_manager::acquire::<T>(r * c);
    for i in 0..m {
        for j in 0..n {
            let v = a[i * lda + j];
            if wide {
                b[j * c + i] = v;
            } else {
                b[i * c + j] = v;
            }
        }
    }
    let mut u = memory_manager::acquire::<T>(r * c);
    let mut s = memory_manager::acquire::<T>(c);
    let mut vt = memory_manager::acquire::<T>(c * c);
    gesvd(r, c, &b, c, &mut u, c, &mut s, &mut vt, c)?;

    let cutoff = tol * s.first().copied().unwrap_or_else(T::zero);
    // B⁺ = V·S⁺·Uᵀ is c × r.
    for i in 0..c {
        for j in 0..r {
            let mut acc = T::zero();
            for k in 0..c {
                if s[k] > cutoff {
                    acc = acc + vt[k * c + i] * u[j * c + k] / s[k];
                }
            }
            // A⁺ = B⁺ when tall, (B⁺)ᵀ when wide.
            if wide {
                out[j * ldout + i] = acc;
            } else {
                out[i * ldout + j] = acc;
            }
        }
    }
    Ok(())
}
