// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Non-negative least squares: `min ‖A·x − b‖₂` subject to `x ≥ 0`.
//!
//! Lawson–Hanson active set. Columns move from the zero set `Z` into the
//! passive set `P` by largest dual `w = Aᵀ(b − A·x)`; each least-squares
//! subproblem on `P` is solved by Householder triangularisation
//! ([`h1`]/[`h3`]/[`h2`]) and back substitution. A candidate is only
//! accepted if its own coefficient in the subproblem comes out positive.

use super::householder::{default_range, h1, h2, h3};
use crate::element::Real;
use crate::error::{check_matrix, ensure_len, KernelError};

/// Least squares on the passive columns: packs them into `work`
/// (`m × p`), triangularises, and back-substitutes into `z[..p]`.
#[allow(clippy::too_many_arguments)]
fn solve_passive<T: Real>(
    m: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    passive: &[usize],
    work: &mut [T],
    zz: &mut [T],
    z: &mut [T],
) -> Result<(), KernelError> {
    let p = passive.len();
    if p == 0 {
        return Ok(());
    }
    for i in 0..m {
        for (c, &j) in passive.iter().enumerate() {
            work[i * p + c] = a[i * lda + j];
        }
    }
    zz[..m].copy_from_slice(&b[..m]);
    let range = default_range::<T>();
    for c in 0..p {
        let up = h1(work, p, m, c, c, c + 1, range)?;
        for t in c + 1..p {
            h3(work, p, m, c, c, c + 1, up, t, range)?;
        }
        h2(work, p, m, c, c, c + 1, up, zz, range)?;
    }
    for c in (0..p).rev() {
        let mut acc = zz[c];
        for t in c + 1..p {
            acc = acc - work[c * p + t] * z[t];
        }
        let d = work[c * p + c];
        z[c] = if d == T::zero() { T::zero() } else { acc / d };
    }
    Ok(())
}

/// `r = b − A·x`.
fn residual<T: Real>(m: usize, n: usize, a: &[T], lda: usize, b: &[T], x: &[T], r: &mut [T]) {
    for i in 0..m {
        let mut acc = b[i];
        for j in 0..n {
            acc = acc - a[i * lda + j] * x[j];
        }
        r[i] = acc;
    }
}

/// Solves `min ‖A·x − b‖₂` with `x ≥ 0` for an `m × n` matrix `a`, writing
/// `x` (length `n`) and returning the residual norm.
///
/// # Errors
/// [`KernelError::MaxIterations`] after `3·n` interpolation steps or `3·n`
/// column additions without reaching the optimum.
pub fn nnls<T: Real>(
    m: usize,
    n: usize,
    a: &[T],
    lda: usize,
    b: &[T],
    x: &mut [T],
) -> Result<T, KernelError> {
    ensure_len("nnls", "b", b.len(), m)?;
    ensure_len("nnls", "x", x.len(), n)?;
    x[..n].fill(T::zero());
    if m == 0 || n == 0 {
        let ss = b[..m].iter().fold(T::zero(), |acc, &v| acc + v * v);
        return Ok(ss.sqrt());
    }
    check_matrix("nnls", "A", a.len(), m, n, lda)?;

    let itmax = 3 * n;
    let mut work = memory_manager::acquire::<T>(m * n);
    let mut zz = memory_manager::acquire::<T>(m);
    let mut r = memory_manager::acquire::<T>(m);
    let mut w = memory_manager::acquire::<T>(n);
    let mut z = memory_manager::acquire_filled::<T>(n, T::zero());
    let mut passive: Vec<usize> = Vec::with_capacity(n);
    let mut in_passive = vec![false; n];
    let mut steps = 0;
    let mut additions = 0;

    while passive.len() < n.min(m) {
        residual(m, n, a, lda, b, x, &mut r);
        for (j, wj) in w.iter_mut().enumerate() {
            let mut acc = T::zero();
            for i in 0..m {
                acc = acc + a[i * lda + j] * r[i];
            }
            *wj = acc;
        }

        // Pick the best candidate whose subproblem coefficient is positive.
        let mut accepted = false;
        loop {
            let mut best: Option<usize> = None;
            for j in (0..n).filter(|&j| !in_passive[j]) {
                if w[j] > T::zero() && best.map_or(true, |k| w[j] > w[k]) {
                    best = Some(j);
                }
            }
            let Some(t) = best else { break };
            passive.push(t);
            solve_passive(m, a, lda, b, &passive, &mut work, &mut zz, &mut z)?;
            if z[passive.len() - 1] > T::zero() {
                in_passive[t] = true;
                accepted = true;
                break;
            }
            passive.pop();
            w[t] = T::zero();
        }
        if !accepted {
            break;
        }
        additions += 1;
        if additions > itmax {
            return Err(KernelError::MaxIterations {
                op: "nnls",
                iterations: additions,
            });
        }

        // Step back toward feasibility until the subproblem is positive.
        loop {
            if z[..passive.len()].iter().all(|&v| v > T::zero()) {
                for (c, &j) in passive.iter().enumerate() {
                    x[j] = z[c];
                }
                break;
            }
            steps += 1;
            if steps > itmax {
                return Err(KernelError::MaxIterations {
                    op: "nnls",
                    iterations: steps,
                });
            }
            let mut blocking: Option<(T, usize)> = None;
            for (c, &j) in passive.iter().enumerate() {
                if z[c] <= T::zero() {
                    let t = x[j] / (x[j] - z[c]);
                    if blocking.map_or(true, |(best, _)| t < best) {
                        blocking = Some((t, j));
                    }
                }
            }
            let Some((alpha, blocking)) = blocking else {
                break;
            };
            for (c, &j) in passive.iter().enumerate() {
                x[j] = x[j] + alpha * (z[c] - x[j]);
            }
            x[blocking] = T::zero();
            passive.retain(|&j| {
                if x[j] <= T::zero() {
                    x[j] = T::zero();
                    in_passive[j] = false;
                    false
                } else {
                    true
                }
            });
            solve_passive(m, a, lda, b, &passive, &mut work, &mut zz, &mut z)?;
        }
    }

    residual(m, n, a, lda, b, x, &mut r);
    let ss = r.iter().fold(T::zero(), |acc, &v| acc + v * v);
    Ok(ss.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nnls_identity_clips_negative() {
        let a = [1.0f64, 0.0, 0.0, 1.0];
        let mut x = [9.0f64; 2];
        let rnorm = nnls(2, 2, &a, 2, &[1.0, -1.0], &mut x).unwrap();
        assert_eq!(x, [1.0, 0.0]);
        assert!((rnorm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nnls_matches_unconstrained_when_feasible() {
        let a = [1.0f64, 0.0, 1.0, 0.0, 0.0, 1.0];
        let mut x = [0.0f64; 2];
        let rnorm = nnls(3, 2, &a, 2, &[2.0, 1.0, 1.0], &mut x).unwrap();
        assert!((x[0] - 1.5).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert!((rnorm - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_nnls_active_constraint() {
        // Unconstrained least squares gives [-1, 1].
        let a = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut x = [0.0f64; 2];
        nnls(3, 2, &a, 2, &[1.0, 1.0, 1.0], &mut x).unwrap();
        assert_eq!(x[0], 0.0);
        assert!((x[1] - 3.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_nnls_all_negative_gives_zero() {
        let a = [1.0f32, 1.0, 1.0, 1.0];
        let mut x = [5.0f32; 2];
        let rnorm = nnls(2, 2, &a, 2, &[-1.0, -2.0], &mut x).unwrap();
        assert_eq!(x, [0.0, 0.0]);
        assert!((rnorm - 5.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_nnls_short_buffers() {
        let mut x = [0.0f64; 1];
        let err = nnls(2, 2, &[1.0; 4], 2, &[1.0, 1.0], &mut x).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
    }
}
