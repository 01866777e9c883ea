// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! LAPACK-style factorisations on row-major floating point matrices.
//!
//! - [`householder`]: the `h1`/`h2`/`h3` reflector primitives.
//! - [`lu`]: LU with partial pivoting and the inverse built from it.
//! - [`qr`]: Householder QR and explicit `Q`.
//! - [`svd`]: thin SVD by one-sided Jacobi rotations, and the
//!   pseudo-inverse.
//! - [`nnls`]: non-negative least squares (Lawson–Hanson active set).
//!
//! All kernels are generic over [`Real`](crate::Real) and work in the
//! element type itself.

pub mod householder;
pub mod lu;
pub mod nnls;
pub mod qr;
pub mod svd;

pub use householder::{h1, h2, h3, DEFAULT_RANGE};
pub use lu::{getrf, getrf_ip, getri, inverse, SINGULAR_TOLERANCE};
pub use nnls::nnls;
pub use qr::{geqrf, orgqr};
pub use svd::{gesvd, pinv, PINV_TOLERANCE, SVD_MAX_SWEEPS};

use crate::element::Real;

/// Writes the `n × n` identity into `a`.
pub(crate) fn set_identity<T: Real>(a: &mut [T], n: usize, lda: usize) {
    for i in 0..n {
        let row = &mut a[i * lda..i * lda + n];
        row.fill(T::zero());
        row[i] = T::one();
    }
}

pub(crate) fn swap_rows<T: Copy>(a: &mut [T], lda: usize, i: usize, j: usize, n: usize) {
    if i == j {
        return;
    }
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let (head, tail) = a.split_at_mut(hi * lda);
    head[lo * lda..lo * lda + n].swap_with_slice(&mut tail[..n]);
}

#[cfg(test)]
pub(crate) mod testutil {
    /// Row-major `m × n` product of `a (m × k)` and `b (k × n)`.
    pub fn matmul(m: usize, n: usize, k: usize, a: &[f64], b: &[f64]) -> Vec<f64> {
        let mut c = vec![0.0; m * n];
        for i in 0..m {
            for p in 0..k {
                for j in 0..n {
                    c[i * n + j] += a[i * k + p] * b[p * n + j];
                }
            }
        }
        c
    }

    pub fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() <= tol, "index {i}: {x} vs {y}");
        }
    }
}
