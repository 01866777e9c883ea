// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Householder reflector primitives in the Lawson–Hanson form.
//!
//! A reflector is built from column `col` of an `m`-row matrix: the pivot
//! row `lpivot` and the tail rows `l1..m` form the vector `u`, with the
//! pivot entry of `u` returned separately as `up`. The transformation
//! `I + u·uᵀ/b` (with `b = up·a[lpivot, col]`) is then applied to a
//! vector by [`h2`] or to another column by [`h3`].
//!
//! `range` guards near-singular columns: a column whose largest entry is
//! below `1/range` is left alone and the reflector is the identity.

use crate::element::{lit, Real};
use crate::error::{check_matrix, ensure_len, KernelError};

/// Default `range` guard.
pub const DEFAULT_RANGE: f64 = 1e30;

fn check_pivot(
    op: &'static str,
    m: usize,
    lpivot: usize,
    l1: usize,
) -> Result<(), KernelError> {
    if lpivot >= m || l1 <= lpivot || l1 > m {
        return Err(KernelError::dims(
            op,
            format!("need lpivot < l1 <= m, got lpivot={lpivot}, l1={l1}, m={m}"),
        ));
    }
    Ok(())
}

/// Builds a reflector in column `col`, overwriting `a[lpivot, col]` with
/// the transformed pivot and returning `up`. Returns zero when the column
/// is negligible, in which case `a` is unchanged.
#[allow(clippy::too_many_arguments)]
pub fn h1<T: Real>(
    a: &mut [T],
    lda: usize,
    m: usize,
    col: usize,
    lpivot: usize,
    l1: usize,
    range: T,
) -> Result<T, KernelError> {
    check_pivot("h1", m, lpivot, l1)?;
    check_matrix("h1", "A", a.len(), m, col + 1, lda)?;
    let at = |i: usize| i * lda + col;
    let rangin = T::one() / range;

    let mut cl = a[at(lpivot)].abs();
    for i in l1..m {
        let v = a[at(i)].abs();
        if v > cl {
            cl = v;
        }
    }
    if cl < rangin {
        return Ok(T::zero());
    }
    let clinv = T::one() / cl;
    let p = a[at(lpivot)] * clinv;
    let mut sm = p * p;
    for i in l1..m {
        let v = a[at(i)] * clinv;
        sm = sm + v * v;
    }
    cl = cl * sm.sqrt();
    if a[at(lpivot)] > T::zero() {
        cl = -cl;
    }
    let up = a[at(lpivot)] - cl;
    a[at(lpivot)] = cl;
    Ok(up)
}

/// `b = up·pivot` as a reciprocal, or `None` when the reflector is the
/// identity.
fn reflector_scale<T: Real>(pivot: T, up: T, range: T) -> Option<T> {
    let rangin = T::one() / range;
    if pivot.abs() <= rangin {
        return None;
    }
    let b = up * pivot;
    if b > -rangin {
        return None;
    }
    Some(T::one() / b)
}

/// Applies the reflector stored in column `col` to the vector `zz`.
#[allow(clippy::too_many_arguments)]
pub fn h2<T: Real>(
    a: &[T],
    lda: usize,
    m: usize,
    col: usize,
    lpivot: usize,
    l1: usize,
    up: T,
    zz: &mut [T],
    range: T,
) -> Result<(), KernelError> {
    check_pivot("h2", m, lpivot, l1)?;
    check_matrix("h2", "A", a.len(), m, col + 1, lda)?;
    ensure_len("h2", "zz", zz.len(), m)?;
    let Some(b) = reflector_scale(a[lpivot * lda + col], up, range) else {
        return Ok(());
    };
    let mut sm = zz[lpivot] * up;
    for i in l1..m {
        sm = sm + zz[i] * a[i * lda + col];
    }
    if sm == T::zero() {
        return Ok(());
    }
    sm = sm * b;
    zz[lpivot] = zz[lpivot] + sm * up;
    for i in l1..m {
        zz[i] = zz[i] + sm * a[i * lda + col];
    }
    Ok(())
}

/// Applies the reflector stored in column `col` to column `target` of the
/// same matrix.
#[allow(clippy::too_many_arguments)]
pub fn h3<T: Real>(
    a: &mut [T],
    lda: usize,
    m: usize,
    col: usize,
    lpivot: usize,
    l1: usize,
    up: T,
    target: usize,
    range: T,
) -> Result<(), KernelError> {
    check_pivot("h3", m, lpivot, l1)?;
    check_matrix("h3", "A", a.len(), m, col.max(target) + 1, lda)?;
    if target == col {
        return Err(KernelError::dims("h3", "target column holds the reflector"));
    }
    let Some(b) = reflector_scale(a[lpivot * lda + col], up, range) else {
        return Ok(());
    };
    let mut sm = a[lpivot * lda + target] * up;
    for i in l1..m {
        sm = sm + a[i * lda + target] * a[i * lda + col];
    }
    if sm == T::zero() {
        return Ok(());
    }
    sm = sm * b;
    let t = lpivot * lda + target;
    a[t] = a[t] + sm * up;
    for i in l1..m {
        let v = a[i * lda + col];
        let t = i * lda + target;
        a[t] = a[t] + sm * v;
    }
    Ok(())
}

/// [`DEFAULT_RANGE`] in `T`.
pub fn default_range<T: Real>() -> T {
    lit(DEFAULT_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_h1_zeroes_column_tail() {
        // Column [3, 4]: reflecting it gives [-5, 0].
        let mut a = [3.0f64, 1.0, 4.0, 2.0];
        let range = default_range::<f64>();
        let up = h1(&mut a, 2, 2, 0, 0, 1, range).unwrap();
        assert!((a[0] + 5.0).abs() < 1e-12);
        assert!((up - 8.0).abs() < 1e-12);

        // Applying the same reflector to the original column reproduces it.
        let mut zz = [3.0f64, 4.0];
        h2(&a, 2, 2, 0, 0, 1, up, &mut zz, range).unwrap();
        assert!((zz[0] + 5.0).abs() < 1e-12);
        assert!(zz[1].abs() < 1e-12);

        // Column 1 is transformed by the same orthogonal map, preserving norm.
        h3(&mut a, 2, 2, 0, 0, 1, up, 1, range).unwrap();
        let norm = (a[1] * a[1] + a[3] * a[3]).sqrt();
        assert!((norm - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_h1_negligible_column_is_identity() {
        let mut a = [0.0f32, 0.0];
        let up = h1(&mut a, 1, 2, 0, 0, 1, default_range()).unwrap();
        assert_eq!(up, 0.0);
        let mut zz = [1.0f32, 2.0];
        h2(&a, 1, 2, 0, 0, 1, up, &mut zz, default_range()).unwrap();
        assert_eq!(zz, [1.0, 2.0]);
    }

    #[test]
    fn test_bad_pivot_rows() {
        let mut a = [1.0f64; 4];
        assert!(matches!(
            h1(&mut a, 2, 2, 0, 1, 1, 1e30),
            Err(KernelError::BadDimensions { .. })
        ));
        assert!(matches!(
            h3(&mut a, 2, 2, 0, 0, 1, 1.0, 0, 1e30),
            Err(KernelError::BadDimensions { .. })
        ));
    }
}
