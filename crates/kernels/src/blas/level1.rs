// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Level 1: vector-vector operations with per-operand increments.

use super::check_vector;
use crate::element::{Element, Real};
use crate::elementwise::parallel;
use crate::error::KernelError;

/// `y ← α·x + y`.
pub fn axpy<T: Element>(
    n: usize,
    alpha: T,
    x: &[T],
    incx: usize,
    y: &mut [T],
    incy: usize,
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_vector("axpy", "x", x.len(), n, incx)?;
    check_vector("axpy", "y", y.len(), n, incy)?;
    if alpha == T::zero() {
        return Ok(());
    }
    if incx == 1 && incy == 1 {
        parallel::par_binary_inplace(y, x, n, |yi, xi| alpha.elem_mul(xi).elem_add(yi));
    } else {
        for i in 0..n {
            let yi = &mut y[i * incy];
            *yi = alpha.elem_mul(x[i * incx]).elem_add(*yi);
        }
    }
    Ok(())
}

/// `Σ xᵢ·yᵢ`, accumulated in index order.
pub fn dot<T: Element>(
    n: usize,
    x: &[T],
    incx: usize,
    y: &[T],
    incy: usize,
) -> Result<T, KernelError> {
    if n == 0 {
        return Ok(T::zero());
    }
    check_vector("dot", "x", x.len(), n, incx)?;
    check_vector("dot", "y", y.len(), n, incy)?;
    let mut acc = T::zero();
    for i in 0..n {
        acc = acc.elem_add(x[i * incx].elem_mul(y[i * incy]));
    }
    Ok(acc)
}

/// Euclidean norm, computed with running rescaling so that squaring never
/// overflows or underflows.
pub fn nrm2<T: Real>(n: usize, x: &[T], incx: usize) -> Result<T, KernelError> {
    if n == 0 {
        return Ok(T::zero());
    }
    check_vector("nrm2", "x", x.len(), n, incx)?;
    let mut scale = T::zero();
    let mut ssq = T::one();
    for i in 0..n {
        let v = x[i * incx];
        if v == T::zero() {
            continue;
        }
        let a = v.abs();
        if scale < a {
            let r = scale / a;
            ssq = T::one() + ssq * r * r;
            scale = a;
        } else {
            let r = a / scale;
            ssq = ssq + r * r;
        }
    }
    Ok(scale * ssq.sqrt())
}

/// `Σ |xᵢ|`.
pub fn asum<T: Element>(n: usize, x: &[T], incx: usize) -> Result<T, KernelError> {
    if n == 0 {
        return Ok(T::zero());
    }
    check_vector("asum", "x", x.len(), n, incx)?;
    let mut acc = T::zero();
    for i in 0..n {
        acc = acc.elem_add(x[i * incx].elem_abs());
    }
    Ok(acc)
}

/// `x ← α·x`.
pub fn scal<T: Element>(n: usize, alpha: T, x: &mut [T], incx: usize) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_vector("scal", "x", x.len(), n, incx)?;
    if incx == 1 {
        parallel::par_unary_inplace(x, n, |v| alpha.elem_mul(v));
    } else {
        for i in 0..n {
            x[i * incx] = alpha.elem_mul(x[i * incx]);
        }
    }
    Ok(())
}

/// `y ← x`.
pub fn copy<T: Element>(
    n: usize,
    x: &[T],
    incx: usize,
    y: &mut [T],
    incy: usize,
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_vector("copy", "x", x.len(), n, incx)?;
    check_vector("copy", "y", y.len(), n, incy)?;
    if incx == 1 && incy == 1 {
        y[..n].copy_from_slice(&x[..n]);
    } else {
        for i in 0..n {
            y[i * incy] = x[i * incx];
        }
    }
    Ok(())
}

/// Exchanges `x` and `y`.
pub fn swap<T: Element>(
    n: usize,
    x: &mut [T],
    incx: usize,
    y: &mut [T],
    incy: usize,
) -> Result<(), KernelError> {
    if n == 0 {
        return Ok(());
    }
    check_vector("swap", "x", x.len(), n, incx)?;
    check_vector("swap", "y", y.len(), n, incy)?;
    for i in 0..n {
        std::mem::swap(&mut x[i * incx], &mut y[i * incy]);
    }
    Ok(())
}

/// Index (in elements of the logical vector) of the first entry with the
/// largest magnitude. `None` for an empty vector.
pub fn iamax<T: Element>(n: usize, x: &[T], incx: usize) -> Result<Option<usize>, KernelError> {
    if n == 0 {
        return Ok(None);
    }
    check_vector("iamax", "x", x.len(), n, incx)?;
    let mut best = 0;
    let mut best_abs = x[0].elem_abs();
    for i in 1..n {
        let a = x[i * incx].elem_abs();
        if a > best_abs {
            best = i;
            best_abs = a;
        }
    }
    Ok(Some(best))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axpy_strided() {
        let x = [1.0f32, 99.0, 2.0, 99.0, 3.0];
        let mut y = [10.0f32, 20.0, 30.0];
        axpy(3, 2.0, &x, 2, &mut y, 1).unwrap();
        assert_eq!(y, [12.0, 24.0, 36.0]);
    }

    #[test]
    fn test_axpy_alpha_zero_leaves_y() {
        let x = [f32::NAN; 3];
        let mut y = [1.0f32, 2.0, 3.0];
        axpy(3, 0.0, &x, 1, &mut y, 1).unwrap();
        assert_eq!(y, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dot_and_asum() {
        let x = [1i32, -2, 3];
        let y = [4i32, 5, 6];
        assert_eq!(dot(3, &x, 1, &y, 1).unwrap(), 12);
        assert_eq!(asum(3, &x, 1).unwrap(), 6);
        assert_eq!(dot::<i32>(0, &[], 1, &[], 1).unwrap(), 0);
    }

    #[test]
    fn test_nrm2_avoids_overflow() {
        let x = [3e30f32, 4e30];
        let n = nrm2(2, &x, 1).unwrap();
        assert!((n / 5e30 - 1.0).abs() < 1e-6);
        assert_eq!(nrm2(3, &[0.0f64, 3.0, 4.0], 1).unwrap(), 5.0);
    }

    #[test]
    fn test_scal_copy_swap() {
        let mut x = [1.0f64, 2.0, 3.0, 4.0];
        scal(2, 10.0, &mut x, 2).unwrap();
        assert_eq!(x, [10.0, 2.0, 30.0, 4.0]);

        let mut y = [0.0f64; 2];
        copy(2, &x, 2, &mut y, 1).unwrap();
        assert_eq!(y, [10.0, 30.0]);

        let mut a = [1i8, 2];
        let mut b = [3i8, 4];
        swap(2, &mut a, 1, &mut b, 1).unwrap();
        assert_eq!((a, b), ([3, 4], [1, 2]));
    }

    #[test]
    fn test_iamax_first_maximum() {
        assert_eq!(iamax(4, &[1.0f32, -5.0, 5.0, 2.0], 1).unwrap(), Some(1));
        assert_eq!(iamax::<f32>(0, &[], 1).unwrap(), None);
        assert_eq!(iamax(2, &[1i16, 0, -3], 2).unwrap(), Some(1));
    }

    #[test]
    fn test_short_operand_rejected() {
        let mut y = [0.0f32; 2];
        let err = axpy(3, 1.0, &[1.0, 2.0, 3.0], 1, &mut y, 1).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { op: "axpy", .. }));
    }
}
