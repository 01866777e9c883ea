// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Activation functions and their fused gradients.
//!
//! Forwards take `(dst, src, n)`; gradients take `(dx, dy, t, n)` where `t`
//! is whichever of the forward input or output makes the derivative
//! cheapest. The per-element functions (`relu_value`, `sigmoid_value`, …)
//! are public so strided callers can feed them to the elementwise family.
//!
//! Softmax works on a packed `[outer, len, inner]` view and normalises
//! along the middle axis, subtracting the running maximum before
//! exponentiating so large inputs never overflow.

use rand::Rng;

use crate::blas::row_bands;
use crate::element::{lit, Element, Real};
use crate::elementwise::parallel::{par_binary, par_ternary, par_unary};
use crate::error::{ensure_len, KernelError};

#[inline]
pub fn relu_value<T: Element>(x: T) -> T {
    if x > T::zero() {
        x
    } else {
        T::zero()
    }
}

#[inline]
pub fn relu_grad_value<T: Element>(dy: T, x: T) -> T {
    if x > T::zero() {
        dy
    } else {
        T::zero()
    }
}

/// Logistic function, evaluated through `e^{-|x|}` so neither branch can
/// overflow.
#[inline]
pub fn sigmoid_value<T: Real>(x: T) -> T {
    if x >= T::zero() {
        T::one() / (T::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (T::one() + e)
    }
}

#[inline]
pub fn sigmoid_grad_value<T: Real>(dy: T, y: T) -> T {
    dy * y * (T::one() - y)
}

#[inline]
pub fn tanh_grad_value<T: Real>(dy: T, y: T) -> T {
    dy * (T::one() - y * y)
}

fn check_unary(op: &'static str, dst: usize, src: usize, n: usize) -> Result<(), KernelError> {
    ensure_len(op, "dst", dst, n)?;
    ensure_len(op, "src", src, n)
}

fn check_grad(op: &'static str, dx: usize, dy: usize, t: usize, n: usize) -> Result<(), KernelError> {
    ensure_len(op, "dx", dx, n)?;
    ensure_len(op, "dy", dy, n)?;
    ensure_len(op, "saved", t, n)
}

/// `dst = max(0, src)`
pub fn relu<T: Element>(dst: &mut [T], src: &[T], n: usize) -> Result<(), KernelError> {
    check_unary("relu", dst.len(), src.len(), n)?;
    par_unary(dst, src, n, relu_value);
    Ok(())
}

/// `dx = dy · [x > 0]`, using the forward input.
pub fn relu_grad<T: Element>(dx: &mut [T], dy: &[T], x: &[T], n: usize) -> Result<(), KernelError> {
    check_grad("relu_grad", dx.len(), dy.len(), x.len(), n)?;
    par_binary(dx, dy, x, n, relu_grad_value);
    Ok(())
}

/// `dst = 1 / (1 + e^{-src})`
pub fn sigmoid<T: Real>(dst: &mut [T], src: &[T], n: usize) -> Result<(), KernelError> {
    check_unary("sigmoid", dst.len(), src.len(), n)?;
    par_unary(dst, src, n, sigmoid_value);
    Ok(())
}

/// `dx = dy · y · (1 − y)`, using the forward output.
pub fn sigmoid_grad<T: Real>(dx: &mut [T], dy: &[T], y: &[T], n: usize) -> Result<(), KernelError> {
    check_grad("sigmoid_grad", dx.len(), dy.len(), y.len(), n)?;
    par_binary(dx, dy, y, n, sigmoid_grad_value);
    Ok(())
}

pub fn tanh<T: Real>(dst: &mut [T], src: &[T], n: usize) -> Result<(), KernelError> {
    check_unary("tanh", dst.len(), src.len(), n)?;
    par_unary(dst, src, n, |x: T| x.tanh());
    Ok(())
}

/// `dx = dy · (1 − y²)`, using the forward output.
pub fn tanh_grad<T: Real>(dx: &mut [T], dy: &[T], y: &[T], n: usize) -> Result<(), KernelError> {
    check_grad("tanh_grad", dx.len(), dy.len(), y.len(), n)?;
    par_binary(dx, dy, y, n, tanh_grad_value);
    Ok(())
}

/// Softmax along the middle axis of a packed `[outer, len, inner]` buffer.
pub fn softmax_axis<T: Real>(
    dst: &mut [T],
    src: &[T],
    outer: usize,
    len: usize,
    inner: usize,
) -> Result<(), KernelError> {
    let total = outer * len * inner;
    if total == 0 {
        return Ok(());
    }
    check_unary("softmax", dst.len(), src.len(), total)?;
    let slab = len * inner;
    row_bands(&mut dst[..total], outer, slab, total, |first, count, chunk| {
        for (s, out) in chunk.chunks_exact_mut(slab).take(count).enumerate() {
            let x = &src[(first + s) * slab..][..slab];
            for j in 0..inner {
                let mut max = x[j];
                for i in 1..len {
                    max = max.max(x[i * inner + j]);
                }
                let mut sum = T::zero();
                for i in 0..len {
                    let e = (x[i * inner + j] - max).exp();
                    out[i * inner + j] = e;
                    sum = sum + e;
                }
                if sum > T::zero() {
                    let inv = T::one() / sum;
                    for i in 0..len {
                        out[i * inner + j] = out[i * inner + j] * inv;
                    }
                }
            }
        }
    });
    Ok(())
}

/// Gradient of [`softmax_axis`]: `dx = y · (dy − Σ dy·y)` along the axis.
pub fn softmax_axis_grad<T: Real>(
    dx: &mut [T],
    dy: &[T],
    y: &[T],
    outer: usize,
    len: usize,
    inner: usize,
) -> Result<(), KernelError> {
    let total = outer * len * inner;
    if total == 0 {
        return Ok(());
    }
    check_grad("softmax_grad", dx.len(), dy.len(), y.len(), total)?;
    let slab = len * inner;
    row_bands(&mut dx[..total], outer, slab, total, |first, count, chunk| {
        for (s, out) in chunk.chunks_exact_mut(slab).take(count).enumerate() {
            let base = (first + s) * slab;
            let (g, y) = (&dy[base..base + slab], &y[base..base + slab]);
            for j in 0..inner {
                let mut dot = T::zero();
                for i in 0..len {
                    dot = dot + g[i * inner + j] * y[i * inner + j];
                }
                for i in 0..len {
                    let k = i * inner + j;
                    out[k] = y[k] * (g[k] - dot);
                }
            }
        }
    });
    Ok(())
}

/// Softmax over `n` packed values.
pub fn softmax_1d<T: Real>(dst: &mut [T], src: &[T], n: usize) -> Result<(), KernelError> {
    softmax_axis(dst, src, 1, n, 1)
}

/// Softmax along dim 0 of a `rows × cols` matrix: every column sums to one.
pub fn softmax_2d_rows<T: Real>(dst: &mut [T], src: &[T], rows: usize, cols: usize) -> Result<(), KernelError> {
    softmax_axis(dst, src, 1, rows, cols)
}

/// Softmax along dim 1 of a `rows × cols` matrix: every row sums to one.
pub fn softmax_2d_cols<T: Real>(dst: &mut [T], src: &[T], rows: usize, cols: usize) -> Result<(), KernelError> {
    softmax_axis(dst, src, rows, cols, 1)
}

pub fn softmax_1d_grad<T: Real>(dx: &mut [T], dy: &[T], y: &[T], n: usize) -> Result<(), KernelError> {
    softmax_axis_grad(dx, dy, y, 1, n, 1)
}

pub fn softmax_2d_rows_grad<T: Real>(
    dx: &mut [T],
    dy: &[T],
    y: &[T],
    rows: usize,
    cols: usize,
) -> Result<(), KernelError> {
    softmax_axis_grad(dx, dy, y, 1, rows, cols)
}

pub fn softmax_2d_cols_grad<T: Real>(
    dx: &mut [T],
    dy: &[T],
    y: &[T],
    rows: usize,
    cols: usize,
) -> Result<(), KernelError> {
    softmax_axis_grad(dx, dy, y, rows, cols, 1)
}

/// Fills `mask[..n]` with `0` (probability `p`) or `1/(1 − p)`, and returns
/// the keep scale. `p` must lie in `[0, 1)`.
pub fn dropout_mask<T, R>(mask: &mut [T], n: usize, p: f64, rng: &mut R) -> Result<T, KernelError>
where
    T: Real,
    R: Rng + ?Sized,
{
    if !(0.0..1.0).contains(&p) {
        return Err(KernelError::dims(
            "dropout_mask",
            format!("drop probability must lie in [0, 1), got {p}"),
        ));
    }
    ensure_len("dropout_mask", "mask", mask.len(), n)?;
    let scale = lit::<T>(1.0 / (1.0 - p));
    for m in mask[..n].iter_mut() {
        *m = if rng.gen::<f64>() < p { T::zero() } else { scale };
    }
    Ok(scale)
}

/// `dst = src · mask`
pub fn dropout_forward<T: Element>(dst: &mut [T], src: &[T], mask: &[T], n: usize) -> Result<(), KernelError> {
    check_grad("dropout_forward", dst.len(), src.len(), mask.len(), n)?;
    par_binary(dst, src, mask, n, T::elem_mul);
    Ok(())
}

/// `dx = dy · mask`
pub fn dropout_backward<T: Element>(dx: &mut [T], dy: &[T], mask: &[T], n: usize) -> Result<(), KernelError> {
    check_grad("dropout_backward", dx.len(), dy.len(), mask.len(), n)?;
    par_binary(dx, dy, mask, n, T::elem_mul);
    Ok(())
}

/// `dst = cond ≠ 0 ? a : b`, the select used by masked activations.
pub fn select<T: Element>(dst: &mut [T], cond: &[T], a: &[T], b: &[T], n: usize) -> Result<(), KernelError> {
    ensure_len("select", "cond", cond.len(), n)?;
    check_grad("select", dst.len(), a.len(), b.len(), n)?;
    par_ternary(dst, cond, a, b, n, |c: T, x, y| if c != T::zero() { x } else { y });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_relu_and_grad() {
        let x = [-2.0f32, 0.0, 3.0, -0.5, 7.0];
        let mut y = [9.0f32; 5];
        relu(&mut y, &x, 5).unwrap();
        assert_eq!(y, [0.0, 0.0, 3.0, 0.0, 7.0]);

        let mut dx = [9.0f32; 5];
        relu_grad(&mut dx, &[1.0; 5], &x, 5).unwrap();
        assert_eq!(dx, [0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_sigmoid_saturates_without_nan() {
        let x = [-1000.0f32, -1.0, 0.0, 1.0, 1000.0];
        let mut y = [0.0f32; 5];
        sigmoid(&mut y, &x, 5).unwrap();
        assert_eq!(y[0], 0.0);
        assert_eq!(y[2], 0.5);
        assert_eq!(y[4], 1.0);
        assert!(approx_eq((y[1] + y[3]) as f64, 1.0, 1e-6));

        let mut dx = [0.0f32; 5];
        sigmoid_grad(&mut dx, &[1.0; 5], &y, 5).unwrap();
        assert_eq!(dx[2], 0.25);
    }

    #[test]
    fn test_tanh_grad_uses_output() {
        let x = [0.5f64, -0.25];
        let mut y = [0.0; 2];
        tanh(&mut y, &x, 2).unwrap();
        let mut dx = [0.0; 2];
        tanh_grad(&mut dx, &[2.0, 2.0], &y, 2).unwrap();
        for i in 0..2 {
            let expected = 2.0 / x[i].cosh().powi(2);
            assert!(approx_eq(dx[i], expected, 1e-12));
        }
    }

    #[test]
    fn test_softmax_1d_large_inputs() {
        let mut y = [0.0f32; 3];
        softmax_1d(&mut y, &[1000.0, 1000.0, 1000.0], 3).unwrap();
        for v in y {
            assert!(approx_eq(v as f64, 1.0 / 3.0, 1e-6));
        }
    }

    #[test]
    fn test_softmax_2d_axes() {
        let x = [1.0f64, 2.0, 3.0, 1.0, 2.0, 3.0];
        let mut by_row = [0.0; 6];
        softmax_2d_cols(&mut by_row, &x, 2, 3).unwrap();
        assert!(approx_eq(by_row[..3].iter().sum(), 1.0, 1e-12));
        assert!(approx_eq(by_row[3..].iter().sum(), 1.0, 1e-12));
        assert!(by_row[2] > by_row[1] && by_row[1] > by_row[0]);

        let mut by_col = [0.0; 6];
        softmax_2d_rows(&mut by_col, &x, 2, 3).unwrap();
        // Each column holds two equal values.
        assert!(by_col.iter().all(|&v| approx_eq(v, 0.5, 1e-12)));
    }

    #[test]
    fn test_softmax_grad_matches_jacobian() {
        let x = [0.3f64, -1.2, 2.0, 0.7];
        let dy = [0.5, -0.1, 0.2, 1.0];
        let mut y = [0.0; 4];
        softmax_1d(&mut y, &x, 4).unwrap();
        let mut dx = [0.0; 4];
        softmax_1d_grad(&mut dx, &dy, &y, 4).unwrap();
        for i in 0..4 {
            // J[i][j] = y_i (δ_ij − y_j)
            let expected: f64 = (0..4)
                .map(|j| dy[j] * y[j] * (if i == j { 1.0 } else { 0.0 } - y[i]))
                .sum();
            assert!(approx_eq(dx[i], expected, 1e-12));
        }
        // Gradients of a softmax sum to zero along the axis.
        assert!(approx_eq(dx.iter().sum(), 0.0, 1e-12));
    }

    #[test]
    fn test_softmax_2d_grad_per_axis() {
        let y = [0.25f64, 0.75, 0.5, 0.5];
        let dy = [1.0, 0.0, 0.0, 1.0];
        let mut dx = [0.0; 4];
        softmax_2d_cols_grad(&mut dx, &dy, &y, 2, 2).unwrap();
        // Row 0: dot = 0.25, dx = [0.25·0.75, 0.75·(−0.25)].
        assert!(approx_eq(dx[0], 0.1875, 1e-12));
        assert!(approx_eq(dx[1], -0.1875, 1e-12));
        softmax_2d_rows_grad(&mut dx, &dy, &y, 2, 2).unwrap();
        // Column 0: y = [0.25, 0.5], dy = [1, 0], dot = 0.25.
        assert!(approx_eq(dx[0], 0.1875, 1e-12));
        assert!(approx_eq(dx[2], -0.125, 1e-12));
    }

    #[test]
    fn test_dropout_mask_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 10_000;
        let mut mask = vec![0.0f32; n];
        let scale = dropout_mask(&mut mask, n, 0.25, &mut rng).unwrap();
        assert!(approx_eq(scale as f64, 4.0 / 3.0, 1e-6));
        assert!(mask.iter().all(|&m| m == 0.0 || m == scale));
        let dropped = mask.iter().filter(|&&m| m == 0.0).count() as f64 / n as f64;
        assert!(approx_eq(dropped, 0.25, 0.03));

        let x = vec![2.0f32; n];
        let mut y = vec![0.0f32; n];
        dropout_forward(&mut y, &x, &mask, n).unwrap();
        let mut dx = vec![0.0f32; n];
        dropout_backward(&mut dx, &x, &mask, n).unwrap();
        assert_eq!(y, dx);
    }

    #[test]
    fn test_dropout_rejects_bad_probability() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut mask = [0.0f64; 4];
        assert!(dropout_mask(&mut mask, 4, 1.0, &mut rng).is_err());
        assert!(dropout_mask(&mut mask, 4, -0.1, &mut rng).is_err());
        assert_eq!(dropout_mask(&mut mask, 4, 0.0, &mut rng).unwrap(), 1.0);
        assert_eq!(mask, [1.0; 4]);
    }

    #[test]
    fn test_select() {
        let mut dst = [0i32; 3];
        select(&mut dst, &[1, 0, -2], &[10, 20, 30], &[1, 2, 3], 3).unwrap();
        assert_eq!(dst, [10, 2, 30]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut y = [0.0f32; 2];
        assert!(matches!(relu(&mut y, &[1.0; 3], 3), Err(KernelError::ShapeMismatch { .. })));
        assert!(softmax_1d(&mut y, &[], 0).is_ok());
    }
}
