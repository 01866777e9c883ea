// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reductions over strided operands.
//!
//! `sum`, `mean`, `max` and `min` collapse a set of axes; the destination is
//! packed over the input shape with every reduced axis set to extent 1, so
//! its element count is the product of the kept extents. An empty axis set
//! reduces over every axis. `argmax`/`argmin` collapse one axis and report
//! the position along it (first occurrence on ties).
//!
//! The walk uses one shared cursor with a zero destination stride on every
//! reduced axis, so a single pass over the source visits each element once.

use crate::element::Element;
use crate::error::{ensure_len, KernelError};
use crate::layout::{advance, fits, packed_strides_into, size, Strided, MAX_DIMS};

fn check_source<T>(op: &'static str, src: &Strided<'_, T>, shape: &[usize]) -> Result<(), KernelError> {
    if shape.len() > MAX_DIMS {
        return Err(KernelError::dims(op, format!("rank {} exceeds {MAX_DIMS}", shape.len())));
    }
    if src.strides.len() != shape.len() {
        return Err(KernelError::shape(
            op,
            format!("{} strides for rank {}", src.strides.len(), shape.len()),
        ));
    }
    if !fits(src.data.len(), src.offset, shape, src.strides) {
        return Err(KernelError::shape(op, "source view exceeds its buffer"));
    }
    Ok(())
}

/// Marks the reduced axes; an empty `axes` marks all of them.
fn reduced_mask(op: &'static str, rank: usize, axes: &[usize]) -> Result<[bool; MAX_DIMS], KernelError> {
    let mut mask = [axes.is_empty(); MAX_DIMS];
    if axes.is_empty() {
        return Ok(mask);
    }
    for &a in axes {
        if a >= rank {
            return Err(KernelError::dims(op, format!("axis {a} out of range for rank {rank}")));
        }
        if mask[a] {
            return Err(KernelError::dims(op, format!("axis {a} listed twice")));
        }
        mask[a] = true;
    }
    Ok(mask)
}

/// Shape left after reducing `axes` (reduced axes kept with extent 1).
pub fn reduced_shape(shape: &[usize], axes: &[usize]) -> Result<Vec<usize>, KernelError> {
    let mask = reduced_mask("reduced_shape", shape.len(), axes)?;
    Ok(shape
        .iter()
        .enumerate()
        .map(|(d, &e)| if mask[d] { 1 } else { e })
        .collect())
}

/// Folds `src` into `dst` with `f`, returning how many source elements
/// landed in each destination slot.
fn fold_axes<T, F>(
    op: &'static str,
    dst: &mut [T],
    src: Strided<'_, T>,
    shape: &[usize],
    axes: &[usize],
    init: T,
    f: F,
) -> Result<usize, KernelError>
where
    T: Element,
    F: Fn(T, T) -> T,
{
    check_source(op, &src, shape)?;
    let rank = shape.len();
    let mask = reduced_mask(op, rank, axes)?;
    let total = size(shape);
    if total == 0 {
        return Ok(0);
    }

    let mut out_shape = [1usize; MAX_DIMS];
    for d in 0..rank {
        if !mask[d] {
            out_shape[d] = shape[d];
        }
    }
    let out_len = size(&out_shape[..rank]);
    ensure_len(op, "dst", dst.len(), out_len)?;

    let mut dst_strides = [0isize; MAX_DIMS];
    packed_strides_into(&out_shape[..rank], &mut dst_strides);
    for d in 0..rank {
        if mask[d] {
            dst_strides[d] = 0;
        }
    }

    dst[..out_len].fill(init);
    let mut cursor = [0usize; MAX_DIMS];
    let mut offsets = [0isize, src.offset as isize];
    loop {
        let (o, s) = (offsets[0] as usize, offsets[1] as usize);
        dst[o] = f(dst[o], src.data[s]);
        if !advance(shape, &mut cursor[..rank], &mut offsets, [&dst_strides[..rank], src.strides]) {
            break;
        }
    }
    Ok(total / out_len)
}

/// Sum over `axes`.
pub fn sum<T: Element>(dst: &mut [T], src: Strided<'_, T>, shape: &[usize], axes: &[usize]) -> Result<(), KernelError> {
    fold_axes("sum", dst, src, shape, axes, T::zero(), T::elem_add).map(|_| ())
}

/// Arithmetic mean over `axes`; integer types divide with truncation.
pub fn mean<T: Element>(dst: &mut [T], src: Strided<'_, T>, shape: &[usize], axes: &[usize]) -> Result<(), KernelError> {
    let count = fold_axes("mean", dst, src, shape, axes, T::zero(), T::elem_add)?;
    if count > 0 {
        let n = T::of_f64(count as f64);
        let out_len = size(shape) / count;
        for v in dst[..out_len].iter_mut() {
            *v = v.elem_div(n);
        }
    }
    Ok(())
}

/// Maximum over `axes`.
pub fn max<T: Element>(dst: &mut [T], src: Strided<'_, T>, shape: &[usize], axes: &[usize]) -> Result<(), KernelError> {
    fold_axes("max", dst, src, shape, axes, T::lowest(), T::elem_max).map(|_| ())
}

/// Minimum over `axes`.
pub fn min<T: Element>(dst: &mut [T], src: Strided<'_, T>, shape: &[usize], axes: &[usize]) -> Result<(), KernelError> {
    let highest = if T::IS_FLOAT {
        T::lowest().elem_neg()
    } else {
        T::max_value()
    };
    fold_axes("min", dst, src, shape, axes, highest, T::elem_min).map(|_| ())
}

fn arg_along<T, F>(
    op: &'static str,
    dst: &mut [i64],
    src: Strided<'_, T>,
    shape: &[usize],
    axis: usize,
    better: F,
) -> Result<(), KernelError>
where
    T: Element,
    F: Fn(T, T) -> bool,
{
    check_source(op, &src, shape)?;
    let rank = shape.len();
    if axis >= rank {
        return Err(KernelError::dims(op, format!("axis {axis} out of range for rank {rank}")));
    }
    if size(shape) == 0 {
        return Ok(());
    }
    let len = shape[axis];
    let step = src.strides[axis];
    let mut outer = [0usize; MAX_DIMS];
    outer[..rank].copy_from_slice(shape);
    outer[axis] = 1;
    let out_len = size(&outer[..rank]);
    ensure_len(op, "dst", dst.len(), out_len)?;

    let mut cursor = [0usize; MAX_DIMS];
    let mut offsets = [src.offset as isize];
    for slot in dst[..out_len].iter_mut() {
        let base = offsets[0];
        let mut best = src.data[base as usize];
        let mut at = 0usize;
        for i in 1..len {
            let v = src.data[(base + i as isize * step) as usize];
            if better(v, best) {
                best = v;
                at = i;
            }
        }
        *slot = at as i64;
        advance(&outer[..rank], &mut cursor[..rank], &mut offsets, [src.strides]);
    }
    Ok(())
}

/// Position of the largest element along `axis`; `dst` holds one index per
/// remaining position in row-major order.
pub fn argmax<T: Element>(dst: &mut [i64], src: Strided<'_, T>, shape: &[usize], axis: usize) -> Result<(), KernelError> {
    arg_along("argmax", dst, src, shape, axis, |v, best| v > best)
}

/// Position of the smallest element along `axis`.
pub fn argmin<T: Element>(dst: &mut [i64], src: Strided<'_, T>, shape: &[usize], axis: usize) -> Result<(), KernelError> {
    arg_along("argmin", dst, src, shape, axis, |v, best| v < best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::packed_strides;

    #[test]
    fn test_sum_over_each_axis() {
        let x: Vec<i32> = (1..=6).collect();
        let strides = packed_strides(&[2, 3]);
        let src = Strided::packed(&x, &strides);

        let mut rows = [0i32; 3];
        sum(&mut rows, src, &[2, 3], &[0]).unwrap();
        assert_eq!(rows, [5, 7, 9]);

        let mut cols = [0i32; 2];
        sum(&mut cols, src, &[2, 3], &[1]).unwrap();
        assert_eq!(cols, [6, 15]);

        let mut all = [0i32; 1];
        sum(&mut all, src, &[2, 3], &[]).unwrap();
        assert_eq!(all, [21]);
    }

    #[test]
    fn test_reduce_transposed_view() {
        // A 3x2 transpose of the 2x3 matrix [[1,2,3],[4,5,6]].
        let x = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let src = Strided::new(&x, 0, &[1, 3]);
        let mut out = [0.0; 3];
        max(&mut out, src, &[3, 2], &[1]).unwrap();
        assert_eq!(out, [4.0, 5.0, 6.0]);
        mean(&mut out, src, &[3, 2], &[1]).unwrap();
        assert_eq!(out, [2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_min_and_max_over_middle_axis() {
        let x: Vec<f32> = vec![3.0, -1.0, 4.0, 1.0, -5.0, 9.0, 2.0, 6.0];
        let strides = packed_strides(&[2, 2, 2]);
        let src = Strided::packed(&x, &strides);
        let mut lo = [0.0f32; 4];
        min(&mut lo, src, &[2, 2, 2], &[1]).unwrap();
        assert_eq!(lo, [3.0, -1.0, -5.0, 6.0]);
        let mut hi = [0.0f32; 2];
        max(&mut hi, src, &[2, 2, 2], &[1, 2]).unwrap();
        assert_eq!(hi, [4.0, 9.0]);
    }

    #[test]
    fn test_integer_mean_truncates() {
        let x = [1i64, 2, 2, 2];
        let strides = packed_strides(&[4]);
        let mut out = [0i64];
        mean(&mut out, Strided::packed(&x, &strides), &[4], &[0]).unwrap();
        assert_eq!(out, [1]);
    }

    #[test]
    fn test_argmax_first_occurrence() {
        let x = [1.0f32, 7.0, 7.0, 0.0, 2.0, 2.0];
        let strides = packed_strides(&[2, 3]);
        let src = Strided::packed(&x, &strides);
        let mut idx = [0i64; 2];
        argmax(&mut idx, src, &[2, 3], 1).unwrap();
        assert_eq!(idx, [1, 1]);
        argmin(&mut idx, src, &[2, 3], 1).unwrap();
        assert_eq!(idx, [0, 0]);
        let mut per_col = [0i64; 3];
        argmax(&mut per_col, src, &[2, 3], 0).unwrap();
        assert_eq!(per_col, [0, 0, 0]);
        argmin(&mut per_col, src, &[2, 3], 0).unwrap();
        assert_eq!(per_col, [1, 1, 1]);
    }

    #[test]
    fn test_bad_axes() {
        let x = [0.0f32; 4];
        let strides = packed_strides(&[2, 2]);
        let src = Strided::packed(&x, &strides);
        let mut out = [0.0f32; 4];
        assert!(matches!(sum(&mut out, src, &[2, 2], &[2]), Err(KernelError::BadDimensions { .. })));
        assert!(sum(&mut out, src, &[2, 2], &[1, 1]).is_err());
        let mut idx = [0i64; 2];
        assert!(argmax(&mut idx, src, &[2, 2], 5).is_err());
        assert_eq!(reduced_shape(&[2, 3, 4], &[1]).unwrap(), vec![2, 1, 4]);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let x: [f32; 0] = [];
        let strides = packed_strides(&[0, 3]);
        let mut out = [42.0f32; 3];
        sum(&mut out, Strided::packed(&x, &strides), &[0, 3], &[0]).unwrap();
        assert_eq!(out, [42.0; 3]);
    }
}
