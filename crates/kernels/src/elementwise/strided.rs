// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rank-generic elementwise loops over strided operands.
//!
//! When every operand is packed the loops hand off to the flat forms in
//! [`super::contiguous`]. Otherwise a single stack cursor walks the shape in
//! row-major order and [`advance`] moves all operand offsets together.
//!
//! # Panics
//! Panics if `shape.len() > MAX_DIMS` or an operand's strides address
//! memory outside its buffer.

use super::contiguous;
use crate::layout::{advance, size, StridedMut, Strided, MAX_DIMS};

/// `dst[p] = op(src[p])` for every position `p` of `shape`.
pub fn unary_strided<D, S, F>(dst: StridedMut<'_, D>, src: Strided<'_, S>, shape: &[usize], op: F)
where
    S: Copy,
    F: Fn(S) -> D,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape) && src.is_contiguous(shape) {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        contiguous::unary(out, src.flat(n), n, op);
        return;
    }

    let rank = shape.len();
    let mut cursor = [0usize; MAX_DIMS];
    let mut offs = [dst.offset as isize, src.offset as isize];
    loop {
        dst.data[offs[0] as usize] = op(src.data[offs[1] as usize]);
        if !advance(shape, &mut cursor[..rank], &mut offs, [dst.strides, src.strides]) {
            break;
        }
    }
}

/// `dst[p] = op(a[p], b[p])` for every position `p` of `shape`.
pub fn binary_strided<D, A, B, F>(
    dst: StridedMut<'_, D>,
    a: Strided<'_, A>,
    b: Strided<'_, B>,
    shape: &[usize],
    op: F,
) where
    A: Copy,
    B: Copy,
    F: Fn(A, B) -> D,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape) && a.is_contiguous(shape) && b.is_contiguous(shape) {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        contiguous::binary(out, a.flat(n), b.flat(n), n, op);
        return;
    }

    let rank = shape.len();
    let mut cursor = [0usize; MAX_DIMS];
    let mut offs = [dst.offset as isize, a.offset as isize, b.offset as isize];
    loop {
        dst.data[offs[0] as usize] = op(a.data[offs[1] as usize], b.data[offs[2] as usize]);
        if !advance(
            shape,
            &mut cursor[..rank],
            &mut offs,
            [dst.strides, a.strides, b.strides],
        ) {
            break;
        }
    }
}

/// `dst[p] = op(c[p], a[p], b[p])` for every position `p` of `shape`.
pub fn ternary_strided<D, C, A, B, F>(
    dst: StridedMut<'_, D>,
    c: Strided<'_, C>,
    a: Strided<'_, A>,
    b: Strided<'_, B>,
    shape: &[usize],
    op: F,
) where
    C: Copy,
    A: Copy,
    B: Copy,
    F: Fn(C, A, B) -> D,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape)
        && c.is_contiguous(shape)
        && a.is_contiguous(shape)
        && b.is_contiguous(shape)
    {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        contiguous::ternary(out, c.flat(n), a.flat(n), b.flat(n), n, op);
        return;
    }

    let rank = shape.len();
    let mut cursor = [0usize; MAX_DIMS];
    let mut offs = [
        dst.offset as isize,
        c.offset as isize,
        a.offset as isize,
        b.offset as isize,
    ];
    loop {
        dst.data[offs[0] as usize] = op(
            c.data[offs[1] as usize],
            a.data[offs[2] as usize],
            b.data[offs[3] as usize],
        );
        if !advance(
            shape,
            &mut cursor[..rank],
            &mut offs,
            [dst.strides, c.strides, a.strides, b.strides],
        ) {
            break;
        }
    }
}

/// `dst[p] = op(src[p], scalar)` for every position `p` of `shape`.
pub fn unary_scalar_strided<D, S, K, F>(
    dst: StridedMut<'_, D>,
    src: Strided<'_, S>,
    scalar: K,
    shape: &[usize],
    op: F,
) where
    S: Copy,
    K: Copy,
    F: Fn(S, K) -> D,
{
    unary_strided(dst, src, shape, |x| op(x, scalar));
}

/// `dst[p] = value` for every position `p` of `shape`.
pub fn fill_strided<T: Copy>(dst: StridedMut<'_, T>, value: T, shape: &[usize]) {
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape) {
        dst.data[dst.offset..dst.offset + n].fill(value);
        return;
    }
    let rank = shape.len();
    let mut cursor = [0usize; MAX_DIMS];
    let mut offs = [dst.offset as isize];
    loop {
        dst.data[offs[0] as usize] = value;
        if !advance(shape, &mut cursor[..rank], &mut offs, [dst.strides]) {
            break;
        }
    }
}

/// Visits every position of `shape` in row-major order with the element of
/// `src` at that position.
pub fn for_each_strided<T, F>(src: Strided<'_, T>, shape: &[usize], mut f: F)
where
    T: Copy,
    F: FnMut(T),
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if src.is_contiguous(shape) {
        src.flat(n).iter().for_each(|&x| f(x));
        return;
    }
    let rank = shape.len();
    let mut cursor = [0usize; MAX_DIMS];
    let mut offs = [src.offset as isize];
    loop {
        f(src.data[offs[0] as usize]);
        if !advance(shape, &mut cursor[..rank], &mut offs, [src.strides]) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::packed_strides;

    #[test]
    fn test_unary_transposed_source() {
        // src is [[1, 2, 3], [4, 5, 6]] viewed as its 3x2 transpose.
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0; 6];
        let shape = [3, 2];
        let ds = packed_strides(&shape);
        unary_strided(
            StridedMut::new(&mut dst, 0, &ds),
            Strided::new(&src, 0, &[1, 3]),
            &shape,
            |x| x * 10,
        );
        assert_eq!(dst, [10, 40, 20, 50, 30, 60]);
    }

    #[test]
    fn test_binary_negative_stride() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [10.0f32, 20.0, 30.0, 40.0];
        let mut dst = [0.0f32; 4];
        binary_strided(
            StridedMut::new(&mut dst, 0, &[1]),
            Strided::new(&a, 3, &[-1]),
            Strided::new(&b, 0, &[1]),
            &[4],
            |x, y| x + y,
        );
        assert_eq!(dst, [14.0, 23.0, 32.0, 41.0]);
    }

    #[test]
    fn test_packed_matches_contiguous() {
        let a: Vec<f64> = (0..37).map(|i| i as f64 * 0.5 - 3.0).collect();
        let b: Vec<f64> = (0..37).map(|i| (i as f64).sin()).collect();
        let shape = [37];
        let ps = packed_strides(&shape);
        let mut strided = vec![0.0; 37];
        let mut flat = vec![0.0; 37];
        binary_strided(
            StridedMut::new(&mut strided, 0, &ps),
            Strided::new(&a, 0, &ps),
            Strided::new(&b, 0, &ps),
            &shape,
            |x, y| x * y - y,
        );
        contiguous::binary(&mut flat, &a, &b, 37, |x, y| x * y - y);
        assert_eq!(
            strided.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            flat.iter().map(|x| x.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ternary_strided_with_offset() {
        let cond = [1u8, 0, 1, 0];
        let a = [0, 0, 1, 2, 3, 4];
        let b = [-1, -2, -3, -4];
        let mut dst = [0; 4];
        let ps = packed_strides(&[2, 2]);
        ternary_strided(
            StridedMut::new(&mut dst, 0, &ps),
            Strided::new(&cond, 0, &ps),
            Strided::new(&a, 2, &ps),
            Strided::new(&b, 0, &[1, 2]),
            &[2, 2],
            |c, x, y| if c != 0 { x } else { y },
        );
        assert_eq!(dst, [1, -3, 3, -4]);
    }

    #[test]
    fn test_scalar_rank_zero() {
        let src = [4.0f32];
        let mut dst = [0.0f32];
        unary_scalar_strided(
            StridedMut::new(&mut dst, 0, &[]),
            Strided::new(&src, 0, &[]),
            0.5,
            &[],
            |x, s| x * s,
        );
        assert_eq!(dst, [2.0]);
    }

    #[test]
    fn test_fill_strided_column() {
        let mut dst = [0; 6];
        fill_strided(StridedMut::new(&mut dst, 1, &[3]), 7, &[2]);
        assert_eq!(dst, [0, 7, 0, 0, 7, 0]);
    }

    #[test]
    fn test_for_each_strided_order() {
        let src = [1, 2, 3, 4];
        let mut seen = Vec::new();
        for_each_strided(Strided::new(&src, 0, &[1, 2]), &[2, 2], |x| seen.push(x));
        assert_eq!(seen, vec![1, 3, 2, 4]);
    }
}
