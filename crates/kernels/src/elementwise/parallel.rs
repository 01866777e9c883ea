// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Multi-threaded wrappers over the elementwise loops.
//!
//! Below the scheduler threshold every wrapper calls the single-threaded
//! form directly. Above it, contiguous work is cut into equal flat chunks;
//! strided work is cut along the outermost axis, provided the destination's
//! outer slabs are laid out one after another in memory. Every destination
//! position is written by exactly one chunk, and each chunk runs the same
//! per-element closure as the single-threaded form, so results are
//! bitwise identical.

use super::{contiguous, strided};
use crate::layout::{size, span, Strided, StridedMut, MAX_DIMS};

/// Multi-threaded [`contiguous::unary`].
pub fn par_unary<D, S, F>(dst: &mut [D], src: &[S], n: usize, op: F)
where
    D: Send,
    S: Copy + Sync,
    F: Fn(S) -> D + Sync,
{
    if !scheduler::should_parallelize(n) {
        return contiguous::unary(dst, src, n, op);
    }
    let src = &src[..n];
    scheduler::for_each_chunk_mut(&mut dst[..n], 1, |start, out| {
        let len = out.len();
        contiguous::unary(out, &src[start..start + len], len, &op);
    });
}

/// Multi-threaded [`contiguous::binary`].
pub fn par_binary<D, A, B, F>(dst: &mut [D], a: &[A], b: &[B], n: usize, op: F)
where
    D: Send,
    A: Copy + Sync,
    B: Copy + Sync,
    F: Fn(A, B) -> D + Sync,
{
    if !scheduler::should_parallelize(n) {
        return contiguous::binary(dst, a, b, n, op);
    }
    let (a, b) = (&a[..n], &b[..n]);
    scheduler::for_each_chunk_mut(&mut dst[..n], 1, |start, out| {
        let end = start + out.len();
        let len = out.len();
        contiguous::binary(out, &a[start..end], &b[start..end], len, &op);
    });
}

/// Multi-threaded [`contiguous::ternary`].
pub fn par_ternary<D, C, A, B, F>(dst: &mut [D], c: &[C], a: &[A], b: &[B], n: usize, op: F)
where
    D: Send,
    C: Copy + Sync,
    A: Copy + Sync,
    B: Copy + Sync,
    F: Fn(C, A, B) -> D + Sync,
{
    if !scheduler::should_parallelize(n) {
        return contiguous::ternary(dst, c, a, b, n, op);
    }
    let (c, a, b) = (&c[..n], &a[..n], &b[..n]);
    scheduler::for_each_chunk_mut(&mut dst[..n], 1, |start, out| {
        let end = start + out.len();
        let len = out.len();
        contiguous::ternary(out, &c[start..end], &a[start..end], &b[start..end], len, &op);
    });
}

/// Multi-threaded [`contiguous::unary_inplace`].
pub fn par_unary_inplace<T, F>(buf: &mut [T], n: usize, op: F)
where
    T: Copy + Send,
    F: Fn(T) -> T + Sync,
{
    if !scheduler::should_parallelize(n) {
        return contiguous::unary_inplace(buf, n, op);
    }
    scheduler::for_each_chunk_mut(&mut buf[..n], 1, |_, chunk| {
        let len = chunk.len();
        contiguous::unary_inplace(chunk, len, &op);
    });
}

/// Multi-threaded [`contiguous::binary_inplace`].
pub fn par_binary_inplace<T, B, F>(buf: &mut [T], other: &[B], n: usize, op: F)
where
    T: Copy + Send,
    B: Copy + Sync,
    F: Fn(T, B) -> T + Sync,
{
    if !scheduler::should_parallelize(n) {
        return contiguous::binary_inplace(buf, other, n, op);
    }
    let other = &other[..n];
    scheduler::for_each_chunk_mut(&mut buf[..n], 1, |start, chunk| {
        let len = chunk.len();
        contiguous::binary_inplace(chunk, &other[start..start + len], len, &op);
    });
}

/// Multi-threaded [`contiguous::fill`].
pub fn par_fill<T: Copy + Send + Sync>(dst: &mut [T], value: T, n: usize) {
    if !scheduler::should_parallelize(n) {
        return contiguous::fill(dst, value, n);
    }
    scheduler::for_each_chunk_mut(&mut dst[..n], 1, |_, chunk| chunk.fill(value));
}

/// Splits a strided destination into runs of outer-axis slabs.
///
/// Succeeds when the outer stride is positive and every inner stride is
/// non-negative and keeps a slab within one outer step; the slabs are then
/// disjoint, increasing, contiguous regions of the buffer. `f` receives
/// `(first_outer_index, outer_count, dst_chunk)` where `dst_chunk` starts at
/// the slab's base.
fn split_outer<T, F>(dst: StridedMut<'_, T>, shape: &[usize], f: F) -> bool
where
    T: Send,
    F: Fn(usize, usize, StridedMut<'_, T>) + Sync,
{
    let Some((&outer, inner_shape)) = shape.split_first() else {
        return false;
    };
    let Some((&s0, inner_strides)) = dst.strides.split_first() else {
        return false;
    };
    if s0 <= 0 || outer < 2 || inner_strides.iter().any(|&s| s < 0) {
        return false;
    }
    let (_, inner_hi) = span(inner_shape, inner_strides);
    if inner_hi >= s0 {
        return false;
    }
    let step = s0 as usize;
    let extent = (outer - 1) * step + inner_hi as usize + 1;
    let strides = dst.strides;
    let region = &mut dst.data[dst.offset..dst.offset + extent];
    scheduler::for_each_chunk_mut(region, step, |first, chunk| {
        let rows = chunk.len().div_ceil(step);
        f(first, rows, StridedMut::new(chunk, 0, strides));
    });
    true
}

fn outer_stride<T>(s: &Strided<'_, T>) -> isize {
    s.strides.first().copied().unwrap_or(0)
}

/// Copies `shape` with its outer extent replaced.
fn with_outer(shape: &[usize], outer: usize) -> ([usize; MAX_DIMS], usize) {
    let mut buf = [0usize; MAX_DIMS];
    buf[..shape.len()].copy_from_slice(shape);
    buf[0] = outer;
    (buf, shape.len())
}

/// Multi-threaded [`strided::unary_strided`].
pub fn par_unary_strided<D, S, F>(
    mut dst: StridedMut<'_, D>,
    src: Strided<'_, S>,
    shape: &[usize],
    op: F,
) where
    D: Send,
    S: Copy + Sync,
    F: Fn(S) -> D + Sync,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape) && src.is_contiguous(shape) {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        return par_unary(out, src.flat(n), n, op);
    }
    if !scheduler::should_parallelize(n) {
        return strided::unary_strided(dst, src, shape, op);
    }
    let src_outer = outer_stride(&src);
    let handled = split_outer(dst.reborrow(), shape, |first, rows, out| {
        let (sub, rank) = with_outer(shape, rows);
        let s = src.shifted(first as isize * src_outer);
        strided::unary_strided(out, s, &sub[..rank], &op);
    });
    if !handled {
        strided::unary_strided(dst, src, shape, op);
    }
}

/// Multi-threaded [`strided::binary_strided`].
pub fn par_binary_strided<D, A, B, F>(
    mut dst: StridedMut<'_, D>,
    a: Strided<'_, A>,
    b: Strided<'_, B>,
    shape: &[usize],
    op: F,
) where
    D: Send,
    A: Copy + Sync,
    B: Copy + Sync,
    F: Fn(A, B) -> D + Sync,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if dst.is_contiguous(shape) && a.is_contiguous(shape) && b.is_contiguous(shape) {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        return par_binary(out, a.flat(n), b.flat(n), n, op);
    }
    if !scheduler::should_parallelize(n) {
        return strided::binary_strided(dst, a, b, shape, op);
    }
    let (a_outer, b_outer) = (outer_stride(&a), outer_stride(&b));
    let handled = split_outer(dst.reborrow(), shape, |first, rows, out| {
        let (sub, rank) = with_outer(shape, rows);
        let sa = a.shifted(first as isize * a_outer);
        let sb = b.shifted(first as isize * b_outer);
        strided::binary_strided(out, sa, sb, &sub[..rank], &op);
    });
    if !handled {
        strided::binary_strided(dst, a, b, shape, op);
    }
}

/// Multi-threaded [`strided::ternary_strided`].
pub fn par_ternary_strided<D, C, A, B, F>(
    mut dst: StridedMut<'_, D>,
    c: Strided<'_, C>,
    a: Strided<'_, A>,
    b: Strided<'_, B>,
    shape: &[usize],
    op: F,
) where
    D: Send,
    C: Copy + Sync,
    A: Copy + Sync,
    B: Copy + Sync,
    F: Fn(C, A, B) -> D + Sync,
{
    let n = size(shape);
    if n == 0 {
        return;
    }
    if !scheduler::should_parallelize(n) {
        return strided::ternary_strided(dst, c, a, b, shape, op);
    }
    if dst.is_contiguous(shape)
        && c.is_contiguous(shape)
        && a.is_contiguous(shape)
        && b.is_contiguous(shape)
    {
        let out = &mut dst.data[dst.offset..dst.offset + n];
        return par_ternary(out, c.flat(n), a.flat(n), b.flat(n), n, op);
    }
    let (c_outer, a_outer, b_outer) = (outer_stride(&c), outer_stride(&a), outer_stride(&b));
    let handled = split_outer(dst.reborrow(), shape, |first, rows, out| {
        let (sub, rank) = with_outer(shape, rows);
        let f = first as isize;
        strided::ternary_strided(
            out,
            c.shifted(f * c_outer),
            a.shifted(f * a_outer),
            b.shifted(f * b_outer),
            &sub[..rank],
            &op,
        );
    });
    if !handled {
        strided::ternary_strided(dst, c, a, b, shape, op);
    }
}
