// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Flat-indexed elementwise loops over packed buffers.
//!
//! Every loop reslices its operands to exactly `n` elements up front and
//! walks them in groups of four, so the optimiser can drop the per-element
//! bounds checks and keep four independent operations in flight.
//!
//! # Panics
//! All functions panic if an operand holds fewer than `n` elements.

/// `dst[i] = op(src[i])`
#[inline]
pub fn unary<D, S, F>(dst: &mut [D], src: &[S], n: usize, op: F)
where
    S: Copy,
    F: Fn(S) -> D,
{
    let dst = &mut dst[..n];
    let src = &src[..n];
    let mut d4 = dst.chunks_exact_mut(4);
    let mut s4 = src.chunks_exact(4);
    for (d, s) in (&mut d4).zip(&mut s4) {
        d[0] = op(s[0]);
        d[1] = op(s[1]);
        d[2] = op(s[2]);
        d[3] = op(s[3]);
    }
    for (d, &s) in d4.into_remainder().iter_mut().zip(s4.remainder()) {
        *d = op(s);
    }
}

/// `dst[i] = op(a[i], b[i])`
#[inline]
pub fn binary<D, A, B, F>(dst: &mut [D], a: &[A], b: &[B], n: usize, op: F)
where
    A: Copy,
    B: Copy,
    F: Fn(A, B) -> D,
{
    let dst = &mut dst[..n];
    let a = &a[..n];
    let b = &b[..n];
    let mut d4 = dst.chunks_exact_mut(4);
    let mut a4 = a.chunks_exact(4);
    let mut b4 = b.chunks_exact(4);
    for ((d, x), y) in (&mut d4).zip(&mut a4).zip(&mut b4) {
        d[0] = op(x[0], y[0]);
        d[1] = op(x[1], y[1]);
        d[2] = op(x[2], y[2]);
        d[3] = op(x[3], y[3]);
    }
    let tail = d4.into_remainder();
    for ((d, &x), &y) in tail.iter_mut().zip(a4.remainder()).zip(b4.remainder()) {
        *d = op(x, y);
    }
}

/// `dst[i] = op(c[i], a[i], b[i])`
#[inline]
pub fn ternary<D, C, A, B, F>(dst: &mut [D], c: &[C], a: &[A], b: &[B], n: usize, op: F)
where
    C: Copy,
    A: Copy,
    B: Copy,
    F: Fn(C, A, B) -> D,
{
    let dst = &mut dst[..n];
    let c = &c[..n];
    let a = &a[..n];
    let b = &b[..n];
    let mut d4 = dst.chunks_exact_mut(4);
    let mut c4 = c.chunks_exact(4);
    let mut a4 = a.chunks_exact(4);
    let mut b4 = b.chunks_exact(4);
    for (((d, z), x), y) in (&mut d4).zip(&mut c4).zip(&mut a4).zip(&mut b4) {
        d[0] = op(z[0], x[0], y[0]);
        d[1] = op(z[1], x[1], y[1]);
        d[2] = op(z[2], x[2], y[2]);
        d[3] = op(z[3], x[3], y[3]);
    }
    let tail = d4.into_remainder();
    for (((d, &z), &x), &y) in tail
        .iter_mut()
        .zip(c4.remainder())
        .zip(a4.remainder())
        .zip(b4.remainder())
    {
        *d = op(z, x, y);
    }
}

/// `dst[i] = op(src[i], scalar)`
#[inline]
pub fn unary_scalar<D, S, K, F>(dst: &mut [D], src: &[S], scalar: K, n: usize, op: F)
where
    S: Copy,
    K: Copy,
    F: Fn(S, K) -> D,
{
    unary(dst, src, n, |x| op(x, scalar));
}

/// `dst[i] = op(a[i], b[i], scalar)`
#[inline]
pub fn binary_scalar<D, A, B, K, F>(dst: &mut [D], a: &[A], b: &[B], scalar: K, n: usize, op: F)
where
    A: Copy,
    B: Copy,
    K: Copy,
    F: Fn(A, B, K) -> D,
{
    binary(dst, a, b, n, |x, y| op(x, y, scalar));
}

/// `buf[i] = op(buf[i])`
#[inline]
pub fn unary_inplace<T, F>(buf: &mut [T], n: usize, op: F)
where
    T: Copy,
    F: Fn(T) -> T,
{
    let buf = &mut buf[..n];
    let mut b4 = buf.chunks_exact_mut(4);
    for b in &mut b4 {
        b[0] = op(b[0]);
        b[1] = op(b[1]);
        b[2] = op(b[2]);
        b[3] = op(b[3]);
    }
    for b in b4.into_remainder() {
        *b = op(*b);
    }
}

/// `buf[i] = op(buf[i], other[i])`
#[inline]
pub fn binary_inplace<T, B, F>(buf: &mut [T], other: &[B], n: usize, op: F)
where
    T: Copy,
    B: Copy,
    F: Fn(T, B) -> T,
{
    let buf = &mut buf[..n];
    let other = &other[..n];
    let mut b4 = buf.chunks_exact_mut(4);
    let mut o4 = other.chunks_exact(4);
    for (b, o) in (&mut b4).zip(&mut o4) {
        b[0] = op(b[0], o[0]);
        b[1] = op(b[1], o[1]);
        b[2] = op(b[2], o[2]);
        b[3] = op(b[3], o[3]);
    }
    for (b, &o) in b4.into_remainder().iter_mut().zip(o4.remainder()) {
        *b = op(*b, o);
    }
}

/// `dst[i] = value`
#[inline]
pub fn fill<T: Copy>(dst: &mut [T], value: T, n: usize) {
    dst[..n].fill(value);
}
