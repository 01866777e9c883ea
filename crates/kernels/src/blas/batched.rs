// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Batched GEMM and GEMV.
//!
//! Every batch is validated before any is computed, so a failure leaves all
//! destinations untouched. Batches are independent and are spread over the
//! worker pool; the per-batch kernel then runs inline on its worker.

use super::level2::{check_gemv, gemv_n_unchecked, gemv_t_unchecked};
use super::level3::{check_gemm, gemm_unchecked};
use super::Trans;
use crate::element::Element;
use crate::error::{ensure_len, matrix_footprint, KernelError};

fn check_count(op: &'static str, what: &str, got: usize, batch: usize) -> Result<(), KernelError> {
    if got != batch {
        return Err(KernelError::shape(
            op,
            format!("{what} holds {got} operands for a batch of {batch}"),
        ));
    }
    Ok(())
}

/// Elements needed to hold `batch` operands of `footprint` spaced `stride`
/// apart.
fn strided_extent(batch: usize, stride: usize, footprint: usize) -> usize {
    if batch == 0 || footprint == 0 {
        0
    } else {
        (batch - 1) * stride + footprint
    }
}

/// [`gemm`](super::gemm) over lists of independent operands.
#[allow(clippy::too_many_arguments)]
pub fn gemm_batched<T: Element>(
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[&[T]],
    lda: usize,
    b: &[&[T]],
    ldb: usize,
    beta: T,
    c: &mut [&mut [T]],
    ldc: usize,
) -> Result<(), KernelError> {
    const OP: &str = "gemm_batched";
    let batch = c.len();
    check_count(OP, "A", a.len(), batch)?;
    check_count(OP, "B", b.len(), batch)?;
    if m == 0 || n == 0 {
        return Ok(());
    }
    for i in 0..batch {
        check_gemm(OP, trans_a, trans_b, m, n, k, a[i].len(), lda, b[i].len(), ldb, c[i].len(), ldc)?;
    }
    let work = batch * m * n * k.max(1);
    if batch > 1 && scheduler::should_parallelize(work) {
        scheduler::for_each_chunk_mut(c, 1, |first, cs| {
            for (r, ci) in cs.iter_mut().enumerate() {
                let i = first + r;
                gemm_unchecked(trans_a, trans_b, m, n, k, alpha, a[i], lda, b[i], ldb, beta, ci, ldc);
            }
        });
    } else {
        for (i, ci) in c.iter_mut().enumerate() {
            gemm_unchecked(trans_a, trans_b, m, n, k, alpha, a[i], lda, b[i], ldb, beta, ci, ldc);
        }
    }
    Ok(())
}

/// [`gemm`](super::gemm) over `batch` operands laid out at fixed strides in
/// single buffers.
///
/// Batches run in parallel only when `stride_c` keeps the destinations
/// disjoint; overlapping destinations (e.g. `stride_c = 0`) are processed
/// in batch order.
#[allow(clippy::too_many_arguments)]
pub fn gemm_strided_batched<T: Element>(
    trans_a: Trans,
    trans_b: Trans,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    stride_a: usize,
    b: &[T],
    ldb: usize,
    stride_b: usize,
    beta: T,
    c: &mut [T],
    ldc: usize,
    stride_c: usize,
    batch: usize,
) -> Result<(), KernelError> {
    const OP: &str = "gemm_strided_batched";
    if batch == 0 || m == 0 || n == 0 {
        return Ok(());
    }
    // Validate the first operand's layout, then the full batch extent.
    check_gemm(OP, trans_a, trans_b, m, n, k, a.len(), lda, b.len(), ldb, c.len(), ldc)?;
    let (ar, ac) = trans_a.stored(m, k);
    let (br, bc) = trans_b.stored(k, n);
    let fa = matrix_footprint(ar, ac, lda);
    let fb = matrix_footprint(br, bc, ldb);
    let fc = matrix_footprint(m, n, ldc);
    ensure_len(OP, "A", a.len(), strided_extent(batch, stride_a, fa))?;
    ensure_len(OP, "B", b.len(), strided_extent(batch, stride_b, fb))?;
    ensure_len(OP, "C", c.len(), strided_extent(batch, stride_c, fc))?;

    let run = |i: usize, ci: &mut [T]| {
        let ai = &a[i * stride_a..];
        let bi = &b[i * stride_b..];
        gemm_unchecked(trans_a, trans_b, m, n, k, alpha, ai, lda, bi, ldb, beta, ci, ldc);
    };
    let work = batch * m * n * k.max(1);
    if batch > 1 && stride_c >= fc && scheduler::should_parallelize(work) {
        let region = &mut c[..strided_extent(batch, stride_c, fc)];
        scheduler::for_each_chunk_mut(region, stride_c, |first, chunk| {
            let count = chunk.len().div_ceil(stride_c);
            for r in 0..count {
                run(first + r, &mut chunk[r * stride_c..]);
            }
        });
    } else {
        for i in 0..batch {
            run(i, &mut c[i * stride_c..]);
        }
    }
    Ok(())
}

/// [`gemv`](super::gemv) over lists of independent operands.
#[allow(clippy::too_many_arguments)]
pub fn gemv_batched<T: Element>(
    trans: Trans,
    m: usize,
    n: usize,
    alpha: T,
    a: &[&[T]],
    lda: usize,
    x: &[&[T]],
    beta: T,
    y: &mut [&mut [T]],
) -> Result<(), KernelError> {
    const OP: &str = "gemv_batched";
    let batch = y.len();
    check_count(OP, "A", a.len(), batch)?;
    check_count(OP, "x", x.len(), batch)?;
    if m == 0 || n == 0 {
        return Ok(());
    }
    for i in 0..batch {
        check_gemv(OP, trans, m, n, a[i], lda, x[i].len(), y[i].len())?;
    }
    let run = |i: usize, yi: &mut [T]| match trans {
        Trans::No => gemv_n_unchecked(m, n, alpha, a[i], lda, x[i], beta, yi),
        Trans::Yes => gemv_t_unchecked(m, n, alpha, a[i], lda, x[i], beta, yi),
    };
    if batch > 1 && scheduler::should_parallelize(batch * m * n) {
        scheduler::for_each_chunk_mut(y, 1, |first, ys| {
            for (r, yi) in ys.iter_mut().enumerate() {
                run(first + r, yi);
            }
        });
    } else {
        for (i, yi) in y.iter_mut().enumerate() {
            run(i, yi);
        }
    }
    Ok(())
}

/// [`gemv`](super::gemv) over `batch` operands at fixed strides.
#[allow(clippy::too_many_arguments)]
pub fn gemv_strided_batched<T: Element>(
    trans: Trans,
    m: usize,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    stride_a: usize,
    x: &[T],
    stride_x: usize,
    beta: T,
    y: &mut [T],
    stride_y: usize,
    batch: usize,
) -> Result<(), KernelError> {
    const OP: &str = "gemv_strided_batched";
    if batch == 0 || m == 0 || n == 0 {
        return Ok(());
    }
    check_gemv(OP, trans, m, n, a, lda, x.len(), y.len())?;
    let (xn, yn) = match trans {
        Trans::No => (n, m),
        Trans::Yes => (m, n),
    };
    ensure_len(OP, "A", a.len(), strided_extent(batch, stride_a, matrix_footprint(m, n, lda)))?;
    ensure_len(OP, "x", x.len(), strided_extent(batch, stride_x, xn))?;
    ensure_len(OP, "y", y.len(), strided_extent(batch, stride_y, yn))?;

    let run = |i: usize, yi: &mut [T]| {
        let ai = &a[i * stride_a..];
        let xi = &x[i * stride_x..];
        match trans {
            Trans::No => gemv_n_unchecked(m, n, alpha, ai, lda, xi, beta, yi),
            Trans::Yes => gemv_t_unchecked(m, n, alpha, ai, lda, xi, beta, yi),
        }
    };
    if batch > 1 && stride_y >= yn && scheduler::should_parallelize(batch * m * n) {
        let region = &mut y[..strided_extent(batch, stride_y, yn)];
        scheduler::for_each_chunk_mut(region, stride_y, |first, chunk| {
            for r in 0..chunk.len().div_ceil(stride_y) {
                run(first + r, &mut chunk[r * stride_y..]);
            }
        });
    } else {
        for i in 0..batch {
            run(i, &mut y[i * stride_y..]);
        }
    }
    Ok(())
}
