// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Asymmetric 8-bit quantisation and the Q8 GEMM.
//!
//! A code `q ∈ [0, 255]` stands for the real value `s·(q − z)`. The GEMM
//! accumulates `(inp − z_in)·(wt − z_wt)` in `i32`, rescales by
//! `s_in·s_wt/s_out`, adds `z_out`, rounds half away from zero and clamps to
//! `[0, 255]`. Overflow of the `u8` range saturates without error.

use crate::blas::{self, row_bands};
use crate::element::Element;
use crate::elementwise::parallel;
use crate::error::{check_matrix, ensure_len, matrix_footprint, KernelError};

/// Scale and zero-point of one quantised operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    fn validate(&self, op: &'static str, what: &str) -> Result<(), KernelError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(KernelError::dims(
                op,
                format!("scale of {what} must be positive and finite, got {}", self.scale),
            ));
        }
        if !(0..=255).contains(&self.zero_point) {
            return Err(KernelError::dims(
                op,
                format!("zero point of {what} must lie in 0..=255, got {}", self.zero_point),
            ));
        }
        Ok(())
    }
}

impl Default for QuantParams {
    fn default() -> Self {
        Self::new(1.0, 0)
    }
}

/// Quantisation parameters of the three operands of a Q8 GEMM.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Q8GemmParams {
    pub input: QuantParams,
    pub weight: QuantParams,
    pub output: QuantParams,
}

impl Q8GemmParams {
    fn validate(&self, op: &'static str) -> Result<(), KernelError> {
        self.input.validate(op, "input")?;
        self.weight.validate(op, "weight")?;
        self.output.validate(op, "output")
    }

    /// `s_in·s_wt/s_out`.
    fn multiplier(&self) -> f64 {
        self.input.scale as f64 * self.weight.scale as f64 / self.output.scale as f64
    }
}

#[inline]
fn saturate_u8(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Quantises one value: `clamp(round(x/s) + z, 0, 255)`.
#[inline]
pub fn quantize_value<T: Element>(x: T, q: QuantParams) -> u8 {
    saturate_u8((x.as_f64() / q.scale as f64).round() + q.zero_point as f64)
}

/// Dequantises one code: `s·(q − z)`.
#[inline]
pub fn dequantize_value<T: Element>(code: u8, q: QuantParams) -> T {
    T::of_f64(q.scale as f64 * (code as i32 - q.zero_point) as f64)
}

/// Quantises `n` packed values.
pub fn quantize<T: Element>(
    dst: &mut [u8],
    src: &[T],
    n: usize,
    q: QuantParams,
) -> Result<(), KernelError> {
    q.validate("quantize", "target")?;
    ensure_len("quantize", "src", src.len(), n)?;
    ensure_len("quantize", "dst", dst.len(), n)?;
    parallel::par_unary(dst, src, n, |x| quantize_value(x, q));
    Ok(())
}

/// Dequantises `n` packed codes.
pub fn dequantize<T: Element>(
    dst: &mut [T],
    src: &[u8],
    n: usize,
    q: QuantParams,
) -> Result<(), KernelError> {
    q.validate("dequantize", "source")?;
    ensure_len("dequantize", "src", src.len(), n)?;
    ensure_len("dequantize", "dst", dst.len(), n)?;
    parallel::par_unary(dst, src, n, |c| dequantize_value(c, q));
    Ok(())
}

/// Strided copy of Q8 codes.
pub fn copy_q8(
    n: usize,
    src: &[u8],
    inc_src: usize,
    dst: &mut [u8],
    inc_dst: usize,
) -> Result<(), KernelError> {
    blas::copy(n, src, inc_src, dst, inc_dst)
}

#[allow(clippy::too_many_arguments)]
fn check_q8(
    op: &'static str,
    m: usize,
    n: usize,
    k: usize,
    inp_len: usize,
    ld_in: usize,
    wt_len: usize,
    ld_wt: usize,
    out_len: usize,
    ld_out: usize,
) -> Result<(), KernelError> {
    check_matrix(op, "input", inp_len, m, k, ld_in)?;
    check_matrix(op, "weight", wt_len, k, n, ld_wt)?;
    check_matrix(op, "output", out_len, m, n, ld_out)
}

/// Accumulates one output row: `acc[j] = Σ_p (inp[p] − z_in)·(wt[p, j] − z_wt)`.
#[inline]
fn accumulate_row(
    acc: &mut [i32],
    inp_row: &[u8],
    wt: &[u8],
    ld_wt: usize,
    z_in: i32,
    z_wt: i32,
) {
    acc.fill(0);
    let n = acc.len();
    for (p, &x) in inp_row.iter().enumerate() {
        let xv = x as i32 - z_in;
        if xv == 0 {
            continue;
        }
        let w_row = &wt[p * ld_wt..p * ld_wt + n];
        for (a, &w) in acc.iter_mut().zip(w_row) {
            *a = a.wrapping_add(xv.wrapping_mul(w as i32 - z_wt));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn gemm_q8_unchecked(
    m: usize,
    n: usize,
    k: usize,
    inp: &[u8],
    ld_in: usize,
    wt: &[u8],
    ld_wt: usize,
    out: &mut [u8],
    ld_out: usize,
    params: &Q8GemmParams,
) {
    let mult = params.multiplier();
    let (z_in, z_wt, z_out) = (
        params.input.zero_point,
        params.weight.zero_point,
        params.output.zero_point as f64,
    );
    let region = &mut out[..matrix_footprint(m, n, ld_out)];
    row_bands(region, m, ld_out, m * n * k.max(1), |first, rows, chunk| {
        let mut acc = memory_manager::acquire::<i32>(n);
        for r in 0..rows {
            let i = first + r;
            accumulate_row(&mut acc, &inp[i * ld_in..i * ld_in + k], wt, ld_wt, z_in, z_wt);
            let out_row = &mut chunk[r * ld_out..r * ld_out + n];
            for (o, &a) in out_row.iter_mut().zip(acc.iter()) {
                *o = saturate_u8(a as f64 * mult + z_out);
            }
        }
    });
}

/// Q8 GEMM `out = requantize((inp − z_in)·(wt − z_wt))` with `inp` `m × k`,
/// `wt` `k × n` and `out` `m × n`.
#[allow(clippy::too_many_arguments)]
pub fn gemm_nn_q8(
    m: usize,
    n: usize,
    k: usize,
    inp: &[u8],
    ld_in: usize,
    wt: &[u8],
    ld_wt: usize,
    out: &mut [u8],
    ld_out: usize,
    params: &Q8GemmParams,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    params.validate("gemm_nn_q8")?;
    check_q8("gemm_nn_q8", m, n, k, inp.len(), ld_in, wt.len(), ld_wt, out.len(), ld_out)?;
    gemm_q8_unchecked(m, n, k, inp, ld_in, wt, ld_wt, out, ld_out, params);
    Ok(())
}

/// Q8 GEMM writing the raw `i32` accumulator, before requantisation.
#[allow(clippy::too_many_arguments)]
pub fn gemm_nn_q8_accum(
    m: usize,
    n: usize,
    k: usize,
    inp: &[u8],
    ld_in: usize,
    wt: &[u8],
    ld_wt: usize,
    out: &mut [i32],
    ld_out: usize,
    z_in: i32,
    z_wt: i32,
) -> Result<(), KernelError> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    check_q8("gemm_nn_q8_accum", m, n, k, inp.len(), ld_in, wt.len(), ld_wt, out.len(), ld_out)?;
    let region = &mut out[..matrix_footprint(m, n, ld_out)];
    row_bands(region, m, ld_out, m * n * k.max(1), |first, rows, chunk| {
        for r in 0..rows {
            let i = first + r;
            let acc = &mut chunk[r * ld_out..r * ld_out + n];
            accumulate_row(acc, &inp[i * ld_in..i * ld_in + k], wt, ld_wt, z_in, z_wt);
        }
    });
    Ok(())
}

/// [`gemm_nn_q8`] over `batch` operands at fixed strides.
#[allow(clippy::too_many_arguments)]
pub fn gemm_batched_q8(
    m: usize,
    n: usize,
    k: usize,
    inp: &[u8],
    ld_in: usize,
    stride_in: usize,
    wt: &[u8],
    ld_wt: usize,
    stride_wt: usize,
    out: &mut [u8],
    ld_out: usize,
    stride_out: usize,
    batch: usize,
    params: &Q8GemmParams,
) -> Result<(), KernelError> {
    const OP: &str = "gemm_batched_q8";
    if batch == 0 || m == 0 || n == 0 {
        return Ok(());
    }
    params.validate(OP)?;
    check_q8(OP, m, n, k, inp.len(), ld_in, wt.len(), ld_wt, out.len(), ld_out)?;
    let extent = |stride: usize, footprint: usize| {
        if footprint == 0 {
            0
        } else {
            (batch - 1) * stride + footprint
        }
    };
    let fo = matrix_footprint(m, n, ld_out);
    ensure_len(OP, "input", inp.len(), extent(stride_in, matrix_footprint(m, k, ld_in)))?;
    ensure_len(OP, "weight", wt.len(), extent(stride_wt, matrix_footprint(k, n, ld_wt)))?;
    ensure_len(OP, "output", out.len(), extent(stride_out, fo))?;

    let run = |b: usize, ob: &mut [u8]| {
        gemm_q8_unchecked(
            m,
            n,
            k,
            &inp[b * stride_in..],
            ld_in,
            &wt[b * stride_wt..],
            ld_wt,
            ob,
            ld_out,
            params,
        );
    };
    if batch > 1 && stride_out >= fo && scheduler::should_parallelize(batch * m * n * k.max(1)) {
        let region = &mut out[..extent(stride_out, fo)];
        scheduler::for_each_chunk_mut(region, stride_out, |first, chunk| {
            for r in 0..chunk.len().div_ceil(stride_out) {
                run(first + r, &mut chunk[r * stride_out..]);
            }
        });
    } else {
        for b in 0..batch {
            run(b, &mut out[b * stride_out..]);
        }
    }
    Ok(())
}
