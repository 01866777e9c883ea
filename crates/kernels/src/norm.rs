// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Normalisation layers and their backward passes.
//!
//! Every normalisation here is the same computation on a different view of
//! a packed buffer `[outer, len, inner]`: statistics are taken along `len`
//! for each `(outer, inner)` pair, and the learnable `γ`/`β` are indexed by
//! a per-layer mapping from position to parameter.
//!
//! | kernel            | outer          | len              | inner    | parameter index |
//! |-------------------|----------------|------------------|----------|-----------------|
//! | batch norm        | 1              | batch            | features | feature         |
//! | layer / RMS norm  | rows           | last dim         | 1        | last-dim index  |
//! | instance norm 2D  | batch·channels | height·width     | 1        | channel         |
//! | group norm        | batch·groups   | channels/G·H·W   | 1        | channel         |
//!
//! `ε` is added inside the square root. Statistics live in a pooled
//! scratch buffer. Missing `γ` means unit scale; missing `β` means zero
//! shift.

use memory_manager::PooledBuffer;

use crate::blas::row_bands;
use crate::element::{lit, Real};
use crate::error::{ensure_len, KernelError};
use crate::layout::size;

/// Destinations of a normalisation backward pass. `gamma` and `beta` are
/// overwritten with the parameter gradients when present.
#[derive(Debug)]
pub struct NormGrads<'a, T> {
    pub input: &'a mut [T],
    pub gamma: Option<&'a mut [T]>,
    pub beta: Option<&'a mut [T]>,
}

impl<'a, T> NormGrads<'a, T> {
    /// Only the input gradient.
    pub fn input(input: &'a mut [T]) -> Self {
        Self {
            input,
            gamma: None,
            beta: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Grouping {
    outer: usize,
    len: usize,
    inner: usize,
    /// Subtract the mean (false for RMS norm).
    centered: bool,
    /// Number of `γ`/`β` entries.
    params: usize,
}

impl Grouping {
    fn total(&self) -> usize {
        self.outer * self.len * self.inner
    }

    fn slab(&self) -> usize {
        self.len * self.inner
    }
}

/// `[mean_0..mean_inner, inv_std_0..inv_std_inner]` for every outer slab.
fn statistics<T: Real>(x: &[T], g: Grouping, eps: T) -> PooledBuffer<T> {
    let mut stats = memory_manager::acquire::<T>(2 * g.outer * g.inner);
    let n = lit::<T>(g.len as f64);
    let slab = g.slab();
    row_bands(&mut stats[..], g.outer, 2 * g.inner, g.total(), |first, count, chunk| {
        for (r, row) in chunk.chunks_exact_mut(2 * g.inner).take(count).enumerate() {
            let xs = &x[(first + r) * slab..][..slab];
            let (means, invs) = row.split_at_mut(g.inner);
            for j in 0..g.inner {
                let mut mean = T::zero();
                if g.centered {
                    for i in 0..g.len {
                        mean = mean + xs[i * g.inner + j];
                    }
                    mean = mean / n;
                }
                let mut var = T::zero();
                for i in 0..g.len {
                    let d = xs[i * g.inner + j] - mean;
                    var = var + d * d;
                }
                means[j] = mean;
                invs[j] = T::one() / (var / n + eps).sqrt();
            }
        }
    });
    stats
}

fn check_params<T>(
    op: &'static str,
    g: Grouping,
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
) -> Result<(), KernelError> {
    if let Some(gamma) = gamma {
        ensure_len(op, "gamma", gamma.len(), g.params)?;
    }
    if let Some(beta) = beta {
        ensure_len(op, "beta", beta.len(), g.params)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn forward<T, P>(
    op: &'static str,
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
    eps: T,
    g: Grouping,
    param: P,
) -> Result<(), KernelError>
where
    T: Real,
    P: Fn(usize, usize, usize) -> usize + Sync,
{
    let total = g.total();
    if total == 0 {
        return Ok(());
    }
    ensure_len(op, "dst", dst.len(), total)?;
    ensure_len(op, "x", x.len(), total)?;
    check_params(op, g, gamma, beta)?;

    let stats = statistics(x, g, eps);
    let stats = &stats[..];
    let slab = g.slab();
    row_bands(&mut dst[..total], g.outer, slab, total, |first, count, chunk| {
        for (r, out) in chunk.chunks_exact_mut(slab).take(count).enumerate() {
            let o = first + r;
            let xs = &x[o * slab..][..slab];
            let (means, invs) = stats[o * 2 * g.inner..][..2 * g.inner].split_at(g.inner);
            for i in 0..g.len {
                for j in 0..g.inner {
                    let k = i * g.inner + j;
                    let p = param(o, i, j);
                    let mut y = (xs[k] - means[j]) * invs[j];
                    if let Some(gamma) = gamma {
                        y = y * gamma[p];
                    }
                    if let Some(beta) = beta {
                        y = y + beta[p];
                    }
                    out[k] = y;
                }
            }
        }
    });
    Ok(())
}

/// `dx = inv·(dx̂ − mean(dx̂) − x̂·mean(dx̂·x̂))` with `dx̂ = dy·γ`; the
/// `mean(dx̂)` term is dropped for RMS norm.
#[allow(clippy::too_many_arguments)]
fn backward<T, P>(
    op: &'static str,
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    eps: T,
    g: Grouping,
    param: P,
) -> Result<(), KernelError>
where
    T: Real,
    P: Fn(usize, usize, usize) -> usize + Sync,
{
    let total = g.total();
    if total == 0 {
        return Ok(());
    }
    let NormGrads {
        input: grad_input,
        gamma: grad_gamma,
        beta: grad_beta,
    } = grads;
    ensure_len(op, "grad_input", grad_input.len(), total)?;
    ensure_len(op, "grad_output", grad_output.len(), total)?;
    ensure_len(op, "x", x.len(), total)?;
    check_params(op, g, gamma, None)?;
    if let Some(gg) = grad_gamma.as_deref() {
        ensure_len(op, "grad_gamma", gg.len(), g.params)?;
    }
    if let Some(gb) = grad_beta.as_deref() {
        ensure_len(op, "grad_beta", gb.len(), g.params)?;
    }

    let stats = statistics(x, g, eps);
    let stats = &stats[..];
    let slab = g.slab();
    let n = lit::<T>(g.len as f64);
    let scale = |p: usize| gamma.map_or(T::one(), |gamma| gamma[p]);

    row_bands(&mut grad_input[..total], g.outer, slab, total, |first, count, chunk| {
        for (r, dx) in chunk.chunks_exact_mut(slab).take(count).enumerate() {
            let o = first + r;
            let xs = &x[o * slab..][..slab];
            let dys = &grad_output[o * slab..][..slab];
            let (means, invs) = stats[o * 2 * g.inner..][..2 * g.inner].split_at(g.inner);
            for j in 0..g.inner {
                let mut sum_dxh = T::zero();
                let mut sum_dxh_xh = T::zero();
                for i in 0..g.len {
                    let k = i * g.inner + j;
                    let xh = (xs[k] - means[j]) * invs[j];
                    let dxh = dys[k] * scale(param(o, i, j));
                    sum_dxh = sum_dxh + dxh;
                    sum_dxh_xh = sum_dxh_xh + dxh * xh;
                }
                let mean_dxh = if g.centered { sum_dxh / n } else { T::zero() };
                let mean_dxh_xh = sum_dxh_xh / n;
                for i in 0..g.len {
                    let k = i * g.inner + j;
                    let xh = (xs[k] - means[j]) * invs[j];
                    let dxh = dys[k] * scale(param(o, i, j));
                    dx[k] = invs[j] * (dxh - mean_dxh - xh * mean_dxh_xh);
                }
            }
        }
    });

    if grad_gamma.is_none() && grad_beta.is_none() {
        return Ok(());
    }
    let mut dgamma = grad_gamma;
    let mut dbeta = grad_beta;
    if let Some(dg) = dgamma.as_deref_mut() {
        dg[..g.params].fill(T::zero());
    }
    if let Some(db) = dbeta.as_deref_mut() {
        db[..g.params].fill(T::zero());
    }
    for o in 0..g.outer {
        let (means, invs) = stats[o * 2 * g.inner..][..2 * g.inner].split_at(g.inner);
        for i in 0..g.len {
            for j in 0..g.inner {
                let k = o * slab + i * g.inner + j;
                let p = param(o, i, j);
                let dy = grad_output[k];
                if let Some(dg) = dgamma.as_deref_mut() {
                    dg[p] = dg[p] + dy * (x[k] - means[j]) * invs[j];
                }
                if let Some(db) = dbeta.as_deref_mut() {
                    db[p] = db[p] + dy;
                }
            }
        }
    }
    Ok(())
}

fn batch_grouping(op: &'static str, shape: &[usize]) -> Result<Grouping, KernelError> {
    let (&batch, features) = shape
        .split_first()
        .ok_or_else(|| KernelError::dims(op, "input must have a batch axis"))?;
    let features = size(features);
    Ok(Grouping {
        outer: 1,
        len: batch,
        inner: features,
        centered: true,
        params: features,
    })
}

fn last_axis_grouping(op: &'static str, shape: &[usize], centered: bool) -> Result<Grouping, KernelError> {
    let (&last, rest) = shape
        .split_last()
        .ok_or_else(|| KernelError::dims(op, "input must have at least one axis"))?;
    Ok(Grouping {
        outer: size(rest),
        len: last,
        inner: 1,
        centered,
        params: last,
    })
}

fn group_grouping(op: &'static str, shape: &[usize], groups: usize) -> Result<(Grouping, usize, usize), KernelError> {
    if shape.len() < 2 {
        return Err(KernelError::dims(op, "input must be [batch, channels, ...]"));
    }
    let (batch, channels) = (shape[0], shape[1]);
    if groups == 0 || channels % groups != 0 {
        return Err(KernelError::dims(
            op,
            format!("{channels} channels cannot be split into {groups} groups"),
        ));
    }
    let spatial = size(&shape[2..]);
    let per_group = channels / groups;
    Ok((
        Grouping {
            outer: batch * groups,
            len: per_group * spatial,
            inner: 1,
            centered: true,
            params: channels,
        },
        per_group,
        spatial,
    ))
}

fn instance_grouping(batch: usize, channels: usize, height: usize, width: usize) -> Grouping {
    Grouping {
        outer: batch * channels,
        len: height * width,
        inner: 1,
        centered: true,
        params: channels,
    }
}

/// Batch normalisation over axis 0 of `shape = [batch, ...]`, with
/// per-feature `γ`/`β` of length `size(shape[1..])`.
pub fn batch_norm<T: Real>(
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = batch_grouping("batch_norm", shape)?;
    forward("batch_norm", dst, x, gamma, beta, eps, g, |_, _, j| j)
}

pub fn batch_norm_backward<T: Real>(
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = batch_grouping("batch_norm_backward", shape)?;
    backward("batch_norm_backward", grads, grad_output, x, gamma, eps, g, |_, _, j| j)
}

/// Layer normalisation over the last axis, with `γ`/`β` of the last
/// axis' length.
pub fn layer_norm<T: Real>(
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = last_axis_grouping("layer_norm", shape, true)?;
    forward("layer_norm", dst, x, gamma, beta, eps, g, |_, i, _| i)
}

pub fn layer_norm_backward<T: Real>(
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = last_axis_grouping("layer_norm_backward", shape, true)?;
    backward("layer_norm_backward", grads, grad_output, x, gamma, eps, g, |_, i, _| i)
}

/// RMS normalisation over the last axis: `y = x / sqrt(mean(x²) + ε) · γ`.
pub fn rms_norm<T: Real>(
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = last_axis_grouping("rms_norm", shape, false)?;
    forward("rms_norm", dst, x, gamma, None, eps, g, |_, i, _| i)
}

/// Backward pass of [`rms_norm`]; `grads.beta` is ignored.
pub fn rms_norm_backward<T: Real>(
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    shape: &[usize],
    eps: T,
) -> Result<(), KernelError> {
    let g = last_axis_grouping("rms_norm_backward", shape, false)?;
    let grads = NormGrads { beta: None, ..grads };
    backward("rms_norm_backward", grads, grad_output, x, gamma, eps, g, |_, i, _| i)
}

/// Instance normalisation of an NCHW batch: statistics per `(b, c)`
/// plane, per-channel `γ`/`β`.
#[allow(clippy::too_many_arguments)]
pub fn instance_norm_2d<T: Real>(
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
    eps: T,
) -> Result<(), KernelError> {
    let g = instance_grouping(batch, channels, height, width);
    forward("instance_norm_2d", dst, x, gamma, beta, eps, g, |o, _, _| o % channels)
}

#[allow(clippy::too_many_arguments)]
pub fn instance_norm_2d_backward<T: Real>(
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
    eps: T,
) -> Result<(), KernelError> {
    let g = instance_grouping(batch, channels, height, width);
    backward("instance_norm_2d_backward", grads, grad_output, x, gamma, eps, g, |o, _, _| {
        o % channels
    })
}

/// Group normalisation of `shape = [batch, channels, ...]`: channels are
/// split into `groups` consecutive groups and each `(b, group)` is
/// normalised as one set. `γ`/`β` are per channel.
///
/// Fails with `BadDimensions` when `groups` does not divide `channels`.
pub fn group_norm<T: Real>(
    dst: &mut [T],
    x: &[T],
    gamma: Option<&[T]>,
    beta: Option<&[T]>,
    shape: &[usize],
    groups: usize,
    eps: T,
) -> Result<(), KernelError> {
    let (g, per_group, spatial) = group_grouping("group_norm", shape, groups)?;
    forward("group_norm", dst, x, gamma, beta, eps, g, |o, i, _| {
        (o % groups) * per_group + i / spatial
    })
}

#[allow(clippy::too_many_arguments)]
pub fn group_norm_backward<T: Real>(
    grads: NormGrads<'_, T>,
    grad_output: &[T],
    x: &[T],
    gamma: Option<&[T]>,
    shape: &[usize],
    groups: usize,
    eps: T,
) -> Result<(), KernelError> {
    let (g, per_group, spatial) = group_grouping("group_norm_backward", shape, groups)?;
    backward("group_norm_backward", grads, grad_output, x, gamma, eps, g, |o, i, _| {
        (o % groups) * per_group + i / spatial
    })
}

/// Scales `x` to unit 2-norm along `axis`, or as a single vector when
/// `axis` is `None`. Slices whose norm is zero are copied unchanged.
pub fn l2_norm<T: Real>(dst: &mut [T], x: &[T], shape: &[usize], axis: Option<usize>) -> Result<(), KernelError> {
    const OP: &str = "l2_norm";
    let total = size(shape);
    if total == 0 {
        return Ok(());
    }
    ensure_len(OP, "dst", dst.len(), total)?;
    ensure_len(OP, "x", x.len(), total)?;
    let (outer, len, inner) = match axis {
        None => (1, total, 1),
        Some(a) if a < shape.len() => (size(&shape[..a]), shape[a], size(&shape[a + 1..])),
        Some(a) => {
            return Err(KernelError::dims(
                OP,
                format!("axis {a} out of range for rank {}", shape.len()),
            ))
        }
    };
    let slab = len * inner;
    row_bands(&mut dst[..total], outer, slab, total, |first, count, chunk| {
        for (r, out) in chunk.chunks_exact_mut(slab).take(count).enumerate() {
            let xs = &x[(first + r) * slab..][..slab];
            for j in 0..inner {
                let mut sq = T::zero();
                for i in 0..len {
                    sq = sq + xs[i * inner + j] * xs[i * inner + j];
                }
                let norm = sq.sqrt();
                for i in 0..len {
                    let v = xs[i * inner + j];
                    out[i * inner + j] = if norm == T::zero() { v } else { v / norm };
                }
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn ramp(n: usize, k: f64) -> Vec<f64> {
        (0..n).map(|i| ((i as f64 + 1.0) * k).sin()).collect()
    }

    /// Checks `grads` against central differences of `L = Σ dy·f(x)`.
    fn check_input_grad<F>(x: &[f64], dy: &[f64], dx: &[f64], f: F)
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let h = 1e-6;
        let loss = |v: &[f64]| -> f64 { f(v).iter().zip(dy).map(|(a, b)| a * b).sum() };
        for i in 0..x.len() {
            let mut xp = x.to_vec();
            let mut xm = x.to_vec();
            xp[i] += h;
            xm[i] -= h;
            let numeric = (loss(&xp) - loss(&xm)) / (2.0 * h);
            assert!(approx_eq(dx[i], numeric, 1e-6), "dx[{i}] = {} vs {numeric}", dx[i]);
        }
    }

    #[test]
    fn test_layer_norm_rows_are_standardised() {
        let x = [1.0f64, 2.0, 3.0, 4.0, 10.0, 10.0, 10.0, 10.0];
        let mut y = [0.0; 8];
        layer_norm(&mut y, &x, None, None, &[2, 4], 0.0).unwrap();
        let mean: f64 = y[..4].iter().sum::<f64>() / 4.0;
        let var: f64 = y[..4].iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!(approx_eq(mean, 0.0, 1e-12));
        assert!(approx_eq(var, 1.0, 1e-12));
        // A constant row with ε = 0 would divide by zero; ε > 0 keeps it finite.
        layer_norm(&mut y, &x, None, None, &[2, 4], 1e-5).unwrap();
        assert!(y[4..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_layer_norm_affine() {
        let x = [0.0f32, 2.0];
        let mut y = [0.0f32; 2];
        layer_norm(&mut y, &x, Some(&[2.0, 3.0][..]), Some(&[1.0, -1.0][..]), &[1, 2], 0.0).unwrap();
        assert_eq!(y, [-1.0, 2.0]);
    }

    #[test]
    fn test_batch_norm_per_feature() {
        // Feature 0 is [1, 3], feature 1 is [5, 5].
        let x = [1.0f64, 5.0, 3.0, 5.0];
        let mut y = [0.0; 4];
        batch_norm(&mut y, &x, None, Some(&[0.0, 7.0][..]), &[2, 2], 1e-12).unwrap();
        assert!(approx_eq(y[0], -1.0, 1e-9));
        assert!(approx_eq(y[2], 1.0, 1e-9));
        assert!(approx_eq(y[1], 7.0, 1e-9));
    }

    #[test]
    fn test_rms_norm() {
        let x = [3.0f64, 4.0];
        let mut y = [0.0; 2];
        rms_norm(&mut y, &x, Some(&[1.0, 2.0][..]), &[2], 0.0).unwrap();
        let rms = (12.5f64).sqrt();
        assert!(approx_eq(y[0], 3.0 / rms, 1e-12));
        assert!(approx_eq(y[1], 8.0 / rms, 1e-12));
    }

    #[test]
    fn test_group_norm_requires_divisible_channels() {
        let x = [0.0f32; 12];
        let mut y = [0.0f32; 12];
        assert!(matches!(
            group_norm(&mut y, &x, None, None, &[1, 3, 4], 2, 1e-5),
            Err(KernelError::BadDimensions { .. })
        ));
        assert!(group_norm(&mut y, &x, None, None, &[1, 3, 4], 0, 1e-5).is_err());
    }

    #[test]
    fn test_group_norm_with_one_group_per_channel_is_instance_norm() {
        let shape = [2, 3, 2, 2];
        let x = ramp(24, 0.7);
        let gamma = [1.0, 2.0, 0.5];
        let beta = [0.1, 0.0, -0.3];
        let mut a = vec![0.0; 24];
        let mut b = vec![0.0; 24];
        group_norm(&mut a, &x, Some(&gamma[..]), Some(&beta[..]), &shape, 3, 1e-5).unwrap();
        instance_norm_2d(&mut b, &x, Some(&gamma[..]), Some(&beta[..]), 2, 3, 2, 2, 1e-5).unwrap();
        for (u, v) in a.iter().zip(&b) {
            assert!(approx_eq(*u, *v, 1e-12));
        }
    }

    #[test]
    fn test_layer_norm_backward_matches_finite_differences() {
        let shape = [2, 5];
        let x = ramp(10, 0.9);
        let dy = ramp(10, 1.7);
        let gamma = [0.5, 1.5, -1.0, 2.0, 1.0];
        let mut dx = vec![0.0; 10];
        let mut dg = vec![0.0; 5];
        let mut db = vec![0.0; 5];
        let grads = NormGrads {
            input: &mut dx,
            gamma: Some(&mut dg[..]),
            beta: Some(&mut db[..]),
        };
        layer_norm_backward(grads, &dy, &x, Some(&gamma[..]), &shape, 1e-5).unwrap();
        check_input_grad(&x, &dy, &dx, |v| {
            let mut y = vec![0.0; 10];
            layer_norm(&mut y, v, Some(&gamma[..]), None, &shape, 1e-5).unwrap();
            y
        });
        // dβ is the column sum of dy.
        assert!(approx_eq(db[0], dy[0] + dy[5], 1e-12));
        // dγ = Σ dy·x̂.
        let mut xhat = vec![0.0; 10];
        layer_norm(&mut xhat, &x, None, None, &shape, 1e-5).unwrap();
        assert!(approx_eq(dg[2], dy[2] * xhat[2] + dy[7] * xhat[7], 1e-12));
    }

    #[test]
    fn test_batch_norm_backward_matches_finite_differences() {
        let shape = [4, 3];
        let x = ramp(12, 0.4);
        let dy = ramp(12, 2.1);
        let gamma = [1.5, -0.5, 2.0];
        let mut dx = vec![0.0; 12];
        batch_norm_backward(NormGrads::input(&mut dx), &dy, &x, Some(&gamma[..]), &shape, 1e-5).unwrap();
        check_input_grad(&x, &dy, &dx, |v| {
            let mut y = vec![0.0; 12];
            batch_norm(&mut y, v, Some(&gamma[..]), None, &shape, 1e-5).unwrap();
            y
        });
    }

    #[test]
    fn test_rms_norm_backward_matches_finite_differences() {
        let shape = [3, 4];
        let x = ramp(12, 1.1);
        let dy = ramp(12, 0.3);
        let gamma = [1.0, 2.0, 0.5, -1.0];
        let mut dx = vec![0.0; 12];
        let mut dg = vec![0.0; 4];
        let grads = NormGrads {
            input: &mut dx,
            gamma: Some(&mut dg[..]),
            beta: None,
        };
        rms_norm_backward(grads, &dy, &x, Some(&gamma[..]), &shape, 1e-6).unwrap();
        check_input_grad(&x, &dy, &dx, |v| {
            let mut y = vec![0.0; 12];
            rms_norm(&mut y, v, Some(&gamma[..]), &shape, 1e-6).unwrap();
            y
        });
    }

    #[test]
    fn test_group_norm_backward_matches_finite_differences() {
        let shape = [2, 4, 3];
        let x = ramp(24, 0.35);
        let dy = ramp(24, 1.9);
        let gamma = [1.0, -2.0, 0.5, 3.0];
        let mut dx = vec![0.0; 24];
        group_norm_backward(NormGrads::input(&mut dx), &dy, &x, Some(&gamma[..]), &shape, 2, 1e-5).unwrap();
        check_input_grad(&x, &dy, &dx, |v| {
            let mut y = vec![0.0; 24];
            group_norm(&mut y, v, Some(&gamma[..]), None, &shape, 2, 1e-5).unwrap();
            y
        });
    }

    #[test]
    fn test_instance_norm_backward_param_grads() {
        let x = ramp(16, 0.5);
        let dy = ramp(16, 0.8);
        let mut dx = vec![0.0; 16];
        let mut dg = vec![0.0; 2];
        let mut db = vec![0.0; 2];
        let grads = NormGrads {
            input: &mut dx,
            gamma: Some(&mut dg[..]),
            beta: Some(&mut db[..]),
        };
        instance_norm_2d_backward(grads, &dy, &x, None, 2, 2, 2, 2, 1e-5).unwrap();
        // Channel 0 collects planes (b=0, c=0) and (b=1, c=0).
        let expected: f64 = dy[0..4].iter().chain(&dy[8..12]).sum();
        assert!(approx_eq(db[0], expected, 1e-12));
    }

    #[test]
    fn test_l2_norm() {
        let x = [3.0f64, 0.0, 4.0, 0.0];
        let mut y = [0.0; 4];
        l2_norm(&mut y, &x, &[2, 2], Some(0)).unwrap();
        assert_eq!(y, [0.6, 0.0, 0.8, 0.0]);

        l2_norm(&mut y, &x, &[4], None).unwrap();
        assert_eq!(y, [0.6, 0.0, 0.8, 0.0]);

        let zeros = [0.0f64; 4];
        l2_norm(&mut y, &zeros, &[2, 2], Some(1)).unwrap();
        assert_eq!(y, [0.0; 4]);
        assert!(l2_norm(&mut y, &x, &[2, 2], Some(2)).is_err());
    }

    #[test]
    fn test_rank_zero_is_rejected_and_empty_is_ok() {
        let mut y = [0.0f32];
        assert!(layer_norm(&mut y, &[1.0], None, None, &[], 1e-5).is_err());
        assert!(batch_norm(&mut y, &[], None, None, &[0, 3], 1e-5).is_ok());
    }
}
