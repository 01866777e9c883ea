// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2D convolution: GEMM-backed forward and backward, and the scatter form of
//! the transposed convolution.
//!
//! Weights are `[C_out, C_in, k_h, k_w]` for [`conv2d`] and
//! `[C_in, C_out, k_h, k_w]` for [`conv2d_transposed`]. Images are NCHW.

use super::im2col::{col2im, im2col};
use super::Conv2dGeometry;
use crate::blas::{gemm_nn, gemm_nt, gemm_tn, row_bands};
use crate::element::Element;
use crate::error::{ensure_len, KernelError};

/// Forward convolution of `input` (described by `geometry`) into
/// `output: [batch, out_channels, out_h, out_w]`.
///
/// The patches go through a pooled im2col buffer and a single
/// `W · colsᵀ` product; the `[C_out, batch·out_h·out_w]` result is then
/// transposed into NCHW order with the bias added on the way.
pub fn conv2d<T: Element>(
    output: &mut [T],
    input: &[T],
    weights: &[T],
    bias: Option<&[T]>,
    geometry: &Conv2dGeometry,
    out_channels: usize,
) -> Result<(), KernelError> {
    const OP: &str = "conv2d";
    if geometry.is_empty() || out_channels == 0 {
        return Ok(());
    }
    let (out_h, out_w) = geometry.output_dims(OP)?;
    let patch = geometry.patch_len();
    let per_image = out_h * out_w;
    let rows = geometry.batch * per_image;
    ensure_len(OP, "input", input.len(), geometry.input_len())?;
    ensure_len(OP, "weights", weights.len(), out_channels * patch)?;
    ensure_len(OP, "output", output.len(), out_channels * rows)?;
    if let Some(bias) = bias {
        ensure_len(OP, "bias", bias.len(), out_channels)?;
    }

    let mut cols = memory_manager::acquire::<T>(rows * patch);
    im2col(&mut cols, input, geometry)?;
    let mut product = memory_manager::acquire::<T>(out_channels * rows);
    gemm_nt(
        out_channels,
        rows,
        patch,
        T::one(),
        weights,
        patch,
        &cols,
        patch,
        T::zero(),
        &mut product,
        rows,
    )?;

    let product = &product[..];
    let planes = geometry.batch * out_channels;
    row_bands(
        &mut output[..planes * per_image],
        planes,
        per_image,
        planes * per_image,
        |first, count, chunk| {
            for (p, plane) in chunk.chunks_exact_mut(per_image).take(count).enumerate() {
                let b = (first + p) / out_channels;
                let oc = (first + p) % out_channels;
                let src = &product[oc * rows + b * per_image..][..per_image];
                match bias {
                    Some(bias) => {
                        for (o, &v) in plane.iter_mut().zip(src) {
                            *o = v.elem_add(bias[oc]);
                        }
                    }
                    None => plane.copy_from_slice(src),
                }
            }
        },
    );
    Ok(())
}

/// Gradients of [`conv2d`] with respect to its input, weights and bias.
///
/// `grad_output` is `[batch, out_channels, out_h, out_w]`; below, `dY` is
/// that gradient rearranged to the forward product's `[C_out, rows]`
/// layout. Every gradient buffer is overwritten:
///
/// - `grad_weights = dY · cols` (shape of `weights`),
/// - `grad_input = col2im(dYᵀ · W)` (shape of `input`),
/// - `grad_bias[oc] = Σ dY[·, oc, ·, ·]`.
#[allow(clippy::too_many_arguments)]
pub fn conv2d_backward<T: Element>(
    grad_input: &mut [T],
    grad_weights: &mut [T],
    grad_bias: Option<&mut [T]>,
    grad_output: &[T],
    input: &[T],
    weights: &[T],
    geometry: &Conv2dGeometry,
    out_channels: usize,
) -> Result<(), KernelError> {
    const OP: &str = "conv2d_backward";
    if geometry.is_empty() || out_channels == 0 {
        return Ok(());
    }
    let (out_h, out_w) = geometry.output_dims(OP)?;
    let patch = geometry.patch_len();
    let per_image = out_h * out_w;
    let rows = geometry.batch * per_image;
    ensure_len(OP, "input", input.len(), geometry.input_len())?;
    ensure_len(OP, "grad_input", grad_input.len(), geometry.input_len())?;
    ensure_len(OP, "weights", weights.len(), out_channels * patch)?;
    ensure_len(OP, "grad_weights", grad_weights.len(), out_channels * patch)?;
    ensure_len(OP, "grad_output", grad_output.len(), out_channels * rows)?;

    // dY as a [C_out, rows] matrix, matching the forward GEMM's output.
    let mut dy = memory_manager::acquire::<T>(out_channels * rows);
    for b in 0..geometry.batch {
        for oc in 0..out_channels {
            let src = &grad_output[(b * out_channels + oc) * per_image..][..per_image];
            dy[oc * rows + b * per_image..][..per_image].copy_from_slice(src);
        }
    }

    if let Some(grad_bias) = grad_bias {
        ensure_len(OP, "grad_bias", grad_bias.len(), out_channels)?;
        for (oc, gb) in grad_bias.iter_mut().take(out_channels).enumerate() {
            *gb = dy[oc * rows..(oc + 1) * rows]
                .iter()
                .fold(T::zero(), |acc, &v| acc.elem_add(v));
        }
    }

    let mut cols = memory_manager::acquire::<T>(rows * patch);
    im2col(&mut cols, input, geometry)?;
    gemm_nn(
        out_channels,
        patch,
        rows,
        T::one(),
        &dy,
        rows,
        &cols,
        patch,
        T::zero(),
        grad_weights,
        patch,
    )?;

    // Reuse the patch buffer for d(cols) = dYᵀ · W.
    gemm_tn(
        rows,
        patch,
        out_channels,
        T::one(),
        &dy,
        rows,
        weights,
        patch,
        T::zero(),
        &mut cols,
        patch,
    )?;
    col2im(grad_input, &cols, geometry)
}

/// Transposed convolution of `input` (described by `geometry`, whose
/// `channels` are the input channels) into
/// `output: [batch, out_channels, out_h, out_w]` with `out_h, out_w` from
/// [`Conv2dGeometry::transposed_dims`].
///
/// Each input pixel scatters `x · W[c_in, c_out]` over its output window.
pub fn conv2d_transposed<T: Element>(
    output: &mut [T],
    input: &[T],
    weights: &[T],
    bias: Option<&[T]>,
    geometry: &Conv2dGeometry,
    out_channels: usize,
) -> Result<(), KernelError> {
    const OP: &str = "conv2d_transposed";
    if geometry.is_empty() || out_channels == 0 {
        return Ok(());
    }
    let g = *geometry;
    let (out_h, out_w) = g.transposed_dims(OP)?;
    let kernel = g.kernel_h * g.kernel_w;
    let out_plane = out_h * out_w;
    let per_image = out_channels * out_plane;
    ensure_len(OP, "input", input.len(), g.input_len())?;
    ensure_len(OP, "weights", weights.len(), g.channels * out_channels * kernel)?;
    ensure_len(OP, "output", output.len(), g.batch * per_image)?;
    if let Some(bias) = bias {
        ensure_len(OP, "bias", bias.len(), out_channels)?;
    }

    let work = g.input_len() * out_channels * kernel;
    row_bands(
        &mut output[..g.batch * per_image],
        g.batch,
        per_image,
        work,
        |first, count, chunk| {
            for (i, image) in chunk.chunks_exact_mut(per_image).take(count).enumerate() {
                let b = first + i;
                for (oc, plane) in image.chunks_exact_mut(out_plane).enumerate() {
                    plane.fill(bias.map_or(T::zero(), |bias| bias[oc]));
                }
                for ic in 0..g.channels {
                    let src = &input[(b * g.channels + ic) * g.plane()..][..g.plane()];
                    for oc in 0..out_channels {
                        let w = &weights[(ic * out_channels + oc) * kernel..][..kernel];
                        let plane = &mut image[oc * out_plane..][..out_plane];
                        for ih in 0..g.height {
                            for iw in 0..g.width {
                                let v = src[ih * g.width + iw];
                                for kh in 0..g.kernel_h {
                                    let Some(oh) = Conv2dGeometry::source(ih, kh, g.stride_h, g.pad_h, out_h)
                                    else {
                                        continue;
                                    };
                                    for kw in 0..g.kernel_w {
                                        if let Some(ow) =
                                            Conv2dGeometry::source(iw, kw, g.stride_w, g.pad_w, out_w)
                                        {
                                            let o = &mut plane[oh * out_w + ow];
                                            *o = o.elem_add(v.elem_mul(w[kh * g.kernel_w + kw]));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        },
    );
    Ok(())
}
