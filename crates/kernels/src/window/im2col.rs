// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Patch extraction (`im2col`) and its accumulating inverse (`col2im`).
//!
//! The column buffer is a row-major `[batch·out_h·out_w, channels·k_h·k_w]`
//! matrix: row `(b, y, x)` holds the receptive field of output position
//! `(y, x)` in image `b`, ordered by channel, then kernel row, then kernel
//! column. This matches the `[C_out, C_in, k_h, k_w]` weight layout, so a
//! convolution becomes a single `W · colsᵀ`.

use super::Conv2dGeometry;
use crate::blas::row_bands;
use crate::element::Element;
use crate::error::{ensure_len, KernelError};

/// Extracts patches of `im` into `col`, writing zero for padded cells.
pub fn im2col<T: Element>(
    col: &mut [T],
    im: &[T],
    geometry: &Conv2dGeometry,
) -> Result<(), KernelError> {
    im2col_padded("im2col", col, im, geometry, T::zero())
}

/// [`im2col`] over quantised codes. Padded cells take `zero_point`, so they
/// dequantise to exactly zero.
pub fn im2col_q8(
    col: &mut [u8],
    im: &[u8],
    geometry: &Conv2dGeometry,
    zero_point: u8,
) -> Result<(), KernelError> {
    im2col_padded("im2col_q8", col, im, geometry, zero_point)
}

/// Scatters `col` back into `im`, summing every contribution that lands on
/// the same pixel. `im` is zeroed first.
pub fn col2im<T: Element>(
    im: &mut [T],
    col: &[T],
    geometry: &Conv2dGeometry,
) -> Result<(), KernelError> {
    col2im_with("col2im", im, col, geometry, T::elem_add)
}

/// [`col2im`] over quantised codes; the sums saturate at 255.
pub fn col2im_q8(im: &mut [u8], col: &[u8], geometry: &Conv2dGeometry) -> Result<(), KernelError> {
    col2im_with("col2im_q8", im, col, geometry, u8::saturating_add)
}

/// Checks buffer lengths and returns `(out_h, out_w, rows)`.
fn check_buffers(
    op: &'static str,
    geometry: &Conv2dGeometry,
    im_len: usize,
    col_len: usize,
) -> Result<(usize, usize, usize), KernelError> {
    let (out_h, out_w) = geometry.output_dims(op)?;
    let rows = geometry.batch * out_h * out_w;
    ensure_len(op, "image", im_len, geometry.input_len())?;
    ensure_len(op, "columns", col_len, rows * geometry.patch_len())?;
    Ok((out_h, out_w, rows))
}

fn im2col_padded<T: Element>(
    op: &'static str,
    col: &mut [T],
    im: &[T],
    g: &Conv2dGeometry,
    pad: T,
) -> Result<(), KernelError> {
    if g.is_empty() {
        return Ok(());
    }
    let (out_h, out_w, rows) = check_buffers(op, g, im.len(), col.len())?;
    let patch = g.patch_len();
    if rows == 0 || patch == 0 {
        return Ok(());
    }
    let per_image = out_h * out_w;
    let region = &mut col[..rows * patch];
    row_bands(region, rows, patch, rows * patch, |first, count, chunk| {
        for (r, row) in chunk.chunks_exact_mut(patch).take(count).enumerate() {
            let global = first + r;
            let b = global / per_image;
            let y = (global % per_image) / out_w;
            let x = global % out_w;
            let mut cells = row.iter_mut();
            for c in 0..g.channels {
                let plane = &im[(b * g.channels + c) * g.plane()..][..g.plane()];
                for ki in 0..g.kernel_h {
                    let src_row = Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height);
                    for kj in 0..g.kernel_w {
                        let src_col = Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width);
                        if let Some(cell) = cells.next() {
                            *cell = match (src_row, src_col) {
                                (Some(h), Some(w)) => plane[h * g.width + w],
                                _ => pad,
                            };
                        }
                    }
                }
            }
        }
    });
    Ok(())
}

fn col2im_with<T, F>(
    op: &'static str,
    im: &mut [T],
    col: &[T],
    g: &Conv2dGeometry,
    combine: F,
) -> Result<(), KernelError>
where
    T: Element,
    F: Fn(T, T) -> T + Sync,
{
    if g.is_empty() {
        return Ok(());
    }
    let (out_h, out_w, rows) = check_buffers(op, g, im.len(), col.len())?;
    let patch = g.patch_len();
    let plane_len = g.plane();
    let planes = g.batch * g.channels;
    let region = &mut im[..planes * plane_len];
    row_bands(region, planes, plane_len, rows * patch, |first, count, chunk| {
        chunk.fill(T::zero());
        for (p, plane) in chunk.chunks_exact_mut(plane_len).take(count).enumerate() {
            let b = (first + p) / g.channels;
            let c = (first + p) % g.channels;
            for y in 0..out_h {
                for x in 0..out_w {
                    let row = ((b * out_h + y) * out_w + x) * patch;
                    let cells = &col[row + c * g.kernel_h * g.kernel_w..];
                    for ki in 0..g.kernel_h {
                        let Some(h) = Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height)
                        else {
                            continue;
                        };
                        for kj in 0..g.kernel_w {
                            if let Some(w) = Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width) {
                                let dst = &mut plane[h * g.width + w];
                                *dst = combine(*dst, cells[ki * g.kernel_w + kj]);
                            }
                        }
                    }
                }
            }
        }
    });
    Ok(())
}
