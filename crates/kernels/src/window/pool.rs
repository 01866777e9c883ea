// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2D max and average pooling with their backward passes.
//!
//! Windows follow the convolution convention of [`Conv2dGeometry`]; the
//! kernel extents are the pooling window. Every output plane depends on a
//! single input plane, so planes are the unit of parallel work.

use super::Conv2dGeometry;
use crate::blas::row_bands;
use crate::element::Element;
use crate::error::{ensure_len, KernelError};

/// Index recorded for a max-pool window that lies entirely in padding.
pub const NO_ARGMAX: i64 = -1;

/// Max pooling of `input` into `output: [batch, channels, out_h, out_w]`.
///
/// When `indices` is given it receives, per output, the linear index into
/// `input` of the selected element. Ties keep the first element in window
/// order. A window with no in-bounds element yields [`Element::lowest`] and
/// index [`NO_ARGMAX`].
pub fn max_pool_2d<T: Element>(
    output: &mut [T],
    indices: Option<&mut [i64]>,
    input: &[T],
    geometry: &Conv2dGeometry,
) -> Result<(), KernelError> {
    const OP: &str = "max_pool_2d";
    if geometry.is_empty() {
        return Ok(());
    }
    let g = *geometry;
    let (out_h, out_w) = g.output_dims(OP)?;
    let out_plane = out_h * out_w;
    let planes = g.batch * g.channels;
    ensure_len(OP, "input", input.len(), g.input_len())?;
    ensure_len(OP, "output", output.len(), planes * out_plane)?;

    let mut scratch;
    let indices = match indices {
        Some(idx) => {
            ensure_len(OP, "indices", idx.len(), planes * out_plane)?;
            idx
        }
        None => {
            scratch = memory_manager::acquire::<i64>(planes * out_plane);
            &mut scratch[..]
        }
    };

    let kernel = |first: usize, out: &mut [T], idx: &mut [i64]| {
        let planes_here = out.len() / out_plane;
        for p in 0..planes_here {
            let base = (first + p) * g.plane();
            let src = &input[base..base + g.plane()];
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut best: Option<(T, usize)> = None;
                    for ki in 0..g.kernel_h {
                        let Some(h) = Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height)
                        else {
                            continue;
                        };
                        for kj in 0..g.kernel_w {
                            if let Some(w) = Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width) {
                                let at = h * g.width + w;
                                let v = src[at];
                                if best.map_or(true, |(b, _)| v > b) {
                                    best = Some((v, at));
                                }
                            }
                        }
                    }
                    let o = p * out_plane + y * out_w + x;
                    (out[o], idx[o]) = match best {
                        Some((v, at)) => (v, (base + at) as i64),
                        None => (T::lowest(), NO_ARGMAX),
                    };
                }
            }
        }
    };

    let out = &mut output[..planes * out_plane];
    let idx = &mut indices[..planes * out_plane];
    if planes > 1 && scheduler::should_parallelize(g.input_len()) {
        scheduler::for_each_chunk_mut2(out, out_plane, idx, out_plane, kernel);
    } else {
        kernel(0, out, idx);
    }
    Ok(())
}

/// Routes each `grad_output` value to the input element recorded in
/// `indices` by [`max_pool_2d`]. `grad_input` is overwritten; entries equal
/// to [`NO_ARGMAX`] are skipped.
pub fn max_pool_2d_backward<T: Element>(
    grad_input: &mut [T],
    grad_output: &[T],
    indices: &[i64],
    geometry: &Conv2dGeometry,
) -> Result<(), KernelError> {
    const OP: &str = "max_pool_2d_backward";
    if geometry.is_empty() {
        return Ok(());
    }
    let g = *geometry;
    let (out_h, out_w) = g.output_dims(OP)?;
    let out_plane = out_h * out_w;
    let planes = g.batch * g.channels;
    let plane_len = g.plane();
    ensure_len(OP, "grad_input", grad_input.len(), g.input_len())?;
    ensure_len(OP, "grad_output", grad_output.len(), planes * out_plane)?;
    ensure_len(OP, "indices", indices.len(), planes * out_plane)?;
    for (o, &i) in indices[..planes * out_plane].iter().enumerate() {
        let plane = (o / out_plane) as i64;
        let lo = plane * plane_len as i64;
        if i != NO_ARGMAX && !(lo..lo + plane_len as i64).contains(&i) {
            return Err(KernelError::dims(
                OP,
                format!("index {i} at output {o} lies outside its input plane"),
            ));
        }
    }

    row_bands(
        &mut grad_input[..planes * plane_len],
        planes,
        plane_len,
        planes * out_plane,
        |first, count, chunk| {
            chunk.fill(T::zero());
            for p in 0..count {
                let base = (first + p) * plane_len;
                let outs = (first + p) * out_plane..(first + p + 1) * out_plane;
                for (&gy, &i) in grad_output[outs.clone()].iter().zip(&indices[outs]) {
                    if i == NO_ARGMAX {
                        continue;
                    }
                    let dst = &mut chunk[p * plane_len + (i as usize - base)];
                    *dst = dst.elem_add(gy);
                }
            }
        },
    );
    Ok(())
}

/// Denominator of one average-pool window.
#[inline]
fn window_count(g: &Conv2dGeometry, y: usize, x: usize, count_include_pad: bool) -> usize {
    if count_include_pad {
        return g.kernel_h * g.kernel_w;
    }
    let rows = (0..g.kernel_h)
        .filter(|&ki| Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height).is_some())
        .count();
    let cols = (0..g.kernel_w)
        .filter(|&kj| Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width).is_some())
        .count();
    rows * cols
}

/// Average pooling of `input` into `output: [batch, channels, out_h, out_w]`.
///
/// With `count_include_pad` the denominator is the full window area;
/// otherwise only in-bounds cells are counted, and a window with none of
/// them yields zero.
pub fn avg_pool_2d<T: Element>(
    output: &mut [T],
    input: &[T],
    geometry: &Conv2dGeometry,
    count_include_pad: bool,
) -> Result<(), KernelError> {
    const OP: &str = "avg_pool_2d";
    if geometry.is_empty() {
        return Ok(());
    }
    let g = *geometry;
    let (out_h, out_w) = g.output_dims(OP)?;
    let out_plane = out_h * out_w;
    let planes = g.batch * g.channels;
    ensure_len(OP, "input", input.len(), g.input_len())?;
    ensure_len(OP, "output", output.len(), planes * out_plane)?;

    row_bands(
        &mut output[..planes * out_plane],
        planes,
        out_plane,
        g.input_len(),
        |first, count, chunk| {
            for (p, out) in chunk.chunks_exact_mut(out_plane).take(count).enumerate() {
                let src = &input[(first + p) * g.plane()..][..g.plane()];
                for y in 0..out_h {
                    for x in 0..out_w {
                        let mut sum = T::zero();
                        for ki in 0..g.kernel_h {
                            let Some(h) = Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height)
                            else {
                                continue;
                            };
                            for kj in 0..g.kernel_w {
                                if let Some(w) = Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width) {
                                    sum = sum.elem_add(src[h * g.width + w]);
                                }
                            }
                        }
                        let n = window_count(&g, y, x, count_include_pad);
                        out[y * out_w + x] = if n == 0 {
                            T::zero()
                        } else {
                            sum.elem_div(T::of_f64(n as f64))
                        };
                    }
                }
            }
        },
    );
    Ok(())
}

/// Spreads each `grad_output` value evenly over the in-bounds cells of its
/// window, using the same denominator as the forward pass. `grad_input` is
/// overwritten.
pub fn avg_pool_2d_backward<T: Element>(
    grad_input: &mut [T],
    grad_output: &[T],
    geometry: &Conv2dGeometry,
    count_include_pad: bool,
) -> Result<(), KernelError> {
    const OP: &str = "avg_pool_2d_backward";
    if geometry.is_empty() {
        return Ok(());
    }
    let g = *geometry;
    let (out_h, out_w) = g.output_dims(OP)?;
    let out_plane = out_h * out_w;
    let planes = g.batch * g.channels;
    let plane_len = g.plane();
    ensure_len(OP, "grad_input", grad_input.len(), g.input_len())?;
    ensure_len(OP, "grad_output", grad_output.len(), planes * out_plane)?;

    row_bands(
        &mut grad_input[..planes * plane_len],
        planes,
        plane_len,
        g.input_len(),
        |first, count, chunk| {
            chunk.fill(T::zero());
            for (p, dx) in chunk.chunks_exact_mut(plane_len).take(count).enumerate() {
                let dy = &grad_output[(first + p) * out_plane..][..out_plane];
                for y in 0..out_h {
                    for x in 0..out_w {
                        let n = window_count(&g, y, x, count_include_pad);
                        if n == 0 {
                            continue;
                        }
                        let share = dy[y * out_w + x].elem_div(T::of_f64(n as f64));
                        for ki in 0..g.kernel_h {
                            let Some(h) = Conv2dGeometry::source(y, ki, g.stride_h, g.pad_h, g.height)
                            else {
                                continue;
                            };
                            for kj in 0..g.kernel_w {
                                if let Some(w) = Conv2dGeometry::source(x, kj, g.stride_w, g.pad_w, g.width) {
                                    let cell = &mut dx[h * g.width + w];
                                    *cell = cell.elem_add(share);
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

/// Mean over each `height × width` plane: `output` is `[batch, channels]`.
pub fn global_avg_pool_2d<T: Element>(
    output: &mut [T],
    input: &[T],
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Result<(), KernelError> {
    const OP: &str = "global_avg_pool_2d";
    let planes = batch * channels;
    let plane_len = height * width;
    if planes == 0 || plane_len == 0 {
        return Ok(());
    }
    ensure_len(OP, "input", input.len(), planes * plane_len)?;
    ensure_len(OP, "output", output.len(), planes)?;
    let area = T::of_f64(plane_len as f64);
    row_bands(&mut output[..planes], planes, 1, planes * plane_len, |first, count, chunk| {
        for (p, o) in chunk.iter_mut().take(count).enumerate() {
            let src = &input[(first + p) * plane_len..][..plane_len];
            *o = src.iter().fold(T::zero(), |acc, &v| acc.elem_add(v)).elem_div(area);
        }
    });
    Ok(())
}

/// Backward pass of [`global_avg_pool_2d`]: every cell of plane `p` gets
/// `grad_output[p] / (height·width)`.
pub fn global_avg_pool_2d_backward<T: Element>(
    grad_input: &mut [T],
    grad_output: &[T],
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Result<(), KernelError> {
    const OP: &str = "global_avg_pool_2d_backward";
    let planes = batch * channels;
    let plane_len = height * width;
    if planes == 0 || plane_len == 0 {
        return Ok(());
    }
    ensure_len(OP, "grad_input", grad_input.len(), planes * plane_len)?;
    ensure_len(OP, "grad_output", grad_output.len(), planes)?;
    let area = T::of_f64(plane_len as f64);
    row_bands(
        &mut grad_input[..planes * plane_len],
        planes,
        plane_len,
        planes * plane_len,
        |first, count, chunk| {
            for (p, dx) in chunk.chunks_exact_mut(plane_len).take(count).enumerate() {
                dx.fill(grad_output[first + p].elem_div(area));
            }
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pool_backward_routes_to_argmax() {
        let input = [1.0f32, 5.0, 3.0, 2.0];
        let g = Conv2dGeometry::new(1, 1, 2, 2).kernel(2, 2).stride(2, 2);
        let mut out = [0.0f32; 1];
        let mut idx = [0i64; 1];
        max_pool_2d(&mut out, Some(&mut idx[..]), &input, &g).unwrap();
        assert_eq!(out, [5.0]);
        assert_eq!(idx, [1]);

        let mut dx = [7.0f32; 4];
        max_pool_2d_backward(&mut dx, &[0.25], &idx, &g).unwrap();
        assert_eq!(dx, [0.0, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_max_pool_ties_keep_first_and_indices_are_global() {
        // Two planes; plane 1 is constant so the first window cell wins.
        let input = [0.0f64, 1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0];
        let g = Conv2dGeometry::new(1, 2, 2, 2).kernel(2, 2);
        let mut out = [0.0f64; 2];
        let mut idx = [0i64; 2];
        max_pool_2d(&mut out, Some(&mut idx[..]), &input, &g).unwrap();
        assert_eq!(out, [3.0, 4.0]);
        assert_eq!(idx, [3, 4]);
    }

    #[test]
    fn test_max_pool_all_padding_window() {
        // Padding 2 with a 2x2 window: the corner windows see only padding.
        let g = Conv2dGeometry::new(1, 1, 1, 1).kernel(2, 2).stride(2, 2).padding(2, 2);
        let (oh, ow) = g.output_dims("t").unwrap();
        assert_eq!((oh, ow), (2, 2));
        let mut out = vec![0.0f32; 4];
        let mut idx = vec![0i64; 4];
        max_pool_2d(&mut out, Some(&mut idx[..]), &[3.0], &g).unwrap();
        assert_eq!(out[0], f32::NEG_INFINITY);
        assert_eq!(idx[..3], [NO_ARGMAX; 3]);
        assert_eq!(out[3], 3.0);
        assert_eq!(idx[3], 0);

        let mut dx = [1.0f32];
        max_pool_2d_backward(&mut dx, &[1.0; 4], &idx, &g).unwrap();
        assert_eq!(dx, [1.0]);
    }

    #[test]
    fn test_max_pool_integer_minimum_is_selected() {
        let g = Conv2dGeometry::new(1, 1, 1, 2).kernel(1, 2);
        let mut out = [0i8];
        let mut idx = [9i64];
        max_pool_2d(&mut out, Some(&mut idx[..]), &[i8::MIN, i8::MIN], &g).unwrap();
        assert_eq!((out[0], idx[0]), (i8::MIN, 0));
    }

    #[test]
    fn test_max_pool_backward_rejects_foreign_index() {
        let g = Conv2dGeometry::new(1, 2, 2, 2).kernel(2, 2);
        let mut dx = [0.0f32; 8];
        assert!(matches!(
            max_pool_2d_backward(&mut dx, &[1.0, 1.0], &[0, 1], &g),
            Err(KernelError::BadDimensions { .. })
        ));
    }

    #[test]
    fn test_avg_pool_padding_modes() {
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let g = Conv2dGeometry::new(1, 1, 2, 2).kernel(2, 2).padding(1, 1);
        let mut with_pad = vec![0.0f32; 9];
        avg_pool_2d(&mut with_pad, &input, &g, true).unwrap();
        assert_eq!(with_pad[0], 0.25);
        assert_eq!(with_pad[4], 2.5);

        let mut without_pad = vec![0.0f32; 9];
        avg_pool_2d(&mut without_pad, &input, &g, false).unwrap();
        assert_eq!(without_pad[0], 1.0);
        assert_eq!(without_pad[1], 1.5);
        assert_eq!(without_pad[4], 2.5);
    }

    #[test]
    fn test_avg_pool_backward_spreads_evenly() {
        let g = Conv2dGeometry::new(1, 1, 2, 4).kernel(2, 2).stride(2, 2);
        let mut dx = vec![0.0f64; 8];
        avg_pool_2d_backward(&mut dx, &[4.0, 8.0], &g, true).unwrap();
        assert_eq!(dx, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_global_avg_pool() {
        let input: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let mut out = [0.0f32; 3];
        global_avg_pool_2d(&mut out, &input, 1, 3, 2, 2).unwrap();
        assert_eq!(out, [1.5, 5.5, 9.5]);

        let mut dx = [0.0f32; 12];
        global_avg_pool_2d_backward(&mut dx, &[4.0, 8.0, 0.0], 1, 3, 2, 2).unwrap();
        assert_eq!(&dx[..4], &[1.0; 4]);
        assert_eq!(&dx[4..8], &[2.0; 4]);
    }

    #[test]
    fn test_pool_without_indices_uses_scratch() {
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let g = Conv2dGeometry::new(1, 1, 4, 4).kernel(2, 2).stride(2, 2);
        let mut out = [0.0f32; 4];
        max_pool_2d(&mut out, None, &input, &g).unwrap();
        assert_eq!(out, [5.0, 7.0, 13.0, 15.0]);
    }
}
