// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sliding-window kernels over NCHW images: `im2col`/`col2im`, GEMM-backed
//! 2D convolution and its transposed form, and 2D pooling.
//!
//! Every kernel here takes a [`Conv2dGeometry`] describing the input image
//! and the window. Output extents follow `⌊(H + 2P − K)/S⌋ + 1`; padding is
//! explicit zero padding (or the zero point for Q8 data). Work is split
//! across the worker pool by image plane or by im2col row.

pub mod conv;
pub mod im2col;
pub mod pool;

pub use conv::{conv2d, conv2d_backward, conv2d_transposed};
pub use im2col::{col2im, col2im_q8, im2col, im2col_q8};
pub use pool::{
    avg_pool_2d, avg_pool_2d_backward, global_avg_pool_2d, global_avg_pool_2d_backward,
    max_pool_2d, max_pool_2d_backward,
};

use crate::error::KernelError;

/// Image and window extents for a 2D window kernel.
///
/// The input is `[batch, channels, height, width]` in packed row-major
/// order. Build one with [`Conv2dGeometry::new`] and the `kernel`,
/// `stride` and `padding` setters:
///
/// ```
/// use kernels::window::Conv2dGeometry;
/// let g = Conv2dGeometry::new(1, 3, 32, 32).kernel(3, 3).padding(1, 1);
/// assert_eq!(g.output_dims("doc").unwrap(), (32, 32));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
}

impl Conv2dGeometry {
    /// A 1×1 window with unit stride and no padding.
    pub fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
            kernel_h: 1,
            kernel_w: 1,
            stride_h: 1,
            stride_w: 1,
            pad_h: 0,
            pad_w: 0,
        }
    }

    pub fn kernel(mut self, kernel_h: usize, kernel_w: usize) -> Self {
        self.kernel_h = kernel_h;
        self.kernel_w = kernel_w;
        self
    }

    pub fn stride(mut self, stride_h: usize, stride_w: usize) -> Self {
        self.stride_h = stride_h;
        self.stride_w = stride_w;
        self
    }

    pub fn padding(mut self, pad_h: usize, pad_w: usize) -> Self {
        self.pad_h = pad_h;
        self.pad_w = pad_w;
        self
    }

    /// `true` when the input holds no elements.
    pub fn is_empty(&self) -> bool {
        self.input_len() == 0
    }

    /// Elements in the input image batch.
    pub fn input_len(&self) -> usize {
        self.batch * self.channels * self.plane()
    }

    /// Elements in one input plane (`height × width`).
    pub fn plane(&self) -> usize {
        self.height * self.width
    }

    /// Length of one im2col row: `channels × kernel_h × kernel_w`.
    pub fn patch_len(&self) -> usize {
        self.channels * self.kernel_h * self.kernel_w
    }

    fn check_window(&self, op: &'static str) -> Result<(), KernelError> {
        if self.kernel_h == 0 || self.kernel_w == 0 {
            return Err(KernelError::dims(
                op,
                format!("kernel must be positive, got {}x{}", self.kernel_h, self.kernel_w),
            ));
        }
        if self.stride_h == 0 || self.stride_w == 0 {
            return Err(KernelError::dims(
                op,
                format!("stride must be positive, got {}x{}", self.stride_h, self.stride_w),
            ));
        }
        Ok(())
    }

    /// Output `(height, width)` of a convolution or pooling window.
    ///
    /// Fails with `BadDimensions` for a zero kernel or stride, or when the
    /// padded image is smaller than the kernel.
    pub fn output_dims(&self, op: &'static str) -> Result<(usize, usize), KernelError> {
        self.check_window(op)?;
        let padded_h = self.height + 2 * self.pad_h;
        let padded_w = self.width + 2 * self.pad_w;
        if padded_h < self.kernel_h || padded_w < self.kernel_w {
            return Err(KernelError::dims(
                op,
                format!(
                    "kernel {}x{} does not fit the padded {padded_h}x{padded_w} input",
                    self.kernel_h, self.kernel_w
                ),
            ));
        }
        Ok((
            (padded_h - self.kernel_h) / self.stride_h + 1,
            (padded_w - self.kernel_w) / self.stride_w + 1,
        ))
    }

    /// Output `(height, width)` of a transposed convolution:
    /// `(H − 1)·S − 2P + K`.
    pub fn transposed_dims(&self, op: &'static str) -> Result<(usize, usize), KernelError> {
        self.check_window(op)?;
        let full_h = self.height.saturating_sub(1) * self.stride_h + self.kernel_h;
        let full_w = self.width.saturating_sub(1) * self.stride_w + self.kernel_w;
        if full_h <= 2 * self.pad_h || full_w <= 2 * self.pad_w {
            return Err(KernelError::dims(
                op,
                format!("padding {}x{} removes the whole output", self.pad_h, self.pad_w),
            ));
        }
        Ok((full_h - 2 * self.pad_h, full_w - 2 * self.pad_w))
    }

    /// Input row or column under window offset `k` of output position `o`,
    /// or `None` when it falls in the padding.
    #[inline]
    pub(crate) fn source(o: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
        (o * stride + k).checked_sub(pad).filter(|&i| i < extent)
    }
}
