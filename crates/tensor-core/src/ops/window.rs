// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution and pooling over NCHW tensors.

use kernels::window::{self, Conv2dGeometry};

use crate::storage::with_dtype;
use crate::tensor::check_destination;
use crate::{DType, Shape, Tensor, TensorError};

/// A pooling window: extent, stride and zero padding per spatial axis.
///
/// ```
/// use tensor_core::Window2d;
/// let w = Window2d::new(3, 3).stride(2, 2).padding(1, 1);
/// assert_eq!(w.kernel, [3, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window2d {
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    /// Average pooling divides by the full window area when set, and by
    /// the in-bounds cell count otherwise.
    pub count_include_pad: bool,
}

impl Window2d {
    /// A `kernel_h × kernel_w` window with stride equal to the window and
    /// no padding.
    pub fn new(kernel_h: usize, kernel_w: usize) -> Self {
        Self {
            kernel: [kernel_h, kernel_w],
            stride: [kernel_h, kernel_w],
            padding: [0, 0],
            count_include_pad: true,
        }
    }

    pub fn stride(mut self, stride_h: usize, stride_w: usize) -> Self {
        self.stride = [stride_h, stride_w];
        self
    }

    pub fn padding(mut self, pad_h: usize, pad_w: usize) -> Self {
        self.padding = [pad_h, pad_w];
        self
    }

    pub fn count_include_pad(mut self, include: bool) -> Self {
        self.count_include_pad = include;
        self
    }

    fn geometry(&self, [n, c, h, w]: [usize; 4]) -> Conv2dGeometry {
        Conv2dGeometry::new(n, c, h, w)
            .kernel(self.kernel[0], self.kernel[1])
            .stride(self.stride[0], self.stride[1])
            .padding(self.padding[0], self.padding[1])
    }
}

/// Gradients of a 2D convolution.
#[derive(Debug, Clone)]
pub struct Conv2dGrads {
    pub input: Tensor,
    pub weights: Tensor,
    /// Present when the forward pass had a bias.
    pub bias: Option<Tensor>,
}

fn nchw(op: &'static str, shape: &Shape) -> Result<[usize; 4], TensorError> {
    match *shape.dims() {
        [n, c, h, w] => Ok([n, c, h, w]),
        _ => Err(TensorError::BadDimensions {
            op,
            detail: format!("expected a rank-4 NCHW shape, got {shape}"),
        }),
    }
}

/// Geometry, output channels and output shape of a (transposed)
/// convolution. Weights are `[C_out, C_in, kh, kw]`, or
/// `[C_in, C_out, kh, kw]` when `transposed`.
fn conv_plan(
    op: &'static str,
    x: &Tensor,
    weights: &Tensor,
    stride: [usize; 2],
    padding: [usize; 2],
    transposed: bool,
) -> Result<(Conv2dGeometry, usize, Shape), TensorError> {
    let dims = nchw(op, x.shape())?;
    let [w0, w1, kh, kw] = nchw(op, weights.shape())?;
    let (c_in, c_out) = if transposed { (w0, w1) } else { (w1, w0) };
    if c_in != dims[1] {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: x.shape().clone(),
            rhs: weights.shape().clone(),
        });
    }
    if weights.dtype() != x.dtype() {
        return Err(TensorError::DTypeMismatch {
            op,
            expected: x.dtype(),
            actual: weights.dtype(),
        });
    }
    let g = Conv2dGeometry::new(dims[0], dims[1], dims[2], dims[3])
        .kernel(kh, kw)
        .stride(stride[0], stride[1])
        .padding(padding[0], padding[1]);
    let (oh, ow) = if transposed {
        g.transposed_dims(op)?
    } else {
        g.output_dims(op)?
    };
    Ok((g, c_out, Shape::new(vec![dims[0], c_out, oh, ow])))
}

fn pool_plan(op: &'static str, input: &Shape, window: &Window2d) -> Result<(Conv2dGeometry, Shape), TensorError> {
    let dims = nchw(op, input)?;
    let g = window.geometry(dims);
    let (oh, ow) = g.output_dims(op)?;
    Ok((g, Shape::new(vec![dims[0], dims[1], oh, ow])))
}

impl Tensor {
    /// 2D convolution of an NCHW input with `[C_out, C_in, kh, kw]`
    /// weights and an optional per-output-channel bias.
    pub fn conv_2d(
        &self,
        weights: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Tensor, TensorError> {
        let (_, _, shape) = conv_plan("conv_2d", self, weights, stride, padding, false)?;
        let mut out = Tensor::new(self.dtype(), shape)?;
        self.conv_2d_into(weights, bias, stride, padding, &mut out)?;
        Ok(out)
    }

    pub fn conv_2d_into<'o>(
        &self,
        weights: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "conv_2d";
        let (g, c_out, shape) = conv_plan(OP, self, weights, stride, padding, false)?;
        check_destination(OP, out, self.dtype(), &shape)?;
        tracing::trace!(op = OP, input = %self.shape(), output = %shape, "convolution");
        with_dtype!(self.dtype(), T => {
            let x = self.packed_for::<T>(OP, out)?;
            let wt = weights.packed_for::<T>(OP, out)?;
            let b = bias.map(|t| t.packed_for::<T>(OP, out)).transpose()?;
            let mut d = out.packed_out::<T>(OP)?;
            window::conv2d(&mut d[..], &x[..], &wt[..], b.as_deref(), &g, c_out)?;
            drop((x, wt, b));
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// Transposed 2D convolution with `[C_in, C_out, kh, kw]` weights. The
    /// output extent is `(H − 1)·S − 2P + K`.
    pub fn conv_2d_transposed(
        &self,
        weights: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
    ) -> Result<Tensor, TensorError> {
        let (_, _, shape) = conv_plan("conv_2d_transposed", self, weights, stride, padding, true)?;
        let mut out = Tensor::new(self.dtype(), shape)?;
        self.conv_2d_transposed_into(weights, bias, stride, padding, &mut out)?;
        Ok(out)
    }

    pub fn conv_2d_transposed_into<'o>(
        &self,
        weights: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "conv_2d_transposed";
        let (g, c_out, shape) = conv_plan(OP, self, weights, stride, padding, true)?;
        check_destination(OP, out, self.dtype(), &shape)?;
        with_dtype!(self.dtype(), T => {
            let x = self.packed_for::<T>(OP, out)?;
            let wt = weights.packed_for::<T>(OP, out)?;
            let b = bias.map(|t| t.packed_for::<T>(OP, out)).transpose()?;
            let mut d = out.packed_out::<T>(OP)?;
            window::conv2d_transposed(&mut d[..], &x[..], &wt[..], b.as_deref(), &g, c_out)?;
            drop((x, wt, b));
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// Backward pass of [`Tensor::conv_2d`]; `self` is the forward input.
    /// The bias gradient is computed when `with_bias` is set.
    pub fn conv_2d_backward(
        &self,
        weights: &Tensor,
        grad_output: &Tensor,
        stride: [usize; 2],
        padding: [usize; 2],
        with_bias: bool,
    ) -> Result<Conv2dGrads, TensorError> {
        const OP: &str = "conv_2d_backward";
        let (g, c_out, shape) = conv_plan(OP, self, weights, stride, padding, false)?;
        if *grad_output.shape() != shape {
            return Err(TensorError::ShapeMismatch {
                op: OP,
                lhs: shape,
                rhs: grad_output.shape().clone(),
            });
        }
        let input = self.alloc_like()?;
        let dw = weights.alloc_like()?;
        let bias = if with_bias {
            Some(Tensor::new(self.dtype(), Shape::vector(c_out))?)
        } else {
            None
        };
        with_dtype!(self.dtype(), T => {
            let x = self.packed::<T>(OP)?;
            let wt = weights.packed::<T>(OP)?;
            let dy = grad_output.packed::<T>(OP)?;
            let mut gx = input.write::<T>(OP)?;
            let mut gw = dw.write::<T>(OP)?;
            let mut gb = bias.as_ref().map(|t| t.write::<T>(OP)).transpose()?;
            window::conv2d_backward(
                &mut gx[..],
                &mut gw[..],
                gb.as_deref_mut().map(|b| &mut b[..]),
                &dy[..],
                &x[..],
                &wt[..],
                &g,
                c_out,
            )
            .map_err(TensorError::from)
        })?;
        Ok(Conv2dGrads {
            input,
            weights: dw,
            bias,
        })
    }

    /// 2D max pooling.
    pub fn max_pool_2d(&self, window: Window2d) -> Result<Tensor, TensorError> {
        let (_, shape) = pool_plan("max_pool_2d", self.shape(), &window)?;
        let mut out = Tensor::new(self.dtype(), shape)?;
        self.max_pool_2d_into(window, &mut out)?;
        Ok(out)
    }

    pub fn max_pool_2d_into<'o>(&self, window: Window2d, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        self.max_pool_2d_impl(window, out, None)?;
        Ok(out)
    }

    /// 2D max pooling that also returns, per output, the linear index into
    /// the input of the selected element (`-1` for windows entirely in
    /// padding), for [`Tensor::max_pool_2d_backward`].
    pub fn max_pool_2d_with_indices(&self, window: Window2d) -> Result<(Tensor, Tensor), TensorError> {
        let (_, shape) = pool_plan("max_pool_2d", self.shape(), &window)?;
        let out = Tensor::new(self.dtype(), shape.clone())?;
        let indices = Tensor::new(DType::I64, shape)?;
        self.max_pool_2d_impl(window, &out, Some(&indices))?;
        Ok((out, indices))
    }

    fn max_pool_2d_impl(&self, window: Window2d, out: &Tensor, indices: Option<&Tensor>) -> Result<(), TensorError> {
        const OP: &str = "max_pool_2d";
        let (g, shape) = pool_plan(OP, self.shape(), &window)?;
        check_destination(OP, out, self.dtype(), &shape)?;
        with_dtype!(self.dtype(), T => {
            let x = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            let mut idx = indices.map(|t| t.write::<i64>(OP)).transpose()?;
            window::max_pool_2d(&mut d[..], idx.as_deref_mut().map(|i| &mut i[..]), &x[..], &g)?;
            drop(x);
            out.commit(d, OP)
        })
    }

    /// Routes `self` (the gradient of a max-pool output) back to the
    /// positions recorded in `indices`. The result has `input_shape`.
    pub fn max_pool_2d_backward(
        &self,
        indices: &Tensor,
        input_shape: &Shape,
        window: Window2d,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "max_pool_2d_backward";
        let (g, shape) = pool_plan(OP, input_shape, &window)?;
        check_destination(OP, self, self.dtype(), &shape)?;
        check_destination(OP, indices, DType::I64, &shape)?;
        let grad_input = Tensor::new(self.dtype(), input_shape.clone())?;
        with_dtype!(self.dtype(), T => {
            let dy = self.packed::<T>(OP)?;
            let idx = indices.packed::<i64>(OP)?;
            let mut dx = grad_input.write::<T>(OP)?;
            window::max_pool_2d_backward(&mut dx[..], &dy[..], &idx[..], &g).map_err(TensorError::from)
        })?;
        Ok(grad_input)
    }

    /// 2D average pooling; see [`Window2d::count_include_pad`] for the
    /// denominator.
    pub fn avg_pool_2d(&self, window: Window2d) -> Result<Tensor, TensorError> {
        let (_, shape) = pool_plan("avg_pool_2d", self.shape(), &window)?;
        let mut out = Tensor::new(self.dtype(), shape)?;
        self.avg_pool_2d_into(window, &mut out)?;
        Ok(out)
    }

    pub fn avg_pool_2d_into<'o>(&self, window: Window2d, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "avg_pool_2d";
        let (g, shape) = pool_plan(OP, self.shape(), &window)?;
        check_destination(OP, out, self.dtype(), &shape)?;
        with_dtype!(self.dtype(), T => {
            let x = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            window::avg_pool_2d(&mut d[..], &x[..], &g, window.count_include_pad)?;
            drop(x);
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// Spreads `self` (the gradient of an average-pool output) evenly over
    /// each window. The result has `input_shape`.
    pub fn avg_pool_2d_backward(&self, input_shape: &Shape, window: Window2d) -> Result<Tensor, TensorError> {
        const OP: &str = "avg_pool_2d_backward";
        let (g, shape) = pool_plan(OP, input_shape, &window)?;
        check_destination(OP, self, self.dtype(), &shape)?;
        let grad_input = Tensor::new(self.dtype(), input_shape.clone())?;
        with_dtype!(self.dtype(), T => {
            let dy = self.packed::<T>(OP)?;
            let mut dx = grad_input.write::<T>(OP)?;
            window::avg_pool_2d_backward(&mut dx[..], &dy[..], &g, window.count_include_pad)
                .map_err(TensorError::from)
        })?;
        Ok(grad_input)
    }

    /// Mean over each `H × W` plane, giving `[N, C, 1, 1]`.
    pub fn global_avg_pool_2d(&self) -> Result<Tensor, TensorError> {
        let [n, c, _, _] = nchw("global_avg_pool_2d", self.shape())?;
        let mut out = Tensor::new(self.dtype(), [n, c, 1, 1])?;
        self.global_avg_pool_2d_into(&mut out)?;
        Ok(out)
    }

    pub fn global_avg_pool_2d_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "global_avg_pool_2d";
        let [n, c, h, w] = nchw(OP, self.shape())?;
        check_destination(OP, out, self.dtype(), &Shape::new(vec![n, c, 1, 1]))?;
        with_dtype!(self.dtype(), T => {
            let x = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            window::global_avg_pool_2d(&mut d[..], &x[..], n, c, h, w)?;
            drop(x);
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    pub fn global_avg_pool_2d_backward(&self, input_shape: &Shape) -> Result<Tensor, TensorError> {
        const OP: &str = "global_avg_pool_2d_backward";
        let [n, c, h, w] = nchw(OP, input_shape)?;
        check_destination(OP, self, self.dtype(), &Shape::new(vec![n, c, 1, 1]))?;
        let grad_input = Tensor::new(self.dtype(), input_shape.clone())?;
        with_dtype!(self.dtype(), T => {
            let dy = self.packed::<T>(OP)?;
            let mut dx = grad_input.write::<T>(OP)?;
            window::global_avg_pool_2d_backward(&mut dx[..], &dy[..], n, c, h, w).map_err(TensorError::from)
        })?;
        Ok(grad_input)
    }
}
