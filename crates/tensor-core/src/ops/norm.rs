// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Normalisation layers.
//!
//! Forward passes take optional `γ`/`β` tensors; backward passes take the
//! layer's [`Parameter`]s and add `dγ`/`dβ` to their gradients, returning
//! the input gradient. All of them are F32/F64 only.

use kernels::norm::{self, NormGrads};
use kernels::{Element, KernelError, Real};

use crate::storage::{with_float_dtype, TensorElement};
use crate::tensor::{check_destination, check_operands};
use crate::{Parameter, Tensor, TensorError};

type Params<'a, T> = (Option<&'a [T]>, Option<&'a [T]>);

fn norm_into<T, F>(
    op: &'static str,
    x: &Tensor,
    gamma: Option<&Tensor>,
    beta: Option<&Tensor>,
    out: &Tensor,
    kernel: F,
) -> Result<(), TensorError>
where
    T: TensorElement + Real,
    F: FnOnce(&mut [T], &[T], Params<'_, T>) -> Result<(), KernelError>,
{
    check_destination(op, out, x.dtype(), x.shape())?;
    tracing::trace!(op, shape = %x.shape(), "normalise");
    let xs = x.packed_for::<T>(op, out)?;
    let g = gamma.map(|t| t.packed_for::<T>(op, out)).transpose()?;
    let b = beta.map(|t| t.packed_for::<T>(op, out)).transpose()?;
    let mut d = out.packed_out::<T>(op)?;
    kernel(&mut d[..], &xs[..], (g.as_deref(), b.as_deref()))?;
    drop((xs, g, b));
    out.commit(d, op)
}

fn norm_backward<T, F>(
    op: &'static str,
    x: &Tensor,
    grad_output: &Tensor,
    gamma: Option<&mut Parameter>,
    beta: Option<&mut Parameter>,
    kernel: F,
) -> Result<Tensor, TensorError>
where
    T: TensorElement + Real,
    F: FnOnce(NormGrads<'_, T>, &[T], &[T], Option<&[T]>) -> Result<(), KernelError>,
{
    check_operands(op, x, grad_output)?;
    let dx = x.alloc_like()?;
    let dgamma = gamma.as_ref().map(|p| p.value().alloc_like()).transpose()?;
    let dbeta = beta.as_ref().map(|p| p.value().alloc_like()).transpose()?;
    {
        let xs = x.packed::<T>(op)?;
        let dys = grad_output.packed::<T>(op)?;
        let gv = gamma.as_ref().map(|p| p.value().packed::<T>(op)).transpose()?;
        let mut gdx = dx.write::<T>(op)?;
        let mut gdg = dgamma.as_ref().map(|t| t.write::<T>(op)).transpose()?;
        let mut gdb = dbeta.as_ref().map(|t| t.write::<T>(op)).transpose()?;
        let grads = NormGrads {
            input: &mut gdx[..],
            gamma: gdg.as_deref_mut().map(|g| &mut g[..]),
            beta: gdb.as_deref_mut().map(|g| &mut g[..]),
        };
        kernel(grads, &dys[..], &xs[..], gv.as_deref())?;
    }
    if let (Some(p), Some(d)) = (gamma, dgamma) {
        p.accumulate_grad(&d)?;
    }
    if let (Some(p), Some(d)) = (beta, dbeta) {
        p.accumulate_grad(&d)?;
    }
    Ok(dx)
}

fn require_nchw(op: &'static str, x: &Tensor) -> Result<[usize; 4], TensorError> {
    match *x.dims() {
        [b, c, h, w] => Ok([b, c, h, w]),
        _ => Err(TensorError::BadDimensions {
            op,
            detail: format!("expected an NCHW tensor, got shape {}", x.shape()),
        }),
    }
}

impl Tensor {
    /// Batch normalisation over axis 0 with per-feature `γ`/`β`.
    pub fn batch_norm(&self, gamma: Option<&Tensor>, beta: Option<&Tensor>, eps: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.batch_norm_into(gamma, beta, eps, &mut out)?;
        Ok(out)
    }

    pub fn batch_norm_into<'o>(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        eps: f64,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "batch_norm";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, gamma, beta, out, |d, x, (g, b)| {
                norm::batch_norm(d, x, g, b, self.dims(), T::of_f64(eps))
            })
        })?;
        Ok(out)
    }

    /// Layer normalisation over the last axis.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let x = Tensor::from_slice(Shape::matrix(1, 2), &[1.0f64, 3.0]).unwrap();
    /// let y = x.layer_norm(None, None, 0.0).unwrap();
    /// assert_eq!(y.to_vec::<f64>().unwrap(), vec![-1.0, 1.0]);
    /// ```
    pub fn layer_norm(&self, gamma: Option<&Tensor>, beta: Option<&Tensor>, eps: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.layer_norm_into(gamma, beta, eps, &mut out)?;
        Ok(out)
    }

    pub fn layer_norm_into<'o>(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        eps: f64,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "layer_norm";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, gamma, beta, out, |d, x, (g, b)| {
                norm::layer_norm(d, x, g, b, self.dims(), T::of_f64(eps))
            })
        })?;
        Ok(out)
    }

    /// RMS normalisation over the last axis (no centring, no `β`).
    pub fn rms_norm(&self, gamma: Option<&Tensor>, eps: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.rms_norm_into(gamma, eps, &mut out)?;
        Ok(out)
    }

    pub fn rms_norm_into<'o>(
        &self,
        gamma: Option<&Tensor>,
        eps: f64,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "rms_norm";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, gamma, None, out, |d, x, (g, _)| {
                norm::rms_norm(d, x, g, self.dims(), T::of_f64(eps))
            })
        })?;
        Ok(out)
    }

    /// Instance normalisation of an NCHW tensor with per-channel `γ`/`β`.
    pub fn instance_norm_2d(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.instance_norm_2d_into(gamma, beta, eps, &mut out)?;
        Ok(out)
    }

    pub fn instance_norm_2d_into<'o>(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        eps: f64,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "instance_norm_2d";
        let [n, c, h, w] = require_nchw(OP, self)?;
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, gamma, beta, out, |d, x, (g, b)| {
                norm::instance_norm_2d(d, x, g, b, n, c, h, w, T::of_f64(eps))
            })
        })?;
        Ok(out)
    }

    /// Group normalisation of `[batch, channels, ...]` with `groups`
    /// channel groups.
    pub fn group_norm(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        groups: usize,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.group_norm_into(gamma, beta, groups, eps, &mut out)?;
        Ok(out)
    }

    pub fn group_norm_into<'o>(
        &self,
        gamma: Option<&Tensor>,
        beta: Option<&Tensor>,
        groups: usize,
        eps: f64,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "group_norm";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, gamma, beta, out, |d, x, (g, b)| {
                norm::group_norm(d, x, g, b, self.dims(), groups, T::of_f64(eps))
            })
        })?;
        Ok(out)
    }

    /// Scales to unit 2-norm along `axis`, or over the whole tensor for
    /// `None`. Zero-norm slices are left unchanged.
    pub fn l2_norm(&self, axis: Option<usize>) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.l2_norm_into(axis, &mut out)?;
        Ok(out)
    }

    pub fn l2_norm_into<'o>(&self, axis: Option<usize>, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "l2_norm";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_into::<T, _>(OP, self, None, None, out, |d, x, _| norm::l2_norm(d, x, self.dims(), axis))
        })?;
        Ok(out)
    }

    /// Backward pass of [`Tensor::batch_norm`]; `self` is the forward input.
    pub fn batch_norm_backward(
        &self,
        grad_output: &Tensor,
        gamma: Option<&mut Parameter>,
        beta: Option<&mut Parameter>,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "batch_norm_backward";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_backward::<T, _>(OP, self, grad_output, gamma, beta, |grads, dy, x, g| {
                norm::batch_norm_backward(grads, dy, x, g, self.dims(), T::of_f64(eps))
            })
        })
    }

    /// Backward pass of [`Tensor::layer_norm`].
    pub fn layer_norm_backward(
        &self,
        grad_output: &Tensor,
        gamma: Option<&mut Parameter>,
        beta: Option<&mut Parameter>,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "layer_norm_backward";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_backward::<T, _>(OP, self, grad_output, gamma, beta, |grads, dy, x, g| {
                norm::layer_norm_backward(grads, dy, x, g, self.dims(), T::of_f64(eps))
            })
        })
    }

    pub fn rms_norm_backward(
        &self,
        grad_output: &Tensor,
        gamma: Option<&mut Parameter>,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "rms_norm_backward";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_backward::<T, _>(OP, self, grad_output, gamma, None, |grads, dy, x, g| {
                norm::rms_norm_backward(grads, dy, x, g, self.dims(), T::of_f64(eps))
            })
        })
    }

    pub fn instance_norm_2d_backward(
        &self,
        grad_output: &Tensor,
        gamma: Option<&mut Parameter>,
        beta: Option<&mut Parameter>,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "instance_norm_2d_backward";
        let [n, c, h, w] = require_nchw(OP, self)?;
        with_float_dtype!(self.dtype(), OP, T => {
            norm_backward::<T, _>(OP, self, grad_output, gamma, beta, |grads, dy, x, g| {
                norm::instance_norm_2d_backward(grads, dy, x, g, n, c, h, w, T::of_f64(eps))
            })
        })
    }

    pub fn group_norm_backward(
        &self,
        grad_output: &Tensor,
        gamma: Option<&mut Parameter>,
        beta: Option<&mut Parameter>,
        groups: usize,
        eps: f64,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "group_norm_backward";
        with_float_dtype!(self.dtype(), OP, T => {
            norm_backward::<T, _>(OP, self, grad_output, gamma, beta, |grads, dy, x, g| {
                norm::group_norm_backward(grads, dy, x, g, self.dims(), groups, T::of_f64(eps))
            })
        })
    }
}
