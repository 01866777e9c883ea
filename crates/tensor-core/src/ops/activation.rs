// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Activation functions and their gradients.

use kernels::activation::{
    dropout_mask, relu_grad_value, relu_value, sigmoid_grad_value, sigmoid_value, softmax_axis,
    softmax_axis_grad, tanh_grad_value,
};
use kernels::layout::size;
use kernels::Element;
use num_traits::Float;
use rand::Rng;

use super::elementwise::{map_into, zip_into};
use crate::storage::{with_dtype, with_float_dtype};
use crate::tensor::{check_destination, check_operands};
use crate::{DType, Shape, Tensor, TensorError};

/// `(outer, len, inner)` around axis `dim`.
fn split_at_axis(op: &'static str, shape: &Shape, dim: usize) -> Result<(usize, usize, usize), TensorError> {
    let dim = shape.axis(op, dim)?;
    let dims = shape.dims();
    Ok((size(&dims[..dim]), dims[dim], size(&dims[dim + 1..])))
}

impl Tensor {
    /// `max(x, 0)`, for every dtype.
    pub fn relu(&self) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.relu_into(&mut out)?;
        Ok(out)
    }

    pub fn relu_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => map_into::<T, _>("relu", self, out, relu_value::<T>))?;
        Ok(out)
    }

    /// Logistic sigmoid, stable for large `|x|`.
    pub fn sigmoid(&self) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.sigmoid_into(&mut out)?;
        Ok(out)
    }

    pub fn sigmoid_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_float_dtype!(self.dtype(), "sigmoid", T => {
            map_into::<T, _>("sigmoid", self, out, sigmoid_value::<T>)
        })?;
        Ok(out)
    }

    pub fn tanh(&self) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.tanh_into(&mut out)?;
        Ok(out)
    }

    pub fn tanh_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_float_dtype!(self.dtype(), "tanh", T => {
            map_into::<T, _>("tanh", self, out, |x: T| Float::tanh(x))
        })?;
        Ok(out)
    }

    /// Softmax along axis `dim`, shifted by the slice maximum so large
    /// inputs do not overflow.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_slice(Shape::vector(3), &[1000.0f32, 1000.0, 1000.0]).unwrap();
    /// let p = t.softmax(0).unwrap().to_vec::<f32>().unwrap();
    /// assert!(p.iter().all(|&v| (v - 1.0 / 3.0).abs() < 1e-6));
    /// ```
    pub fn softmax(&self, dim: usize) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.softmax_into(dim, &mut out)?;
        Ok(out)
    }

    pub fn softmax_into<'o>(&self, dim: usize, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "softmax";
        let (outer, len, inner) = split_at_axis(OP, self.shape(), dim)?;
        check_destination(OP, out, self.dtype(), self.shape())?;
        with_float_dtype!(self.dtype(), OP, T => {
            let src = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            softmax_axis(&mut d[..], &src[..], outer, len, inner)?;
            drop(src);
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// A dropout mask of `shape`: each entry is `0` with probability `p`,
    /// otherwise `1/(1 − p)`.
    ///
    /// # Errors
    /// [`TensorError::BadDimensions`] unless `0 ≤ p < 1`.
    pub fn dropout_mask<R: Rng + ?Sized>(
        dtype: DType,
        shape: impl Into<Shape>,
        p: f64,
        rng: &mut R,
    ) -> Result<Tensor, TensorError> {
        const OP: &str = "dropout_mask";
        let mask = Tensor::new(dtype, shape)?;
        let n = mask.num_elements();
        with_float_dtype!(dtype, OP, T => {
            let mut m = mask.write::<T>(OP)?;
            dropout_mask(&mut m[..n], n, p, rng).map(|_| ()).map_err(TensorError::from)
        })?;
        Ok(mask)
    }

    /// `self · mask`.
    pub fn dropout_forward(&self, mask: &Tensor) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.dropout_forward_into(mask, &mut out)?;
        Ok(out)
    }

    pub fn dropout_forward_into<'o>(&self, mask: &Tensor, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => zip_into::<T, _>("dropout_forward", self, mask, out, T::elem_mul))?;
        Ok(out)
    }

    /// Gradient of [`Tensor::relu`]: `grad_output` where `self > 0`, else
    /// zero. `self` is the forward input.
    pub fn relu_backward(&self, grad_output: &Tensor) -> Result<Tensor, TensorError> {
        check_operands("relu_backward", self, grad_output)?;
        let dx = self.alloc_like()?;
        with_dtype!(self.dtype(), T => {
            zip_into::<T, _>("relu_backward", grad_output, self, &dx, relu_grad_value::<T>)
        })?;
        Ok(dx)
    }

    /// Gradient of [`Tensor::sigmoid`]; `self` is the forward output.
    pub fn sigmoid_backward(&self, grad_output: &Tensor) -> Result<Tensor, TensorError> {
        check_operands("sigmoid_backward", self, grad_output)?;
        let dx = self.alloc_like()?;
        with_float_dtype!(self.dtype(), "sigmoid_backward", T => {
            zip_into::<T, _>("sigmoid_backward", grad_output, self, &dx, sigmoid_grad_value::<T>)
        })?;
        Ok(dx)
    }

    /// Gradient of [`Tensor::tanh`]; `self` is the forward output.
    pub fn tanh_backward(&self, grad_output: &Tensor) -> Result<Tensor, TensorError> {
        check_operands("tanh_backward", self, grad_output)?;
        let dx = self.alloc_like()?;
        with_float_dtype!(self.dtype(), "tanh_backward", T => {
            zip_into::<T, _>("tanh_backward", grad_output, self, &dx, tanh_grad_value::<T>)
        })?;
        Ok(dx)
    }

    /// Gradient of [`Tensor::softmax`] along `dim`; `self` is the forward
    /// output.
    pub fn softmax_backward(&self, grad_output: &Tensor, dim: usize) -> Result<Tensor, TensorError> {
        const OP: &str = "softmax_backward";
        check_operands(OP, self, grad_output)?;
        let (outer, len, inner) = split_at_axis(OP, self.shape(), dim)?;
        let dx = self.alloc_like()?;
        with_float_dtype!(self.dtype(), OP, T => {
            let y = self.packed::<T>(OP)?;
            let dy = grad_output.packed::<T>(OP)?;
            let mut d = dx.write::<T>(OP)?;
            softmax_axis_grad(&mut d[..], &dy[..], &y[..], outer, len, inner).map_err(TensorError::from)
        })?;
        Ok(dx)
    }

    /// `grad_output · mask`; `self` is the mask used in the forward pass.
    pub fn dropout_backward(&self, grad_output: &Tensor) -> Result<Tensor, TensorError> {
        check_operands("dropout_backward", self, grad_output)?;
        let dx = self.alloc_like()?;
        with_dtype!(self.dtype(), T => {
            zip_into::<T, _>("dropout_backward", grad_output, self, &dx, T::elem_mul)
        })?;
        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_relu_integer_and_strided() {
        let t = Tensor::from_slice(Shape::matrix(2, 2), &[-3i16, 4, 5, -6]).unwrap();
        assert_eq!(t.relu().unwrap().to_vec::<i16>().unwrap(), vec![0, 4, 5, 0]);
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.relu().unwrap().to_vec::<i16>().unwrap(), vec![0, 5, 4, 0]);
    }

    #[test]
    fn test_relu_in_place() {
        let t = Tensor::from_slice(Shape::vector(3), &[-1.0f32, 2.0, -3.0]).unwrap();
        let mut same = t.clone();
        t.relu_into(&mut same).unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_sigmoid_tanh_reject_integers() {
        let t = Tensor::new(DType::I32, [2]).unwrap();
        assert!(matches!(t.sigmoid(), Err(TensorError::UnsupportedDType { .. })));
        assert!(matches!(t.tanh(), Err(TensorError::UnsupportedDType { .. })));
    }

    #[test]
    fn test_softmax_rows_and_columns() {
        let t = Tensor::from_slice(Shape::matrix(2, 2), &[0.0f64, 0.0, 1.0, 1.0]).unwrap();
        let rows = t.softmax(1).unwrap().to_vec::<f64>().unwrap();
        assert!(rows.iter().all(|&v| approx_eq(v, 0.5, 1e-12)));

        let cols = t.softmax(0).unwrap().to_vec::<f64>().unwrap();
        let e = std::f64::consts::E;
        assert!(approx_eq(cols[0], 1.0 / (1.0 + e), 1e-12));
        assert!(approx_eq(cols[0] + cols[2], 1.0, 1e-12));
        assert!(t.softmax(2).is_err());
    }

    #[test]
    fn test_sigmoid_and_backward() {
        let x = Tensor::from_slice(Shape::vector(3), &[-1000.0f32, 0.0, 1000.0]).unwrap();
        let y = x.sigmoid().unwrap();
        assert_eq!(y.to_vec::<f32>().unwrap(), vec![0.0, 0.5, 1.0]);
        let dy = Tensor::full(DType::F32, [3], 1.0).unwrap();
        assert_eq!(y.sigmoid_backward(&dy).unwrap().to_vec::<f32>().unwrap(), vec![0.0, 0.25, 0.0]);
    }

    #[test]
    fn test_relu_backward_uses_input() {
        let x = Tensor::from_slice(Shape::vector(3), &[-1.0f64, 0.5, 2.0]).unwrap();
        let dy = Tensor::from_slice(Shape::vector(3), &[3.0f64, 3.0, 3.0]).unwrap();
        assert_eq!(x.relu_backward(&dy).unwrap().to_vec::<f64>().unwrap(), vec![0.0, 3.0, 3.0]);
    }

    #[test]
    fn test_softmax_backward_of_uniform_gradient_is_zero() {
        let x = Tensor::from_slice(Shape::matrix(2, 3), &[0.1f64, 0.2, 0.3, -1.0, 0.0, 1.0]).unwrap();
        let y = x.softmax(1).unwrap();
        let dy = Tensor::full(DType::F64, [2, 3], 1.0).unwrap();
        let dx = y.softmax_backward(&dy, 1).unwrap();
        assert!(dx.to_vec::<f64>().unwrap().iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn test_dropout_mask_and_forward() {
        let mut rng = StdRng::seed_from_u64(7);
        let mask = Tensor::dropout_mask(DType::F32, [1000], 0.5, &mut rng).unwrap();
        let m = mask.to_vec::<f32>().unwrap();
        assert!(m.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = m.iter().filter(|&&v| v != 0.0).count();
        assert!(kept > 400 && kept < 600);

        let x = Tensor::full(DType::F32, [1000], 3.0).unwrap();
        let y = x.dropout_forward(&mask).unwrap().to_vec::<f32>().unwrap();
        for (yi, mi) in y.iter().zip(&m) {
            assert_eq!(*yi, 3.0 * mi);
        }
        let dx = mask.dropout_backward(&x).unwrap();
        assert_eq!(dx.to_vec::<f32>().unwrap(), y);

        assert!(Tensor::dropout_mask(DType::F32, [4], 1.0, &mut rng).is_err());
    }
}
