// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reductions over axes.
//!
//! Reduced axes are dropped from the result shape; an empty axis list
//! reduces everything to a scalar.

use kernels::layout::Strided;
use kernels::{reduce, KernelError};

use crate::storage::{with_dtype, TensorElement};
use crate::tensor::check_destination;
use crate::{DType, Shape, Tensor, TensorError};

type ReduceKernel<T> = fn(&mut [T], Strided<'_, T>, &[usize], &[usize]) -> Result<(), KernelError>;

fn result_shape(shape: &Shape, axes: &[usize]) -> Result<Shape, TensorError> {
    reduce::reduced_shape(shape.dims(), axes)?;
    if axes.is_empty() {
        return Ok(Shape::scalar());
    }
    Ok(Shape::new(
        shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(d, _)| !axes.contains(d))
            .map(|(_, &e)| e)
            .collect(),
    ))
}

fn reduce_into<T: TensorElement>(
    op: &'static str,
    src: &Tensor,
    axes: &[usize],
    out: &Tensor,
    kernel: ReduceKernel<T>,
) -> Result<(), TensorError> {
    let shape = result_shape(src.shape(), axes)?;
    check_destination(op, out, src.dtype(), &shape)?;
    let src = src.unaliased(out)?;
    let s = src.read::<T>(op)?;
    let mut d = out.packed_out::<T>(op)?;
    kernel(&mut d, src.strided(&s[..]), src.dims(), axes)?;
    out.commit(d, op)
}

fn arg_into<T: TensorElement>(
    op: &'static str,
    src: &Tensor,
    axis: usize,
    out: &Tensor,
    kernel: fn(&mut [i64], Strided<'_, T>, &[usize], usize) -> Result<(), KernelError>,
) -> Result<(), TensorError> {
    src.shape().axis(op, axis)?;
    let shape = result_shape(src.shape(), &[axis])?;
    check_destination(op, out, DType::I64, &shape)?;
    let src = src.unaliased(out)?;
    let s = src.read::<T>(op)?;
    let mut d = out.packed_out::<i64>(op)?;
    kernel(&mut d, src.strided(&s[..]), src.dims(), axis)?;
    out.commit(d, op)
}

macro_rules! reductions {
    ($($(#[$meta:meta])* $name:ident, $into:ident;)*) => {
        impl Tensor {$(
            $(#[$meta])*
            pub fn $name(&self, axes: &[usize]) -> Result<Tensor, TensorError> {
                let mut out = Tensor::new(self.dtype(), result_shape(self.shape(), axes)?)?;
                self.$into(axes, &mut out)?;
                Ok(out)
            }

            #[doc = concat!("[`Tensor::", stringify!($name), "`] into an existing destination.")]
            pub fn $into<'o>(&self, axes: &[usize], out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
                with_dtype!(self.dtype(), T => {
                    reduce_into::<T>(stringify!($name), self, axes, out, reduce::$name::<T>)
                })?;
                Ok(out)
            }
        )*}
    };
}

reductions! {
    /// Sum over `axes`.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_slice(Shape::matrix(2, 3), &[1, 2, 3, 4, 5, 6i32]).unwrap();
    /// assert_eq!(t.sum(&[0]).unwrap().to_vec::<i32>().unwrap(), vec![5, 7, 9]);
    /// assert_eq!(t.sum(&[]).unwrap().to_vec::<i32>().unwrap(), vec![21]);
    /// ```
    sum, sum_into;
    /// Mean over `axes`; integer means truncate.
    mean, mean_into;
    max, max_into;
    min, min_into;
}

impl Tensor {
    /// Index of the largest element along `axis` (first occurrence), as
    /// an `I64` tensor with `axis` removed.
    pub fn argmax(&self, axis: usize) -> Result<Tensor, TensorError> {
        let mut out = Tensor::new(DType::I64, result_shape(self.shape(), &[axis])?)?;
        self.argmax_into(axis, &mut out)?;
        Ok(out)
    }

    pub fn argmax_into<'o>(&self, axis: usize, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => arg_into::<T>("argmax", self, axis, out, reduce::argmax::<T>))?;
        Ok(out)
    }

    /// Index of the smallest element along `axis` (first occurrence).
    pub fn argmin(&self, axis: usize) -> Result<Tensor, TensorError> {
        let mut out = Tensor::new(DType::I64, result_shape(self.shape(), &[axis])?)?;
        self.argmin_into(axis, &mut out)?;
        Ok(out)
    }

    pub fn argmin_into<'o>(&self, axis: usize, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => arg_into::<T>("argmin", self, axis, out, reduce::argmin::<T>))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tensor {
        Tensor::from_slice([2, 3, 2], &(1..=12).map(|v| v as f32).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_sum_drops_reduced_axes() {
        let t = sample();
        let s = t.sum(&[1]).unwrap();
        assert_eq!(s.dims(), &[2, 2]);
        assert_eq!(s.to_vec::<f32>().unwrap(), vec![9.0, 12.0, 27.0, 30.0]);
        let all = t.sum(&[]).unwrap();
        assert_eq!(all.rank(), 0);
        assert_eq!(all.at::<f32>(&[]).unwrap(), 78.0);
    }

    #[test]
    fn test_mean_max_min() {
        let t = sample();
        assert_eq!(t.mean(&[0, 2]).unwrap().to_vec::<f32>().unwrap(), vec![4.5, 6.5, 8.5]);
        assert_eq!(t.max(&[2]).unwrap().to_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
        assert_eq!(t.min(&[0]).unwrap().to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_reduce_transposed_view() {
        let t = Tensor::from_slice(Shape::matrix(2, 3), &[1i64, 2, 3, 4, 5, 6]).unwrap();
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.sum(&[1]).unwrap().to_vec::<i64>().unwrap(), vec![5, 7, 9]);
    }

    #[test]
    fn test_argmax_argmin() {
        let t = Tensor::from_slice(Shape::matrix(2, 3), &[1.0f64, 7.0, 7.0, 0.0, -2.0, 2.0]).unwrap();
        let am = t.argmax(1).unwrap();
        assert_eq!(am.dtype(), DType::I64);
        assert_eq!(am.to_vec::<i64>().unwrap(), vec![1, 2]);
        assert_eq!(t.argmin(0).unwrap().to_vec::<i64>().unwrap(), vec![1, 1, 1]);
        assert!(t.argmax(2).is_err());
    }

    #[test]
    fn test_reduce_into_strided_destination() {
        let t = sample();
        let backing = Tensor::new(DType::F32, [2, 2]).unwrap();
        let mut out = backing.transpose(0, 1).unwrap();
        t.sum_into(&[1], &mut out).unwrap();
        assert_eq!(backing.to_vec::<f32>().unwrap(), vec![9.0, 27.0, 12.0, 30.0]);
    }

    #[test]
    fn test_bad_axes_and_destination() {
        let t = sample();
        assert!(matches!(t.sum(&[3]), Err(TensorError::BadDimensions { .. })));
        let mut wrong = Tensor::new(DType::F32, [4]).unwrap();
        assert!(matches!(t.sum_into(&[1], &mut wrong), Err(TensorError::ShapeMismatch { .. })));
    }
}
