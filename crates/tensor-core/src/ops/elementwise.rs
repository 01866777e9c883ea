// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise operations.
//!
//! Operands must share dtype and shape; there is no implicit broadcasting.
//! Every kernel here runs through the strided multi-threaded wrappers,
//! which fall through to the flat loops when all operands are packed.

use kernels::elementwise::{par_binary_strided, par_ternary_strided, par_unary_strided};
use kernels::Element;
use num_traits::{One, Zero};

use crate::storage::{with_dtype, TensorElement};
use crate::tensor::{check_destination, check_operands, dispatch_path};
use crate::{Tensor, TensorError};

pub(crate) fn map_into<T, F>(op: &'static str, src: &Tensor, out: &Tensor, f: F) -> Result<(), TensorError>
where
    T: TensorElement,
    F: Fn(T) -> T + Sync,
{
    check_destination(op, out, src.dtype(), src.shape())?;
    let src = src.unaliased(out)?;
    tracing::trace!(op, path = dispatch_path(&[&*src, out]), "unary");
    let s = src.read::<T>(op)?;
    let mut d = out.write::<T>(op)?;
    par_unary_strided(out.strided_mut(&mut d[..]), src.strided(&s[..]), out.dims(), f);
    Ok(())
}

pub(crate) fn zip_into<T, F>(op: &'static str, a: &Tensor, b: &Tensor, out: &Tensor, f: F) -> Result<(), TensorError>
where
    T: TensorElement,
    F: Fn(T, T) -> T + Sync,
{
    check_operands(op, a, b)?;
    check_destination(op, out, a.dtype(), a.shape())?;
    let a = a.unaliased(out)?;
    let b = b.unaliased(out)?;
    tracing::trace!(op, path = dispatch_path(&[&*a, &*b, out]), "binary");
    let ga = a.read::<T>(op)?;
    let gb = if b.shares_buffer(&a) { None } else { Some(b.read::<T>(op)?) };
    let bd: &[T] = match &gb {
        Some(g) => &g[..],
        None => &ga[..],
    };
    let mut d = out.write::<T>(op)?;
    par_binary_strided(
        out.strided_mut(&mut d[..]),
        a.strided(&ga[..]),
        b.strided(bd),
        out.dims(),
        f,
    );
    Ok(())
}

macro_rules! unary_ops {
    ($($(#[$meta:meta])* $name:ident, $into:ident => $method:ident;)*) => {
        impl Tensor {$(
            $(#[$meta])*
            pub fn $name(&self) -> Result<Tensor, TensorError> {
                let mut out = self.alloc_like()?;
                self.$into(&mut out)?;
                Ok(out)
            }

            #[doc = concat!("[`Tensor::", stringify!($name), "`] into an existing destination.")]
            pub fn $into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
                with_dtype!(self.dtype(), T => {
                    map_into::<T, _>(stringify!($name), self, out, |x: T| x.$method())
                })?;
                Ok(out)
            }
        )*}
    };
}

unary_ops! {
    /// Square root. Integer results truncate.
    sqrt, sqrt_into => elem_sqrt;
    /// Natural exponential.
    exp, exp_into => elem_exp;
    /// Natural logarithm.
    log, log_into => elem_ln;
    /// Absolute value; integer minimum values wrap.
    abs, abs_into => elem_abs;
    sin, sin_into => elem_sin;
    cos, cos_into => elem_cos;
    /// Negation; integer minimum values wrap.
    negate, negate_into => elem_neg;
    /// `-1`, `0` or `1` per element.
    sign, sign_into => elem_signum;
}

macro_rules! binary_ops {
    ($($(#[$meta:meta])* $name:ident, $into:ident => $method:ident;)*) => {
        impl Tensor {$(
            $(#[$meta])*
            pub fn $name(&self, other: &Tensor) -> Result<Tensor, TensorError> {
                let mut out = self.alloc_like()?;
                self.$into(other, &mut out)?;
                Ok(out)
            }

            #[doc = concat!("[`Tensor::", stringify!($name), "`] into an existing destination.")]
            pub fn $into<'o>(&self, other: &Tensor, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
                with_dtype!(self.dtype(), T => {
                    zip_into::<T, _>(stringify!($name), self, other, out, |a: T, b: T| a.$method(b))
                })?;
                Ok(out)
            }
        )*}
    };
}

binary_ops! {
    /// Elementwise sum.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let a = Tensor::from_slice(Shape::matrix(2, 2), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    /// let b = Tensor::from_slice(Shape::matrix(2, 2), &[5.0f32, 6.0, 7.0, 8.0]).unwrap();
    /// assert_eq!(a.add(&b).unwrap().to_vec::<f32>().unwrap(), vec![6.0, 8.0, 10.0, 12.0]);
    /// ```
    add, add_into => elem_add;
    sub, sub_into => elem_sub;
    mul, mul_into => elem_mul;
    /// Elementwise quotient; integer division by zero yields zero.
    div, div_into => elem_div;
    maximum, maximum_into => elem_max;
    minimum, minimum_into => elem_min;
}

macro_rules! comparison_ops {
    ($($(#[$meta:meta])* $name:ident, $into:ident => $cmp:tt;)*) => {
        impl Tensor {$(
            $(#[$meta])*
            pub fn $name(&self, other: &Tensor) -> Result<Tensor, TensorError> {
                let mut out = self.alloc_like()?;
                self.$into(other, &mut out)?;
                Ok(out)
            }

            #[doc = concat!("[`Tensor::", stringify!($name), "`] into an existing destination.")]
            pub fn $into<'o>(&self, other: &Tensor, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
                with_dtype!(self.dtype(), T => {
                    zip_into::<T, _>(stringify!($name), self, other, out, |a: T, b: T| {
                        if a $cmp b { T::one() } else { T::zero() }
                    })
                })?;
                Ok(out)
            }
        )*}
    };
}

comparison_ops! {
    /// `1` where the elements are equal, `0` elsewhere, in the operand dtype.
    equal, equal_into => ==;
    greater, greater_into => >;
    less, less_into => <;
    greater_equal, greater_equal_into => >=;
    less_equal, less_equal_into => <=;
}

impl Tensor {
    /// `x²` per element.
    pub fn square(&self) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.square_into(&mut out)?;
        Ok(out)
    }

    pub fn square_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => map_into::<T, _>("square", self, out, |x: T| x.elem_mul(x)))?;
        Ok(out)
    }

    /// `α·x` per element, with `α` converted to the tensor's dtype.
    pub fn scale(&self, alpha: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.scale_into(alpha, &mut out)?;
        Ok(out)
    }

    pub fn scale_into<'o>(&self, alpha: f64, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => {
            let a = T::of_f64(alpha);
            map_into::<T, _>("scale", self, out, move |x: T| x.elem_mul(a))
        })?;
        Ok(out)
    }

    /// `x + v` per element.
    pub fn add_scalar(&self, value: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.add_scalar_into(value, &mut out)?;
        Ok(out)
    }

    pub fn add_scalar_into<'o>(&self, value: f64, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => {
            let v = T::of_f64(value);
            map_into::<T, _>("add_scalar", self, out, move |x: T| x.elem_add(v))
        })?;
        Ok(out)
    }

    /// `x^α` per element, computed in `f64`.
    pub fn pow(&self, exponent: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.pow_into(exponent, &mut out)?;
        Ok(out)
    }

    pub fn pow_into<'o>(&self, exponent: f64, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        with_dtype!(self.dtype(), T => {
            map_into::<T, _>("pow", self, out, move |x: T| x.elem_powf(exponent))
        })?;
        Ok(out)
    }

    /// Clamps every element to `[lo, hi]`.
    pub fn clamp(&self, lo: f64, hi: f64) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.clamp_into(lo, hi, &mut out)?;
        Ok(out)
    }

    pub fn clamp_into<'o>(&self, lo: f64, hi: f64, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        if lo > hi {
            return Err(TensorError::BadDimensions {
                op: "clamp",
                detail: format!("lower bound {lo} exceeds upper bound {hi}"),
            });
        }
        with_dtype!(self.dtype(), T => {
            let (l, h) = (T::of_f64(lo), T::of_f64(hi));
            map_into::<T, _>("clamp", self, out, move |x: T| x.elem_max(l).elem_min(h))
        })?;
        Ok(out)
    }

    /// `a` where `cond ≠ 0`, `b` elsewhere (a fused `where`).
    ///
    /// All three operands share dtype and shape.
    pub fn select(cond: &Tensor, a: &Tensor, b: &Tensor) -> Result<Tensor, TensorError> {
        let mut out = a.alloc_like()?;
        Tensor::select_into(cond, a, b, &mut out)?;
        Ok(out)
    }

    pub fn select_into<'o>(
        cond: &Tensor,
        a: &Tensor,
        b: &Tensor,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "select";
        check_operands(OP, a, b)?;
        check_operands(OP, a, cond)?;
        check_destination(OP, out, a.dtype(), a.shape())?;
        let cond = cond.unaliased(out)?;
        let a = a.unaliased(out)?;
        let b = b.unaliased(out)?;
        tracing::trace!(op = OP, path = dispatch_path(&[&*cond, &*a, &*b, &*out]), "ternary");
        with_dtype!(a.dtype(), T => {
            // Each distinct buffer is locked once.
            let gc = cond.read::<T>(OP)?;
            let ga = if a.shares_buffer(&cond) { None } else { Some(a.read::<T>(OP)?) };
            let gb = if b.shares_buffer(&cond) || b.shares_buffer(&a) {
                None
            } else {
                Some(b.read::<T>(OP)?)
            };
            let cd: &[T] = &gc[..];
            let ad: &[T] = ga.as_ref().map_or(cd, |g| &g[..]);
            let bd: &[T] = match &gb {
                Some(g) => &g[..],
                None if b.shares_buffer(&a) => ad,
                None => cd,
            };
            let mut d = out.write::<T>(OP)?;
            par_ternary_strided(
                out.strided_mut(&mut d[..]),
                cond.strided(cd),
                a.strided(ad),
                b.strided(bd),
                out.dims(),
                |c: T, x: T, y: T| if c != T::zero() { x } else { y },
            );
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    fn t32(dims: &[usize], v: &[f32]) -> Tensor {
        Tensor::from_slice(dims, v).unwrap()
    }

    #[test]
    fn test_add_leaves_inputs_unchanged() {
        let a = t32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = t32(&[2, 2], &[5.0, 6.0, 7.0, 8.0]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.to_vec::<f32>().unwrap(), vec![6.0, 8.0, 10.0, 12.0]);
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_in_place_through_alias() {
        let a = t32(&[3], &[1.0, 4.0, 9.0]);
        let mut same = a.clone();
        a.sqrt_into(&mut same).unwrap();
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);

        let mut again = a.clone();
        a.mul_into(&a, &mut again).unwrap();
        assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_strided_matches_contiguous() {
        let a = Tensor::from_slice(Shape::matrix(2, 3), &[1.0f64, -2.0, 3.0, -4.0, 5.0, -6.0]).unwrap();
        let at = a.transpose(0, 1).unwrap();
        let packed = at.to_contiguous().unwrap();
        assert_eq!(
            at.abs().unwrap().to_vec::<f64>().unwrap(),
            packed.abs().unwrap().to_vec::<f64>().unwrap()
        );
    }

    #[test]
    fn test_destination_validation() {
        let a = t32(&[2, 2], &[1.0; 4]);
        let mut wrong_shape = Tensor::new(DType::F32, [4]).unwrap();
        assert!(matches!(a.exp_into(&mut wrong_shape), Err(TensorError::ShapeMismatch { .. })));
        let mut wrong_dtype = Tensor::new(DType::F64, [2, 2]).unwrap();
        assert!(matches!(a.exp_into(&mut wrong_dtype), Err(TensorError::DTypeMismatch { .. })));
        let b = Tensor::new(DType::I32, [2, 2]).unwrap();
        assert!(matches!(a.add(&b), Err(TensorError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_scalar_ops_on_integers() {
        let a = Tensor::from_slice([4], &[-3i32, 0, 5, 10]).unwrap();
        assert_eq!(a.scale(2.0).unwrap().to_vec::<i32>().unwrap(), vec![-6, 0, 10, 20]);
        assert_eq!(a.add_scalar(1.0).unwrap().to_vec::<i32>().unwrap(), vec![-2, 1, 6, 11]);
        assert_eq!(a.clamp(0.0, 6.0).unwrap().to_vec::<i32>().unwrap(), vec![0, 0, 5, 6]);
        assert_eq!(a.sign().unwrap().to_vec::<i32>().unwrap(), vec![-1, 0, 1, 1]);
        assert_eq!(a.square().unwrap().to_vec::<i32>().unwrap(), vec![9, 0, 25, 100]);
        assert!(a.clamp(1.0, 0.0).is_err());
    }

    #[test]
    fn test_integer_division_by_zero() {
        let a = Tensor::from_slice([2], &[7i64, -7]).unwrap();
        let b = Tensor::from_slice([2], &[0i64, 2]).unwrap();
        assert_eq!(a.div(&b).unwrap().to_vec::<i64>().unwrap(), vec![0, -3]);
    }

    #[test]
    fn test_comparisons_and_select() {
        let a = t32(&[4], &[1.0, 5.0, 3.0, 3.0]);
        let b = t32(&[4], &[2.0, 4.0, 3.0, 0.0]);
        let gt = a.greater(&b).unwrap();
        assert_eq!(gt.to_vec::<f32>().unwrap(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(a.equal(&b).unwrap().to_vec::<f32>().unwrap(), vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(a.less_equal(&b).unwrap().to_vec::<f32>().unwrap(), vec![1.0, 0.0, 1.0, 0.0]);
        let picked = Tensor::select(&gt, &a, &b).unwrap();
        assert_eq!(picked.to_vec::<f32>().unwrap(), vec![2.0, 5.0, 3.0, 3.0]);
        assert_eq!(a.maximum(&b).unwrap().to_vec::<f32>().unwrap(), vec![2.0, 5.0, 3.0, 3.0]);
    }

    #[test]
    fn test_select_with_shared_operands() {
        let c = t32(&[3], &[1.0, 0.0, 2.0]);
        let picked = Tensor::select(&c, &c, &c).unwrap();
        assert_eq!(picked.to_vec::<f32>().unwrap(), vec![1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_pow_and_log() {
        let a = Tensor::from_slice([3], &[1.0f64, 2.0, 3.0]).unwrap();
        assert_eq!(a.pow(2.0).unwrap().to_vec::<f64>().unwrap(), vec![1.0, 4.0, 9.0]);
        let l = a.exp().unwrap().log().unwrap().to_vec::<f64>().unwrap();
        for (x, y) in l.iter().zip([1.0, 2.0, 3.0]) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_size_is_noop() {
        let a = Tensor::new(DType::F32, [0, 3]).unwrap();
        let b = Tensor::new(DType::F32, [0, 3]).unwrap();
        assert_eq!(a.add(&b).unwrap().num_elements(), 0);
    }
}
