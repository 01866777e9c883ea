// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Numeric element traits.
//!
//! [`Element`] is the bound every kernel is generic over. Arithmetic on it
//! never panics: integer add/sub/mul wrap, integer division by zero yields
//! zero, and the transcendental functions go through `f64` and saturate
//! back. [`Real`] adds the full [`num_traits::Float`] API for kernels that
//! only make sense on floating point data.

use memory_manager::PoolElement;
use num_traits::{Bounded, Float, NumCast, One, Zero};
use std::fmt::Debug;

/// A numeric element type a kernel can operate on.
pub trait Element:
    Copy
    + Default
    + Debug
    + PartialOrd
    + Send
    + Sync
    + Zero
    + One
    + Bounded
    + NumCast
    + PoolElement
{
    /// `true` for floating point types.
    const IS_FLOAT: bool;

    fn elem_add(self, rhs: Self) -> Self;
    fn elem_sub(self, rhs: Self) -> Self;
    fn elem_mul(self, rhs: Self) -> Self;
    /// Division; integer division by zero yields zero.
    fn elem_div(self, rhs: Self) -> Self;
    fn elem_neg(self) -> Self;
    fn elem_abs(self) -> Self;
    /// `-1`, `0` or `1` (NaN stays NaN).
    fn elem_signum(self) -> Self;

    fn elem_sqrt(self) -> Self;
    fn elem_exp(self) -> Self;
    fn elem_ln(self) -> Self;
    fn elem_sin(self) -> Self;
    fn elem_cos(self) -> Self;
    fn elem_powf(self, exponent: f64) -> Self;

    /// The lowest representable value (`-∞` for floats).
    fn lowest() -> Self;

    /// Lossy conversion to `f64`.
    fn as_f64(self) -> f64;

    /// Conversion from `f64`: truncates toward zero and saturates for
    /// integer types, NaN becomes zero.
    fn of_f64(v: f64) -> Self;

    fn elem_max(self, rhs: Self) -> Self {
        if rhs > self {
            rhs
        } else {
            self
        }
    }

    fn elem_min(self, rhs: Self) -> Self {
        if rhs < self {
            rhs
        } else {
            self
        }
    }
}

/// Floating point elements.
pub trait Real: Element + Float {}

impl<T: Element + Float> Real for T {}

/// Converts an `f64` literal into `T`.
#[inline]
pub fn lit<T: Element>(v: f64) -> T {
    T::of_f64(v)
}

/// Converts `src` into `D`, saturating at `D`'s bounds.
///
/// Floats truncate toward zero when the destination is an integer; NaN
/// becomes zero. Conversions that fit are exact casts.
#[inline]
pub fn saturating_cast<D: Element, S: Element>(src: S) -> D {
    match <D as NumCast>::from(src) {
        Some(v) => v,
        None => {
            let f = src.as_f64();
            if f.is_nan() {
                D::zero()
            } else if f < 0.0 {
                D::min_value()
            } else {
                D::max_value()
            }
        }
    }
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {$(
        impl Element for $t {
            const IS_FLOAT: bool = true;

            #[inline] fn elem_add(self, rhs: Self) -> Self { self + rhs }
            #[inline] fn elem_sub(self, rhs: Self) -> Self { self - rhs }
            #[inline] fn elem_mul(self, rhs: Self) -> Self { self * rhs }
            #[inline] fn elem_div(self, rhs: Self) -> Self { self / rhs }
            #[inline] fn elem_neg(self) -> Self { -self }
            #[inline] fn elem_abs(self) -> Self { self.abs() }
            #[inline]
            fn elem_signum(self) -> Self {
                if self > 0.0 {
                    1.0
                } else if self < 0.0 {
                    -1.0
                } else {
                    self
                }
            }

            #[inline] fn elem_sqrt(self) -> Self { self.sqrt() }
            #[inline] fn elem_exp(self) -> Self { self.exp() }
            #[inline] fn elem_ln(self) -> Self { self.ln() }
            #[inline] fn elem_sin(self) -> Self { self.sin() }
            #[inline] fn elem_cos(self) -> Self { self.cos() }
            #[inline] fn elem_powf(self, exponent: f64) -> Self { self.powf(exponent as $t) }

            #[inline] fn lowest() -> Self { <$t>::NEG_INFINITY }
            #[inline] fn as_f64(self) -> f64 { self as f64 }
            #[inline] fn of_f64(v: f64) -> Self { v as $t }
        }
    )*};
}

macro_rules! impl_int_element {
    ($($t:ty),*) => {$(
        impl Element for $t {
            const IS_FLOAT: bool = false;

            #[inline] fn elem_add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            #[inline] fn elem_sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            #[inline] fn elem_mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            #[inline]
            fn elem_div(self, rhs: Self) -> Self {
                if rhs == 0 { 0 } else { self.wrapping_div(rhs) }
            }
            #[inline] fn elem_neg(self) -> Self { (0 as $t).wrapping_sub(self) }
            #[inline]
            fn elem_abs(self) -> Self {
                if self < <$t as Zero>::zero() { self.elem_neg() } else { self }
            }
            #[inline]
            fn elem_signum(self) -> Self {
                if self > <$t as Zero>::zero() {
                    1
                } else if self < <$t as Zero>::zero() {
                    (0 as $t).wrapping_sub(1)
                } else {
                    0
                }
            }

            #[inline] fn elem_sqrt(self) -> Self { Self::of_f64(self.as_f64().sqrt()) }
            #[inline] fn elem_exp(self) -> Self { Self::of_f64(self.as_f64().exp()) }
            #[inline] fn elem_ln(self) -> Self { Self::of_f64(self.as_f64().ln()) }
            #[inline] fn elem_sin(self) -> Self { Self::of_f64(self.as_f64().sin()) }
            #[inline] fn elem_cos(self) -> Self { Self::of_f64(self.as_f64().cos()) }
            #[inline] fn elem_powf(self, exponent: f64) -> Self { Self::of_f64(self.as_f64().powf(exponent)) }

            #[inline] fn lowest() -> Self { <$t>::MIN }
            #[inline] fn as_f64(self) -> f64 { self as f64 }
            #[inline]
            fn of_f64(v: f64) -> Self {
                match <$t as NumCast>::from(v.trunc()) {
                    Some(x) => x,
                    None if v.is_nan() => 0,
                    None if v < 0.0 => <$t>::MIN,
                    None => <$t>::MAX,
                }
            }
        }
    )*};
}

impl_float_element!(f32, f64);
impl_int_element!(i64, i32, i16, i8, u8);
