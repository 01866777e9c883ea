// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element type conversion.
//!
//! Every conversion goes through [`saturating_cast`]: exact when the value
//! fits, otherwise clamped to the destination's range. Floats truncate
//! toward zero on the way to an integer type and NaN becomes zero.

use crate::element::{saturating_cast, Element};
use crate::elementwise::{contiguous, parallel, strided};
use crate::layout::{Strided, StridedMut};

/// Converts `n` packed elements of `src` into `dst`.
pub fn convert<D: Element, S: Element>(dst: &mut [D], src: &[S], n: usize) {
    contiguous::unary(dst, src, n, saturating_cast::<D, S>);
}

/// Multi-threaded [`convert`].
pub fn par_convert<D: Element, S: Element>(dst: &mut [D], src: &[S], n: usize) {
    parallel::par_unary(dst, src, n, saturating_cast::<D, S>);
}

/// Converts a strided operand into a strided destination.
pub fn convert_strided<D: Element, S: Element>(
    dst: StridedMut<'_, D>,
    src: Strided<'_, S>,
    shape: &[usize],
) {
    strided::unary_strided(dst, src, shape, saturating_cast::<D, S>);
}

/// Multi-threaded [`convert_strided`].
pub fn par_convert_strided<D: Element, S: Element>(
    dst: StridedMut<'_, D>,
    src: Strided<'_, S>,
    shape: &[usize],
) {
    parallel::par_unary_strided(dst, src, shape, saturating_cast::<D, S>);
}
