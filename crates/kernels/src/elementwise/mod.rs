// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The elementwise kernel family.
//!
//! Three layers, each generic over the element types and the per-element
//! closure (which is monomorphised and inlined into the loop):
//!
//! - [`contiguous`]: flat loops over packed buffers, 4-way unrolled.
//! - [`strided`]: rank-generic loops driven by a shared cursor, falling back
//!   to the flat loops when every operand is packed.
//! - [`parallel`]: wrappers that fan out on the global worker pool when the
//!   element count passes the scheduler threshold.
//!
//! Kernels in this module never validate: callers guarantee that operand
//! buffers cover the requested shape.

pub mod contiguous;
pub mod parallel;
pub mod strided;

pub use contiguous::{
    binary, binary_inplace, binary_scalar, fill, ternary, unary, unary_inplace, unary_scalar,
};
pub use parallel::{
    par_binary, par_binary_inplace, par_binary_strided, par_fill, par_ternary,
    par_ternary_strided, par_unary, par_unary_inplace, par_unary_strided,
};
pub use strided::{
    binary_strided, fill_strided, for_each_strided, ternary_strided, unary_scalar_strided,
    unary_strided,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{packed_strides, Strided, StridedMut};

    fn bits(v: &[f32]) -> Vec<u32> {
        v.iter().map(|x| x.to_bits()).collect()
    }

    #[test]
    fn test_parallel_matches_single_thread() {
        let n = 200_003;
        let a: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..n).map(|i| (i as f32 * 0.11).cos() + 2.0).collect();
        let mut single = vec![0.0f32; n];
        let mut multi = vec![0.0f32; n];
        binary(&mut single, &a, &b, n, |x, y| (x / y).exp());
        par_binary(&mut multi, &a, &b, n, |x, y| (x / y).exp());
        assert_eq!(bits(&single), bits(&multi));
    }

    #[test]
    fn test_parallel_strided_matches_single_thread() {
        // A [400, 300] matrix read through its transpose.
        let (rows, cols) = (400usize, 300usize);
        let src: Vec<f32> = (0..rows * cols).map(|i| i as f32 * 0.5).collect();
        let shape = [cols, rows];
        let out_strides = packed_strides(&shape);
        let src_strides = [1isize, cols as isize];

        let mut single = vec![0.0f32; rows * cols];
        let mut multi = vec![0.0f32; rows * cols];
        unary_strided(
            StridedMut::new(&mut single, 0, &out_strides),
            Strided::new(&src, 0, &src_strides),
            &shape,
            |x| x * 3.0 - 1.0,
        );
        par_unary_strided(
            StridedMut::new(&mut multi, 0, &out_strides),
            Strided::new(&src, 0, &src_strides),
            &shape,
            |x| x * 3.0 - 1.0,
        );
        assert_eq!(bits(&single), bits(&multi));
        assert_eq!(multi[1], src[cols] * 3.0 - 1.0);
    }

    #[test]
    fn test_parallel_strided_padded_destination() {
        // Destination rows padded to 8 columns; only the first 5 are written.
        let (rows, cols, ld) = (300usize, 5usize, 8usize);
        let a: Vec<i32> = (0..(rows * cols) as i32).collect();
        let b = vec![1i32; rows * cols];
        let mut dst = vec![-7i32; rows * ld];
        let ps = packed_strides(&[rows, cols]);
        par_binary_strided(
            StridedMut::new(&mut dst, 0, &[ld as isize, 1]),
            Strided::new(&a, 0, &ps),
            Strided::new(&b, 0, &ps),
            &[rows, cols],
            |x, y| x + y,
        );
        for r in 0..rows {
            for c in 0..ld {
                let expected = if c < cols { (r * cols + c) as i32 + 1 } else { -7 };
                assert_eq!(dst[r * ld + c], expected);
            }
        }
    }

    #[test]
    fn test_parallel_ternary_and_inplace() {
        let n = 50_000;
        let cond: Vec<u8> = (0..n).map(|i| (i % 3 == 0) as u8).collect();
        let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..n).map(|i| -(i as f64)).collect();
        let mut dst = vec![0.0f64; n];
        par_ternary(&mut dst, &cond, &a, &b, n, |c, x, y| if c != 0 { x } else { y });
        assert_eq!(dst[3], 3.0);
        assert_eq!(dst[4], -4.0);

        par_unary_inplace(&mut dst, n, |x| x * 2.0);
        assert_eq!(dst[3], 6.0);
        par_binary_inplace(&mut dst, &a, n, |x, y| x + y);
        assert_eq!(dst[4], -4.0);

        par_fill(&mut dst, 1.5, n);
        assert!(dst.iter().all(|&x| x == 1.5));
    }

    #[test]
    fn test_copy_is_idempotent() {
        let src: Vec<i16> = (0..1000).map(|i| (i * 7 % 113) as i16).collect();
        let mut once = vec![0i16; 1000];
        let mut twice = vec![0i16; 1000];
        par_unary(&mut once, &src, 1000, |x| x);
        par_unary(&mut twice, &once, 1000, |x| x);
        assert_eq!(once, src);
        assert_eq!(twice, src);
    }
}
