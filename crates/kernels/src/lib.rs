// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # kernels
//!
//! Numeric kernels over raw, possibly strided, buffers. Nothing in this
//! crate allocates tensors: callers pass destination buffers in, scratch
//! comes from the `memory-manager` pools, and large workloads fan out on
//! the `scheduler` worker pool.
//!
//! # Module Map
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`layout`]      | strides, bounds checks, the shared iteration cursor   |
//! | [`element`]     | the [`Element`] and [`Real`] element traits           |
//! | [`elementwise`] | unary/binary/ternary maps, packed and strided         |
//! | [`convert`]     | saturating element-type conversion                    |
//! | [`blas`]        | levels 1–3 plus batched GEMM/GEMV                     |
//! | [`quant`]       | asymmetric 8-bit quantisation and Q8 GEMM             |
//! | [`lapack`]      | Householder, LU, QR, SVD, pseudo-inverse, NNLS        |
//! | [`window`]      | im2col/col2im, convolution, pooling                   |
//! | [`activation`]  | ReLU, sigmoid, tanh, softmax, dropout                 |
//! | [`norm`]        | batch, layer, RMS, instance, group and L2 norms       |
//! | [`reduce`]      | sum/mean/max/min over axes, argmax/argmin             |
//!
//! Matrices are row-major `(buffer, rows, cols, ld)`. Validating entry
//! points return [`KernelError`]; the low-level elementwise loops trust
//! their callers.
//!
//! # Example
//! ```
//! use kernels::blas::gemm_nn;
//!
//! let a = [1.0f32, 2.0, 3.0, 4.0];
//! let b = [5.0f32, 6.0, 7.0, 8.0];
//! let mut c = [0.0f32; 4];
//! gemm_nn(2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2).unwrap();
//! assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
//! ```

pub mod activation;
pub mod blas;
pub mod convert;
pub mod element;
pub mod elementwise;
pub mod error;
pub mod lapack;
pub mod layout;
pub mod norm;
pub mod quant;
pub mod reduce;
pub mod window;

pub use element::{Element, Real};
pub use error::KernelError;
