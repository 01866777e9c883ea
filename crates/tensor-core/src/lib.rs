// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Dtype-tagged, strided n-dimensional tensors over the `kernels` crate.
//!
//! This crate provides:
//! - [`Tensor`]: a shape, strides and offset over a shared, pooled buffer
//!   of one of the [`DType`]s.
//! - [`Shape`]: runtime shape descriptors.
//! - Elementwise arithmetic, reductions, matrix products and
//!   factorisations, activations, normalisations, convolution and pooling.
//! - [`Parameter`]: a learnable tensor with an accumulated gradient.
//! - [`CoreConfig`]: buffer pool tiers and worker pool settings, from TOML.
//!
//! # Dispatch
//! Every operation validates its operands and destination, then picks a
//! kernel path: the flat loops when everything is packed, the strided
//! walkers otherwise, and the conversion kernels when dtypes differ
//! ([`Tensor::copy_to`], [`Tensor::cast`]). Operations never convert
//! implicitly.
//!
//! ```
//! use tensor_core::{Shape, Tensor};
//!
//! let a = Tensor::from_slice(Shape::matrix(2, 2), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
//! let b = Tensor::from_slice(Shape::matrix(2, 2), &[5.0f32, 6.0, 7.0, 8.0]).unwrap();
//! let mut out = Tensor::zeros(a.dtype(), a.shape().clone()).unwrap();
//! let out = a.add_into(&b, &mut out).unwrap();
//! assert_eq!(out.to_vec::<f32>().unwrap(), vec![6.0, 8.0, 10.0, 12.0]);
//!
//! let c = a.matmul(&b, tensor_core::Trans::No, tensor_core::Trans::No).unwrap();
//! assert_eq!(c.to_vec::<f32>().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
//! ```

mod config;
mod dtype;
mod error;
mod ops;
mod parameter;
mod shape;
mod storage;
mod tensor;

pub use config::CoreConfig;
pub use dtype::DType;
pub use error::TensorError;
pub use kernels::blas::Trans;
pub use ops::{Conv2dGrads, LuFactors, Svd, Window2d};
pub use parameter::Parameter;
pub use shape::Shape;
pub use storage::TensorElement;
pub use tensor::Tensor;
