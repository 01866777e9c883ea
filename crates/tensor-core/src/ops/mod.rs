// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor operations.
//!
//! Every operation comes in two forms: `op(..)` allocates its result from
//! the buffer pool, and `op_into(.., out)` writes into a caller-supplied
//! destination (validated for dtype and shape, possibly a strided view)
//! and returns it for chaining. Sources that share a buffer with the
//! destination are copied before the kernel runs.

mod activation;
mod elementwise;
mod linalg;
mod norm;
mod reduce;
mod window;

pub use linalg::{LuFactors, Svd};
pub use window::{Conv2dGrads, Window2d};
