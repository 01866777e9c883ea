// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use std::fmt;

use kernels::layout::{self, MAX_DIMS};

use crate::TensorError;

/// Describes the dimensionality of a [`crate::Tensor`].
///
/// A rank-0 shape is a scalar with one element; a shape containing a zero
/// extent has no elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        layout::size(&self.dims)
    }

    /// Returns `true` if some extent is zero.
    pub fn is_empty(&self) -> bool {
        self.num_elements() == 0
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: super::DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Computes packed row-major (C-order) strides for this shape.
    pub fn strides(&self) -> Vec<isize> {
        let mut strides = vec![0isize; self.rank()];
        layout::packed_strides_into(&self.dims, &mut strides);
        strides
    }

    /// Returns `true` if the shapes are compatible for a matrix multiply:
    /// `self` is `[M, K]` and `other` is `[K, N]`.
    pub fn is_matmul_compatible(&self, other: &Shape) -> bool {
        self.rank() == 2 && other.rank() == 2 && self.dims[1] == other.dims[0]
    }

    /// Checks that the rank fits the kernels' stack buffers.
    pub(crate) fn check_rank(&self, op: &'static str) -> Result<(), TensorError> {
        if self.rank() > MAX_DIMS {
            return Err(TensorError::BadDimensions {
                op,
                detail: format!("rank {} exceeds {MAX_DIMS}", self.rank()),
            });
        }
        Ok(())
    }

    /// Resolves `axis` against this shape.
    pub(crate) fn axis(&self, op: &'static str, axis: usize) -> Result<usize, TensorError> {
        if axis >= self.rank() {
            return Err(TensorError::BadDimensions {
                op,
                detail: format!("axis {axis} out of range for shape {self}"),
            });
        }
        Ok(axis)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

/// Convenience: `Shape::from(&[2, 3][..])`.
impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_zero_extent_is_empty() {
        let s = Shape::new(vec![3, 0, 2]);
        assert_eq!(s.num_elements(), 0);
        assert!(s.is_empty());
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.num_elements(), 12);
        assert_eq!(s.strides(), vec![4, 1]);
        assert_eq!(s.size_bytes(DType::F32), 48);
        assert_eq!(s.size_bytes(DType::F64), 96);
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_matmul_compatible() {
        let a = Shape::matrix(3, 4);
        let b = Shape::matrix(4, 5);
        assert!(a.is_matmul_compatible(&b));

        let c = Shape::matrix(5, 5);
        assert!(!a.is_matmul_compatible(&c));
    }

    #[test]
    fn test_rank_limit() {
        let s = Shape::new(vec![1; MAX_DIMS + 1]);
        assert!(matches!(s.check_rank("test"), Err(TensorError::BadDimensions { .. })));
        assert!(Shape::new(vec![1; MAX_DIMS]).check_rank("test").is_ok());
    }

    #[test]
    fn test_display() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(format!("{s}"), "[2, 3, 4]");
    }

    #[test]
    fn test_from_conversions() {
        let s1: Shape = vec![2, 3].into();
        let s2: Shape = (&[2, 3][..]).into();
        let s3: Shape = [2, 3].into();
        assert_eq!(s1, s2);
        assert_eq!(s2, s3);
    }
}
