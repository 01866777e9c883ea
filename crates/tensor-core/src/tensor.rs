// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type: construction, views and layout.

use std::borrow::Cow;
use std::fmt;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use kernels::convert::par_convert_strided;
use kernels::elementwise::{fill_strided, par_unary_strided, unary_strided};
use kernels::layout::{self, Strided, StridedMut};
use kernels::Element;
use memory_manager::PooledBuffer;

use crate::storage::{read_lock, with_dtype, write_lock, Buffer, Packed, PackedOut, Storage, TensorElement};
use crate::{DType, Shape, TensorError};

/// An n-dimensional, dtype-tagged view over a shared, pooled buffer.
///
/// Cloning a `Tensor` clones the handle, not the data: both handles see
/// the same elements. [`view`](Tensor::view), [`transpose`](Tensor::transpose)
/// and [`reshape`](Tensor::reshape) (on packed tensors) also share the
/// buffer. The buffer goes back to its pool when the last handle drops.
///
/// # Memory Layout
/// Element `(i₀, …, iₙ)` lives at `offset + Σ iₖ·strides[k]`. Freshly
/// allocated tensors are packed row-major with offset zero.
///
/// # Aliasing
/// A tensor and its views are a single mutable resource. When an
/// operation's destination shares a buffer with one of its sources, the
/// source is copied first, so `x.relu_into(&mut x.clone())` is well defined.
#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    strides: Vec<isize>,
    offset: usize,
    storage: Storage,
}

impl Tensor {
    /// Allocates a zero-filled, packed tensor.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Shape, Tensor};
    /// let t = Tensor::new(DType::F32, Shape::matrix(2, 3)).unwrap();
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// assert!(t.is_contiguous());
    /// ```
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Result<Self, TensorError> {
        let shape = shape.into();
        shape.check_rank("new")?;
        let storage = Storage::zeroed(dtype, shape.num_elements());
        Ok(Self {
            dtype,
            strides: shape.strides(),
            shape,
            offset: 0,
            storage,
        })
    }

    /// Same as [`Tensor::new`].
    pub fn zeros(dtype: DType, shape: impl Into<Shape>) -> Result<Self, TensorError> {
        Self::new(dtype, shape)
    }

    /// Allocates a packed tensor with every element set to `value`
    /// (converted as by [`Tensor::fill`]).
    pub fn full(dtype: DType, shape: impl Into<Shape>, value: f64) -> Result<Self, TensorError> {
        let mut t = Self::new(dtype, shape)?;
        t.fill(value);
        Ok(t)
    }

    /// Copies `data` into a new packed tensor whose dtype is `T`'s.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_slice(Shape::vector(3), &[1.0f32, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    ///
    /// # Errors
    /// Returns [`TensorError::BufferSizeMismatch`] unless
    /// `data.len() == shape.num_elements()`.
    pub fn from_slice<T: TensorElement>(shape: impl Into<Shape>, data: &[T]) -> Result<Self, TensorError> {
        let shape = shape.into();
        shape.check_rank("from_slice")?;
        let n = shape.num_elements();
        if data.len() != n {
            return Err(TensorError::BufferSizeMismatch {
                expected: n,
                actual: data.len(),
            });
        }
        let mut buf = memory_manager::acquire::<T>(n);
        buf.copy_from_slice(data);
        Ok(Self {
            dtype: T::DTYPE,
            strides: shape.strides(),
            shape,
            offset: 0,
            storage: T::wrap(buf),
        })
    }

    /// A rank-0 tensor holding `value`.
    pub fn scalar<T: TensorElement>(value: T) -> Self {
        let mut buf = memory_manager::acquire::<T>(1);
        buf[0] = value;
        Self {
            dtype: T::DTYPE,
            shape: Shape::scalar(),
            strides: Vec::new(),
            offset: 0,
            storage: T::wrap(buf),
        }
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the extents as a slice.
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Logical size in bytes (elements × element size).
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Element strides, one per axis.
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Offset of element `(0, …, 0)` in the backing buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` if the strides are packed row-major for the shape.
    pub fn is_contiguous(&self) -> bool {
        layout::is_contiguous(&self.strides, self.shape.dims())
    }

    /// Returns `true` if both tensors view the same buffer.
    pub fn shares_buffer(&self, other: &Tensor) -> bool {
        self.storage.same_buffer(&other.storage)
    }

    /// A tensor over this tensor's buffer with another layout. `offset` is
    /// relative to this tensor's own offset; empty `strides` means packed.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_slice(Shape::matrix(2, 3), &[1, 2, 3, 4, 5, 6i32]).unwrap();
    /// let col = t.view(Shape::vector(2), &[3], 1).unwrap();
    /// assert_eq!(col.to_vec::<i32>().unwrap(), vec![2, 5]);
    /// ```
    ///
    /// # Errors
    /// Returns [`TensorError::ViewOutOfBounds`] if any addressed element
    /// falls outside the buffer.
    pub fn view(&self, shape: impl Into<Shape>, strides: &[isize], offset: usize) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        shape.check_rank("view")?;
        let strides = if strides.is_empty() {
            shape.strides()
        } else if strides.len() == shape.rank() {
            strides.to_vec()
        } else {
            return Err(TensorError::BadDimensions {
                op: "view",
                detail: format!("{} strides for shape {shape}", strides.len()),
            });
        };
        let base = self.offset + offset;
        let len = self.storage.len();
        if !layout::fits(len, base, shape.dims(), &strides) {
            return Err(TensorError::ViewOutOfBounds {
                detail: format!(
                    "shape {shape} with strides {strides:?} at offset {base} exceeds a buffer of {len} elements"
                ),
            });
        }
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            strides,
            offset: base,
            storage: self.storage.clone(),
        })
    }

    /// A view with axes `d0` and `d1` swapped.
    pub fn transpose(&self, d0: usize, d1: usize) -> Result<Tensor, TensorError> {
        self.shape.axis("transpose", d0)?;
        self.shape.axis("transpose", d1)?;
        let mut dims = self.shape.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.swap(d0, d1);
        strides.swap(d0, d1);
        Ok(Tensor {
            dtype: self.dtype,
            shape: Shape::new(dims),
            strides,
            offset: self.offset,
            storage: self.storage.clone(),
        })
    }

    /// The same elements under another shape. Packed tensors are reshaped
    /// as a view; strided ones are copied first.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor, TensorError> {
        let shape = shape.into();
        shape.check_rank("reshape")?;
        if shape.num_elements() != self.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        let base = if self.is_contiguous() {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(self.to_contiguous()?)
        };
        Ok(Tensor {
            dtype: base.dtype,
            strides: shape.strides(),
            shape,
            offset: base.offset,
            storage: base.storage.clone(),
        })
    }

    /// A packed copy in a fresh buffer.
    pub fn to_contiguous(&self) -> Result<Tensor, TensorError> {
        let mut out = self.alloc_like()?;
        self.copy_to(&mut out)?;
        Ok(out)
    }

    /// Copies every element into `out`, converting when the dtypes differ.
    ///
    /// # Errors
    /// Returns [`TensorError::ShapeMismatch`] if the shapes differ.
    pub fn copy_to<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "copy_to";
        if self.shape != out.shape {
            return Err(TensorError::ShapeMismatch {
                op: OP,
                lhs: self.shape.clone(),
                rhs: out.shape.clone(),
            });
        }
        let src = self.unaliased(out)?;
        if src.dtype == out.dtype {
            tracing::trace!(op = OP, path = dispatch_path(&[&*src, &*out]), "copy");
            with_dtype!(src.dtype, T => {
                let s = src.read::<T>(OP)?;
                let mut d = out.write::<T>(OP)?;
                par_unary_strided(out.strided_mut(&mut d[..]), src.strided(&s[..]), out.dims(), |x: T| x);
            });
        } else {
            tracing::trace!(op = OP, from = %src.dtype, to = %out.dtype, path = "conversion", "copy");
            with_dtype!(src.dtype, S => with_dtype!(out.dtype, D => {
                let s = src.read::<S>(OP)?;
                let mut d = out.write::<D>(OP)?;
                par_convert_strided::<D, S>(out.strided_mut(&mut d[..]), src.strided(&s[..]), out.dims());
            }));
        }
        Ok(out)
    }

    /// A packed copy converted to `dtype`. Narrowing to an integer type
    /// truncates toward zero and saturates.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Shape, Tensor};
    /// let t = Tensor::from_slice(Shape::vector(3), &[1.9f32, -300.0, 7.0]).unwrap();
    /// let q = t.cast(DType::I8).unwrap();
    /// assert_eq!(q.to_vec::<i8>().unwrap(), vec![1, -128, 7]);
    /// ```
    pub fn cast(&self, dtype: DType) -> Result<Tensor, TensorError> {
        let mut out = Tensor::new(dtype, self.shape.clone())?;
        self.copy_to(&mut out)?;
        Ok(out)
    }

    /// Sets every element to `value`, converted to the tensor's dtype.
    pub fn fill(&mut self, value: f64) -> &mut Self {
        with_dtype!(self.dtype, T => {
            let v = T::of_f64(value);
            if let Some(buf) = T::buffer_of(&self.storage) {
                let mut d = write_lock(buf);
                fill_strided(self.strided_mut(&mut d[..]), v, self.shape.dims());
            }
        });
        self
    }

    /// The elements in row-major order.
    ///
    /// # Errors
    /// Returns [`TensorError::DTypeMismatch`] if `T` is not this tensor's
    /// element type.
    pub fn to_vec<T: TensorElement>(&self) -> Result<Vec<T>, TensorError> {
        Ok(self.packed::<T>("to_vec")?.to_vec())
    }

    /// The element at `index`.
    pub fn at<T: TensorElement>(&self, index: &[usize]) -> Result<T, TensorError> {
        const OP: &str = "at";
        if index.len() != self.rank() || index.iter().zip(self.dims()).any(|(&i, &d)| i >= d) {
            return Err(TensorError::BadDimensions {
                op: OP,
                detail: format!("index {index:?} out of range for shape {}", self.shape),
            });
        }
        let data = self.read::<T>(OP)?;
        let at = self.offset as isize + layout::offset_of(index, &self.strides);
        Ok(data[at as usize])
    }

    pub(crate) fn alloc_like(&self) -> Result<Tensor, TensorError> {
        Tensor::new(self.dtype, self.shape.clone())
    }

    pub(crate) fn buffer<T: TensorElement>(&self, op: &'static str) -> Result<&Buffer<T>, TensorError> {
        T::buffer_of(&self.storage).ok_or(TensorError::DTypeMismatch {
            op,
            expected: T::DTYPE,
            actual: self.dtype,
        })
    }

    pub(crate) fn read<T: TensorElement>(
        &self,
        op: &'static str,
    ) -> Result<RwLockReadGuard<'_, PooledBuffer<T>>, TensorError> {
        Ok(read_lock(self.buffer::<T>(op)?))
    }

    pub(crate) fn write<T: TensorElement>(
        &self,
        op: &'static str,
    ) -> Result<RwLockWriteGuard<'_, PooledBuffer<T>>, TensorError> {
        Ok(write_lock(self.buffer::<T>(op)?))
    }

    /// This tensor's layout over `data` (its locked buffer).
    pub(crate) fn strided<'a, T>(&'a self, data: &'a [T]) -> Strided<'a, T> {
        Strided::new(data, self.offset, &self.strides)
    }

    pub(crate) fn strided_mut<'a, T>(&'a self, data: &'a mut [T]) -> StridedMut<'a, T> {
        StridedMut::new(data, self.offset, &self.strides)
    }

    /// `self`, or a packed copy of it if it shares a buffer with `dst`.
    pub(crate) fn unaliased<'a>(&'a self, dst: &Tensor) -> Result<Cow<'a, Tensor>, TensorError> {
        if self.shares_buffer(dst) {
            tracing::trace!(shape = %self.shape, "materialising source aliased with destination");
            return Ok(Cow::Owned(self.to_contiguous()?));
        }
        Ok(Cow::Borrowed(self))
    }

    /// The elements as one packed run, borrowed when the layout allows.
    pub(crate) fn packed<T: TensorElement>(&self, op: &'static str) -> Result<Packed<'_, T>, TensorError> {
        if self.is_contiguous() {
            return Ok(Packed::Shared {
                guard: self.read::<T>(op)?,
                start: self.offset,
                len: self.num_elements(),
            });
        }
        self.gather(op)
    }

    /// Like [`Tensor::packed`], but always copies when `dst` shares the
    /// buffer, so `dst` can be locked for writing afterwards.
    pub(crate) fn packed_for<T: TensorElement>(
        &self,
        op: &'static str,
        dst: &Tensor,
    ) -> Result<Packed<'_, T>, TensorError> {
        if self.shares_buffer(dst) {
            return self.gather(op);
        }
        self.packed(op)
    }

    fn gather<T: TensorElement>(&self, op: &'static str) -> Result<Packed<'_, T>, TensorError> {
        let n = self.num_elements();
        let mut buf = memory_manager::acquire::<T>(n);
        let packed = layout::packed_strides(self.dims());
        {
            let s = self.read::<T>(op)?;
            unary_strided(
                StridedMut::new(&mut buf[..], 0, &packed),
                self.strided(&s[..]),
                self.dims(),
                |x: T| x,
            );
        }
        Ok(Packed::Gathered(buf))
    }

    /// A packed destination for a kernel that cannot write strided output.
    /// Finish with [`Tensor::commit`].
    pub(crate) fn packed_out<T: TensorElement>(&self, op: &'static str) -> Result<PackedOut<'_, T>, TensorError> {
        if self.is_contiguous() {
            return Ok(PackedOut::Shared {
                guard: self.write::<T>(op)?,
                start: self.offset,
                len: self.num_elements(),
            });
        }
        self.buffer::<T>(op)?;
        tracing::trace!(op, shape = %self.shape, "staging strided destination");
        Ok(PackedOut::Staged(memory_manager::acquire_filled(
            self.num_elements(),
            T::default(),
        )))
    }

    /// Writes a staged destination back through this tensor's layout.
    pub(crate) fn commit<T: TensorElement>(&self, out: PackedOut<'_, T>, op: &'static str) -> Result<(), TensorError> {
        if let PackedOut::Staged(buf) = out {
            let packed = layout::packed_strides(self.dims());
            let mut d = self.write::<T>(op)?;
            unary_strided(
                self.strided_mut(&mut d[..]),
                Strided::new(&buf[..], 0, &packed),
                self.dims(),
                |x: T| x,
            );
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape.dims())
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("handles", &self.storage.handles())
            .finish()
    }
}

/// `"contiguous"` when every operand is packed, `"strided"` otherwise.
pub(crate) fn dispatch_path(operands: &[&Tensor]) -> &'static str {
    if operands.iter().all(|t| t.is_contiguous()) {
        "contiguous"
    } else {
        "strided"
    }
}

/// Validates a user-supplied destination against the expected result.
pub(crate) fn check_destination(
    op: &'static str,
    out: &Tensor,
    dtype: DType,
    shape: &Shape,
) -> Result<(), TensorError> {
    if out.dtype != dtype {
        return Err(TensorError::DTypeMismatch {
            op,
            expected: dtype,
            actual: out.dtype,
        });
    }
    if out.shape != *shape {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: shape.clone(),
            rhs: out.shape.clone(),
        });
    }
    Ok(())
}

/// Requires `b` to have `a`'s dtype and shape.
pub(crate) fn check_operands(op: &'static str, a: &Tensor, b: &Tensor) -> Result<(), TensorError> {
    if a.dtype != b.dtype {
        return Err(TensorError::DTypeMismatch {
            op,
            expected: a.dtype,
            actual: b.dtype,
        });
    }
    if a.shape != b.shape {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: a.shape.clone(),
            rhs: b.shape.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed_and_packed() {
        let t = Tensor::new(DType::F64, Shape::matrix(2, 3)).unwrap();
        assert_eq!(t.size_bytes(), 48);
        assert_eq!(t.strides(), &[3, 1]);
        assert!(t.to_vec::<f64>().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_slice_size_mismatch() {
        let result = Tensor::from_slice(Shape::matrix(2, 3), &[0.0f32; 5]);
        assert_eq!(
            result.unwrap_err(),
            TensorError::BufferSizeMismatch {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_to_vec_wrong_type() {
        let t = Tensor::from_slice(Shape::vector(2), &[1i16, 2]).unwrap();
        assert!(matches!(t.to_vec::<f32>(), Err(TensorError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_view_shares_buffer() {
        let t = Tensor::from_slice(Shape::matrix(2, 2), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let mut row = t.view(Shape::vector(2), &[], 2).unwrap();
        row.fill(9.0);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 9.0, 9.0]);
        assert!(row.shares_buffer(&t));
    }

    #[test]
    fn test_view_out_of_bounds() {
        let t = Tensor::new(DType::I32, Shape::vector(4)).unwrap();
        assert!(matches!(
            t.view(Shape::vector(3), &[2], 0),
            Err(TensorError::ViewOutOfBounds { .. })
        ));
        assert!(t.view(Shape::vector(2), &[1, 1], 0).is_err());
        assert!(t.view(Shape::vector(2), &[-1], 3).is_ok());
    }

    #[test]
    fn test_transpose_and_gather() {
        let t = Tensor::from_slice(Shape::matrix(2, 3), &[1, 2, 3, 4, 5, 6i64]).unwrap();
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.dims(), &[3, 2]);
        assert!(!tt.is_contiguous());
        assert_eq!(tt.to_vec::<i64>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
        assert_eq!(tt.at::<i64>(&[2, 1]).unwrap(), 6);
        assert!(t.transpose(0, 2).is_err());
    }

    #[test]
    fn test_reshape_view_and_copy() {
        let t = Tensor::from_slice(Shape::matrix(2, 3), &[1, 2, 3, 4, 5, 6i32]).unwrap();
        let r = t.reshape([3, 2]).unwrap();
        assert!(r.shares_buffer(&t));
        let rt = t.transpose(0, 1).unwrap().reshape([6]).unwrap();
        assert!(!rt.shares_buffer(&t));
        assert_eq!(rt.to_vec::<i32>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
        assert!(matches!(t.reshape([4]), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_cast_round_trip_widening() {
        let t = Tensor::from_slice(Shape::vector(3), &[-7i16, 0, 300]).unwrap();
        let wide = t.cast(DType::F64).unwrap();
        let back = wide.cast(DType::I16).unwrap();
        assert_eq!(back.to_vec::<i16>().unwrap(), vec![-7, 0, 300]);
    }

    #[test]
    fn test_copy_to_strided_destination() {
        let src = Tensor::from_slice(Shape::matrix(2, 2), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let dst = Tensor::new(DType::F32, Shape::matrix(2, 2)).unwrap();
        let mut dst_t = dst.transpose(0, 1).unwrap();
        src.copy_to(&mut dst_t).unwrap();
        assert_eq!(dst.to_vec::<f32>().unwrap(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_copy_to_aliased_source() {
        // Shift a buffer left by one through overlapping views.
        let t = Tensor::from_slice(Shape::vector(4), &[1, 2, 3, 4i32]).unwrap();
        let src = t.view(Shape::vector(3), &[], 1).unwrap();
        let mut dst = t.view(Shape::vector(3), &[], 0).unwrap();
        src.copy_to(&mut dst).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![2, 3, 4, 4]);
    }

    #[test]
    fn test_copy_is_idempotent() {
        let t = Tensor::from_slice(Shape::vector(3), &[0.5f64, -1.0, 2.0]).unwrap();
        let once = t.to_contiguous().unwrap();
        let twice = once.to_contiguous().unwrap();
        assert_eq!(twice.to_vec::<f64>().unwrap(), t.to_vec::<f64>().unwrap());
    }

    #[test]
    fn test_full_and_scalar() {
        let t = Tensor::full(DType::I8, [2, 2], 200.0).unwrap();
        assert_eq!(t.to_vec::<i8>().unwrap(), vec![127; 4]);
        let s = Tensor::scalar(3.5f32);
        assert_eq!(s.rank(), 0);
        assert_eq!(s.at::<f32>(&[]).unwrap(), 3.5);
    }

    #[test]
    fn test_empty_tensor_operations() {
        let t = Tensor::new(DType::F32, [0, 4]).unwrap();
        assert_eq!(t.num_elements(), 0);
        assert!(t.to_vec::<f32>().unwrap().is_empty());
        let c = t.cast(DType::I64).unwrap();
        assert_eq!(c.dims(), &[0, 4]);
    }
}
