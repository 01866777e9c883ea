// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed, reference-counted backing buffers and the dtype trampoline.
//!
//! A tensor's buffer is a pooled `Vec<T>` behind an `Arc<RwLock<_>>`, so
//! views share it and the last reference hands it back to the pool. The
//! [`with_dtype!`] family of macros turns a runtime [`DType`] into a
//! statically typed kernel call.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kernels::Element;
use memory_manager::PooledBuffer;

use crate::DType;

pub(crate) type Buffer<T> = Arc<RwLock<PooledBuffer<T>>>;

/// The typed buffer behind a tensor.
#[doc(hidden)]
#[derive(Clone)]
pub enum Storage {
    F32(Buffer<f32>),
    F64(Buffer<f64>),
    I64(Buffer<i64>),
    I32(Buffer<i32>),
    I16(Buffer<i16>),
    I8(Buffer<i8>),
}

macro_rules! each_storage {
    ($s:expr, $buf:ident => $body:expr) => {
        match $s {
            Storage::F32($buf) => $body,
            Storage::F64($buf) => $body,
            Storage::I64($buf) => $body,
            Storage::I32($buf) => $body,
            Storage::I16($buf) => $body,
            Storage::I8($buf) => $body,
        }
    };
}

/// Element types a [`crate::Tensor`] can store.
///
/// Implemented for `f32`, `f64`, `i64`, `i32`, `i16` and `i8`; each maps
/// to one [`DType`].
pub trait TensorElement: Element {
    const DTYPE: DType;

    #[doc(hidden)]
    fn wrap(buf: PooledBuffer<Self>) -> Storage;

    #[doc(hidden)]
    fn buffer_of(storage: &Storage) -> Option<&Buffer<Self>>;
}

macro_rules! tensor_elements {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl TensorElement for $ty {
            const DTYPE: DType = DType::$variant;

            fn wrap(buf: PooledBuffer<Self>) -> Storage {
                Storage::$variant(Arc::new(RwLock::new(buf)))
            }

            fn buffer_of(storage: &Storage) -> Option<&Buffer<Self>> {
                match storage {
                    Storage::$variant(b) => Some(b),
                    _ => None,
                }
            }
        }
    )*};
}

tensor_elements! {
    f32 => F32,
    f64 => F64,
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
}

/// Evaluates `$body` with `$T` bound to the element type of `$dtype`.
macro_rules! with_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::DType::I8 => {
                type $T = i8;
                $body
            }
        }
    };
}

/// Like [`with_dtype!`] for floating point only; other dtypes evaluate to
/// `Err(UnsupportedDType)`.
macro_rules! with_float_dtype {
    ($dtype:expr, $op:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::DType::F64 => {
                type $T = f64;
                $body
            }
            other => Err($crate::TensorError::UnsupportedDType {
                op: $op,
                dtype: other,
            }),
        }
    };
}

pub(crate) use {with_dtype, with_float_dtype};

impl Storage {
    /// A zero-filled buffer of `len` elements drawn from the pool.
    pub(crate) fn zeroed(dtype: DType, len: usize) -> Self {
        with_dtype!(dtype, T => T::wrap(memory_manager::acquire_filled(len, T::default())))
    }

    /// Buffer length in elements.
    pub(crate) fn len(&self) -> usize {
        each_storage!(self, b => b.read().unwrap_or_else(PoisonError::into_inner).len())
    }

    /// Returns `true` if both handles refer to the same buffer.
    pub(crate) fn same_buffer(&self, other: &Storage) -> bool {
        match (self, other) {
            (Storage::F32(a), Storage::F32(b)) => Arc::ptr_eq(a, b),
            (Storage::F64(a), Storage::F64(b)) => Arc::ptr_eq(a, b),
            (Storage::I64(a), Storage::I64(b)) => Arc::ptr_eq(a, b),
            (Storage::I32(a), Storage::I32(b)) => Arc::ptr_eq(a, b),
            (Storage::I16(a), Storage::I16(b)) => Arc::ptr_eq(a, b),
            (Storage::I8(a), Storage::I8(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of live handles to the buffer.
    pub(crate) fn handles(&self) -> usize {
        each_storage!(self, b => Arc::strong_count(b))
    }
}

pub(crate) fn read_lock<T: Copy + Default>(buf: &Buffer<T>) -> RwLockReadGuard<'_, PooledBuffer<T>> {
    buf.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T: Copy + Default>(buf: &Buffer<T>) -> RwLockWriteGuard<'_, PooledBuffer<T>> {
    buf.write().unwrap_or_else(PoisonError::into_inner)
}

/// A packed, read-only run of a tensor's elements: either a window of the
/// shared buffer or a gathered copy.
pub(crate) enum Packed<'a, T: Copy + Default> {
    Shared {
        guard: RwLockReadGuard<'a, PooledBuffer<T>>,
        start: usize,
        len: usize,
    },
    Gathered(PooledBuffer<T>),
}

impl<T: Copy + Default> Deref for Packed<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Packed::Shared { guard, start, len } => &guard[*start..*start + *len],
            Packed::Gathered(buf) => buf,
        }
    }
}

/// A packed destination: either the tensor's own buffer, locked for
/// writing, or a staging buffer that `Tensor::commit` scatters back.
pub(crate) enum PackedOut<'a, T: Copy + Default> {
    Shared {
        guard: RwLockWriteGuard<'a, PooledBuffer<T>>,
        start: usize,
        len: usize,
    },
    Staged(PooledBuffer<T>),
}

impl<T: Copy + Default> Deref for PackedOut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            PackedOut::Shared { guard, start, len } => &guard[*start..*start + *len],
            PackedOut::Staged(buf) => buf,
        }
    }
}

impl<T: Copy + Default> DerefMut for PackedOut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self {
            PackedOut::Shared { guard, start, len } => &mut guard[*start..*start + *len],
            PackedOut::Staged(buf) => buf,
        }
    }
}
