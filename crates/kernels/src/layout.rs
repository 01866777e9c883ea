// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape and stride arithmetic.
//!
//! Everything here works on plain `&[usize]` shapes and `&[isize]` strides
//! and never touches the heap: stride sets up to [`MAX_DIMS`] live in the
//! fixed-size [`Strides`] buffer, and the iteration cursor used by
//! [`advance`] is a caller-owned stack array.
//!
//! Strides are in elements and may be negative. A strided operand is a
//! buffer, a base offset into it, and one stride per axis.

use std::ops::Deref;

/// Highest tensor rank supported without heap allocation.
pub const MAX_DIMS: usize = 16;

/// A stack-allocated stride set of rank `≤ MAX_DIMS`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Strides {
    buf: [isize; MAX_DIMS],
    len: usize,
}

impl Strides {
    /// Copies `strides` into a stack buffer.
    ///
    /// # Panics
    /// Panics if `strides.len() > MAX_DIMS`.
    pub fn from_slice(strides: &[isize]) -> Self {
        assert!(
            strides.len() <= MAX_DIMS,
            "rank {} exceeds MAX_DIMS ({MAX_DIMS})",
            strides.len()
        );
        let mut buf = [0isize; MAX_DIMS];
        buf[..strides.len()].copy_from_slice(strides);
        Self {
            buf,
            len: strides.len(),
        }
    }

    /// Returns the strides as a slice.
    pub fn as_slice(&self) -> &[isize] {
        &self.buf[..self.len]
    }
}

impl Deref for Strides {
    type Target = [isize];

    fn deref(&self) -> &[isize] {
        self.as_slice()
    }
}

impl std::fmt::Debug for Strides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Product of extents. An empty shape has one element.
#[inline]
pub fn size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Writes packed row-major strides for `shape` into `out[..shape.len()]`.
///
/// # Panics
/// Panics if `out` is shorter than `shape`.
#[inline]
pub fn packed_strides_into(shape: &[usize], out: &mut [isize]) {
    let mut acc = 1isize;
    for (o, &d) in out[..shape.len()].iter_mut().zip(shape).rev() {
        *o = acc;
        acc *= d as isize;
    }
}

/// Packed row-major strides: the last axis gets 1, each preceding axis the
/// product of the extents after it.
///
/// ```
/// use kernels::layout::packed_strides;
/// assert_eq!(&*packed_strides(&[2, 3, 4]), &[12, 4, 1]);
/// ```
///
/// # Panics
/// Panics if `shape.len() > MAX_DIMS`.
pub fn packed_strides(shape: &[usize]) -> Strides {
    let mut s = Strides::from_slice(&[0; MAX_DIMS][..shape.len()]);
    packed_strides_into(shape, &mut s.buf);
    s
}

/// Returns `provided` if it has one stride per axis, otherwise the packed
/// strides for `shape`.
pub fn ensure_strides(provided: &[isize], shape: &[usize]) -> Strides {
    if provided.len() == shape.len() {
        Strides::from_slice(provided)
    } else {
        packed_strides(shape)
    }
}

/// Returns `true` if `strides` are the packed row-major strides for `shape`.
///
/// Axes of extent 1 are ignored, and a shape with a zero extent is
/// trivially contiguous.
pub fn is_contiguous(strides: &[isize], shape: &[usize]) -> bool {
    if strides.len() != shape.len() {
        return false;
    }
    if shape.iter().any(|&d| d == 0) {
        return true;
    }
    let mut expected = 1isize;
    for (&s, &d) in strides.iter().zip(shape).rev() {
        if d != 1 && s != expected {
            return false;
        }
        expected *= d as isize;
    }
    true
}

/// Element offset of `indices` under `strides` (their dot product).
#[inline]
pub fn offset_of(indices: &[usize], strides: &[isize]) -> isize {
    indices
        .iter()
        .zip(strides)
        .map(|(&i, &s)| i as isize * s)
        .sum()
}

/// Smallest and largest offset (relative to the base) reachable by a
/// non-empty `shape` under `strides`.
pub fn span(shape: &[usize], strides: &[isize]) -> (isize, isize) {
    let mut lo = 0isize;
    let mut hi = 0isize;
    for (&d, &s) in shape.iter().zip(strides) {
        let reach = (d.saturating_sub(1)) as isize * s;
        if reach < 0 {
            lo += reach;
        } else {
            hi += reach;
        }
    }
    (lo, hi)
}

/// Returns `true` if every element addressed by (`offset`, `shape`,
/// `strides`) lies inside a buffer of length `len`.
pub fn fits(len: usize, offset: usize, shape: &[usize], strides: &[isize]) -> bool {
    if size(shape) == 0 {
        return true;
    }
    let (lo, hi) = span(shape, strides);
    let base = offset as isize;
    base + lo >= 0 && ((base + hi) as usize) < len
}

/// Steps `cursor` to the next position in row-major order, moving every
/// `offsets[k]` by `strides[k]` along the way.
///
/// Returns `false` once the cursor wraps past the last position; the
/// offsets are then back at their starting values. `K` parallel stride
/// sets share one cursor, so a binary kernel calls `advance::<3>` for its
/// destination and two sources.
#[inline]
pub fn advance<const K: usize>(
    shape: &[usize],
    cursor: &mut [usize],
    offsets: &mut [isize; K],
    strides: [&[isize]; K],
) -> bool {
    for d in (0..shape.len()).rev() {
        cursor[d] += 1;
        if cursor[d] < shape[d] {
            for k in 0..K {
                offsets[k] += strides[k][d];
            }
            return true;
        }
        let back = (shape[d] - 1) as isize;
        for k in 0..K {
            offsets[k] -= strides[k][d] * back;
        }
        cursor[d] = 0;
    }
    false
}

/// A read-only strided operand.
#[derive(Debug, Clone, Copy)]
pub struct Strided<'a, T> {
    pub data: &'a [T],
    pub offset: usize,
    pub strides: &'a [isize],
}

impl<'a, T> Strided<'a, T> {
    pub fn new(data: &'a [T], offset: usize, strides: &'a [isize]) -> Self {
        Self {
            data,
            offset,
            strides,
        }
    }

    /// A packed view over the whole of `data`.
    pub fn packed(data: &'a [T], strides: &'a [isize]) -> Self {
        Self::new(data, 0, strides)
    }

    /// Returns `true` if the operand is packed row-major for `shape`.
    pub fn is_contiguous(&self, shape: &[usize]) -> bool {
        is_contiguous(self.strides, shape)
    }

    /// The `n` elements starting at the base offset.
    pub fn flat(&self, n: usize) -> &'a [T] {
        &self.data[self.offset..self.offset + n]
    }

    /// The same operand with its base moved by `delta` elements.
    pub fn shifted(&self, delta: isize) -> Self {
        Self {
            offset: (self.offset as isize + delta) as usize,
            ..*self
        }
    }
}

/// A mutable strided operand.
#[derive(Debug)]
pub struct StridedMut<'a, T> {
    pub data: &'a mut [T],
    pub offset: usize,
    pub strides: &'a [isize],
}

impl<'a, T> StridedMut<'a, T> {
    pub fn new(data: &'a mut [T], offset: usize, strides: &'a [isize]) -> Self {
        Self {
            data,
            offset,
            strides,
        }
    }

    /// Returns `true` if the operand is packed row-major for `shape`.
    pub fn is_contiguous(&self, shape: &[usize]) -> bool {
        is_contiguous(self.strides, shape)
    }

    /// Reborrows the operand for a shorter lifetime.
    pub fn reborrow(&mut self) -> StridedMut<'_, T> {
        StridedMut {
            data: &mut *self.data,
            offset: self.offset,
            strides: self.strides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(size(&[]), 1);
        assert_eq!(size(&[2, 3, 4]), 24);
        assert_eq!(size(&[5, 0, 2]), 0);
    }

    #[test]
    fn test_packed_strides_recurrence() {
        let shape = [3, 1, 4, 2];
        let s = packed_strides(&shape);
        assert_eq!(s[shape.len() - 1], 1);
        for i in 0..shape.len() - 1 {
            assert_eq!(s[i], s[i + 1] * shape[i + 1] as isize);
        }
        assert!(packed_strides(&[]).is_empty());
    }

    #[test]
    fn test_is_contiguous() {
        let shape = [2, 3];
        assert!(is_contiguous(&packed_strides(&shape), &shape));
        assert!(!is_contiguous(&[1, 2], &shape));
        assert!(is_contiguous(&[99, 1], &[1, 5]));
        assert!(!is_contiguous(&[1], &shape));
        assert!(is_contiguous(&[], &[]));
    }

    #[test]
    fn test_ensure_strides() {
        assert_eq!(&*ensure_strides(&[], &[2, 2]), &[2, 1]);
        assert_eq!(&*ensure_strides(&[1, 2], &[2, 2]), &[1, 2]);
    }

    #[test]
    fn test_offset_of() {
        assert_eq!(offset_of(&[1, 2], &[4, 1]), 6);
        assert_eq!(offset_of(&[1, 1], &[-3, 1]), -2);
    }

    #[test]
    fn test_span_and_fits() {
        assert_eq!(span(&[2, 3], &[3, 1]), (0, 5));
        assert_eq!(span(&[3], &[-2]), (-4, 0));
        assert!(fits(6, 0, &[2, 3], &[3, 1]));
        assert!(!fits(5, 0, &[2, 3], &[3, 1]));
        assert!(fits(5, 4, &[3], &[-2]));
        assert!(!fits(5, 3, &[3], &[-2]));
        assert!(fits(0, 10, &[0, 3], &[3, 1]));
    }

    #[test]
    fn test_advance_visits_row_major() {
        let shape = [2, 3];
        let mut cursor = [0usize; MAX_DIMS];
        let packed: &[isize] = &[3, 1];
        let transposed: &[isize] = &[1, 2];
        let mut offsets = [0isize, 0];
        let mut seen = vec![offsets];
        while advance(&shape, &mut cursor[..2], &mut offsets, [packed, transposed]) {
            seen.push(offsets);
        }
        let first: Vec<isize> = seen.iter().map(|o| o[0]).collect();
        let second: Vec<isize> = seen.iter().map(|o| o[1]).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(second, vec![0, 2, 4, 1, 3, 5]);
        assert_eq!(offsets, [0, 0]);
    }

    #[test]
    fn test_advance_rank_zero() {
        let none: &[isize] = &[];
        let mut offsets = [7isize];
        assert!(!advance(&[], &mut [], &mut offsets, [none]));
        assert_eq!(offsets, [7]);
    }
}
