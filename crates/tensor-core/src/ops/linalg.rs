// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix products and factorisations.
//!
//! 2-D operands whose rows or columns are unit-stride go to the BLAS
//! kernels in place, with the leading dimension taken from the other
//! stride; a column-major operand is passed as the transpose of its
//! storage. Anything else is packed first.

use std::borrow::Cow;

use kernels::blas::{self, Trans};
use kernels::{lapack, Element};
use num_traits::{One, Zero};

use crate::storage::{with_dtype, with_float_dtype, TensorElement};
use crate::tensor::{check_destination, check_operands, dispatch_path};
use crate::{DType, Shape, Tensor, TensorError};

fn flip(trans: Trans) -> Trans {
    match trans {
        Trans::No => Trans::Yes,
        Trans::Yes => Trans::No,
    }
}

fn require_rank(op: &'static str, t: &Tensor, rank: usize) -> Result<(), TensorError> {
    if t.rank() != rank {
        return Err(TensorError::BadDimensions {
            op,
            detail: format!("expected a rank-{rank} tensor, got shape {}", t.shape()),
        });
    }
    Ok(())
}

fn require_dtype(op: &'static str, a: &Tensor, b: &Tensor) -> Result<(), TensorError> {
    if a.dtype() != b.dtype() {
        return Err(TensorError::DTypeMismatch {
            op,
            expected: a.dtype(),
            actual: b.dtype(),
        });
    }
    Ok(())
}

/// A matrix as the BLAS kernels address it: stored row-major from the
/// tensor's offset with leading dimension `ld`, used as `op(stored)`.
struct Operand<'a> {
    tensor: Cow<'a, Tensor>,
    trans: Trans,
    ld: usize,
}

impl<'a> Operand<'a> {
    fn new(t: &'a Tensor, trans: Trans, dst: &Tensor) -> Result<Self, TensorError> {
        let (rows, cols) = (t.dims()[0], t.dims()[1]);
        let (s0, s1) = (t.strides()[0], t.strides()[1]);
        if !t.shares_buffer(dst) {
            if s1 == 1 && s0 >= cols.max(1) as isize {
                return Ok(Self {
                    tensor: Cow::Borrowed(t),
                    trans,
                    ld: s0 as usize,
                });
            }
            if s0 == 1 && s1 >= rows.max(1) as isize {
                return Ok(Self {
                    tensor: Cow::Borrowed(t),
                    trans: flip(trans),
                    ld: s1 as usize,
                });
            }
        }
        Ok(Self {
            tensor: Cow::Owned(t.to_contiguous()?),
            trans,
            ld: cols.max(1),
        })
    }
}

fn from_offset<T>(data: &[T], offset: usize) -> &[T] {
    data.get(offset..).unwrap_or(&[])
}

/// Read access to two operands that may share one buffer.
fn read_pair<T: TensorElement, R>(
    op: &'static str,
    a: &Tensor,
    b: &Tensor,
    f: impl FnOnce(&[T], &[T]) -> R,
) -> Result<R, TensorError> {
    let ga = a.read::<T>(op)?;
    if b.shares_buffer(a) {
        return Ok(f(&ga, &ga));
    }
    let gb = b.read::<T>(op)?;
    Ok(f(&ga, &gb))
}

fn matmul_dims(
    op: &'static str,
    a: &Tensor,
    b: &Tensor,
    trans_a: Trans,
    trans_b: Trans,
) -> Result<(usize, usize, usize), TensorError> {
    let r = a.rank();
    let (m, k) = match trans_a {
        Trans::No => (a.dims()[r - 2], a.dims()[r - 1]),
        Trans::Yes => (a.dims()[r - 1], a.dims()[r - 2]),
    };
    let (k2, n) = match trans_b {
        Trans::No => (b.dims()[r - 2], b.dims()[r - 1]),
        Trans::Yes => (b.dims()[r - 1], b.dims()[r - 2]),
    };
    if k != k2 || (r == 3 && a.dims()[0] != b.dims()[0]) {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    Ok((m, n, k))
}

fn matmul_shape(op: &'static str, a: &Tensor, b: &Tensor, ta: Trans, tb: Trans) -> Result<Shape, TensorError> {
    if !(a.rank() == 2 || a.rank() == 3) || a.rank() != b.rank() {
        return Err(TensorError::BadDimensions {
            op,
            detail: format!("matmul needs two rank-2 or two rank-3 tensors, got {} and {}", a.shape(), b.shape()),
        });
    }
    let (m, n, _) = matmul_dims(op, a, b, ta, tb)?;
    Ok(if a.rank() == 3 {
        Shape::new(vec![a.dims()[0], m, n])
    } else {
        Shape::matrix(m, n)
    })
}

fn gemm_into<T: TensorElement>(
    a: &Tensor,
    b: &Tensor,
    trans_a: Trans,
    trans_b: Trans,
    out: &Tensor,
) -> Result<(), TensorError> {
    const OP: &str = "matmul";
    let (m, n, k) = matmul_dims(OP, a, b, trans_a, trans_b)?;
    let lhs = Operand::new(a, trans_a, out)?;
    let rhs = Operand::new(b, trans_b, out)?;
    tracing::trace!(op = OP, m, n, k, path = dispatch_path(&[a, b, out]), "gemm");
    let mut c = out.packed_out::<T>(OP)?;
    read_pair::<T, _>(OP, &lhs.tensor, &rhs.tensor, |ga, gb| {
        blas::gemm(
            lhs.trans,
            rhs.trans,
            m,
            n,
            k,
            T::one(),
            from_offset(ga, lhs.tensor.offset()),
            lhs.ld,
            from_offset(gb, rhs.tensor.offset()),
            rhs.ld,
            T::zero(),
            &mut c[..],
            n.max(1),
        )
    })??;
    out.commit(c, OP)
}

fn batched_gemm_into<T: TensorElement>(
    a: &Tensor,
    b: &Tensor,
    trans_a: Trans,
    trans_b: Trans,
    out: &Tensor,
) -> Result<(), TensorError> {
    const OP: &str = "matmul";
    let (m, n, k) = matmul_dims(OP, a, b, trans_a, trans_b)?;
    let batch = a.dims()[0];
    let (a_rows, a_cols) = trans_a.stored(m, k);
    let (b_rows, b_cols) = trans_b.stored(k, n);
    let pa = a.packed_for::<T>(OP, out)?;
    let pb = b.packed_for::<T>(OP, out)?;
    let mut c = out.packed_out::<T>(OP)?;
    blas::gemm_strided_batched(
        trans_a,
        trans_b,
        m,
        n,
        k,
        T::one(),
        &pa[..],
        a_cols.max(1),
        a_rows * a_cols,
        &pb[..],
        b_cols.max(1),
        b_rows * b_cols,
        T::zero(),
        &mut c[..],
        n.max(1),
        m * n,
        batch,
    )?;
    drop((pa, pb));
    out.commit(c, OP)
}

/// The factors of `P·A = L·U`.
#[derive(Debug, Clone)]
pub struct LuFactors {
    /// `m × min(m, n)`, unit lower triangular.
    pub l: Tensor,
    /// `min(m, n) × n`, upper triangular.
    pub u: Tensor,
    /// Row `i` was swapped with row `pivots[i]` at step `i`.
    pub pivots: Vec<usize>,
}

/// Thin singular value decomposition `A = U·diag(S)·Vᵀ`.
#[derive(Debug, Clone)]
pub struct Svd {
    pub u: Tensor,
    pub s: Tensor,
    pub vt: Tensor,
}

impl Tensor {
    /// Matrix product `op(self)·op(other)`.
    ///
    /// Rank-3 operands are treated as a batch of matrices along axis 0.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor, Trans};
    /// let a = Tensor::from_slice(Shape::matrix(2, 3), &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    /// let g = a.matmul(&a, Trans::No, Trans::Yes).unwrap();
    /// assert_eq!(g.to_vec::<f32>().unwrap(), vec![14.0, 32.0, 32.0, 77.0]);
    /// ```
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] when the inner extents (or batch
    /// sizes) differ.
    pub fn matmul(&self, other: &Tensor, trans_a: Trans, trans_b: Trans) -> Result<Tensor, TensorError> {
        require_dtype("matmul", self, other)?;
        let shape = matmul_shape("matmul", self, other, trans_a, trans_b)?;
        let mut out = Tensor::new(self.dtype(), shape)?;
        self.matmul_into(other, trans_a, trans_b, &mut out)?;
        Ok(out)
    }

    pub fn matmul_into<'o>(
        &self,
        other: &Tensor,
        trans_a: Trans,
        trans_b: Trans,
        out: &'o mut Tensor,
    ) -> Result<&'o mut Tensor, TensorError> {
        require_dtype("matmul", self, other)?;
        let shape = matmul_shape("matmul", self, other, trans_a, trans_b)?;
        check_destination("matmul", out, self.dtype(), &shape)?;
        with_dtype!(self.dtype(), T => {
            if self.rank() == 3 {
                batched_gemm_into::<T>(self, other, trans_a, trans_b, out)
            } else {
                gemm_into::<T>(self, other, trans_a, trans_b, out)
            }
        })?;
        Ok(out)
    }

    /// Matrix-vector product `self · x` for an `m × n` matrix and a vector
    /// of length `n`.
    pub fn matvec(&self, x: &Tensor) -> Result<Tensor, TensorError> {
        require_rank("matvec", self, 2)?;
        let mut out = Tensor::new(self.dtype(), Shape::vector(self.dims()[0]))?;
        self.matvec_into(x, &mut out)?;
        Ok(out)
    }

    pub fn matvec_into<'o>(&self, x: &Tensor, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "matvec";
        require_rank(OP, self, 2)?;
        require_rank(OP, x, 1)?;
        require_dtype(OP, self, x)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        if x.dims()[0] != n {
            return Err(TensorError::ShapeMismatch {
                op: OP,
                lhs: self.shape().clone(),
                rhs: x.shape().clone(),
            });
        }
        check_destination(OP, out, self.dtype(), &Shape::vector(m))?;
        with_dtype!(self.dtype(), T => {
            let a = Operand::new(self, Trans::No, out)?;
            let (sm, sn) = a.trans.stored(m, n);
            let xs = x.packed_for::<T>(OP, out)?;
            let ga = a.tensor.read::<T>(OP)?;
            let mut y = out.packed_out::<T>(OP)?;
            blas::gemv(
                a.trans,
                sm,
                sn,
                T::one(),
                from_offset(&ga[..], a.tensor.offset()),
                a.ld,
                &xs[..],
                T::zero(),
                &mut y[..],
            )?;
            drop((ga, xs));
            out.commit(y, OP)
        })?;
        Ok(out)
    }

    /// `alpha·x + self`.
    pub fn axpy(&self, alpha: f64, x: &Tensor) -> Result<Tensor, TensorError> {
        const OP: &str = "axpy";
        check_operands(OP, self, x)?;
        let acc = self.to_contiguous()?;
        with_dtype!(self.dtype(), T => {
            let xs = x.packed::<T>(OP)?;
            let mut y = acc.write::<T>(OP)?;
            let n = acc.num_elements();
            blas::axpy(n, T::of_f64(alpha), &xs[..], 1, &mut y[..n], 1)
        })?;
        Ok(acc)
    }

    pub fn axpy_into<'o>(&self, alpha: f64, x: &Tensor, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        check_destination("axpy", out, self.dtype(), self.shape())?;
        self.axpy(alpha, x)?.copy_to(out)
    }

    /// LU factorisation with partial pivoting of an F32/F64 matrix.
    ///
    /// # Errors
    /// [`TensorError::SingularMatrix`] when a pivot falls below
    /// `kernels::lapack::SINGULAR_TOLERANCE`.
    pub fn lu(&self) -> Result<LuFactors, TensorError> {
        const OP: &str = "lu";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        let steps = m.min(n);
        let l = Tensor::new(self.dtype(), Shape::matrix(m, steps))?;
        let u = Tensor::new(self.dtype(), Shape::matrix(steps, n))?;
        let mut pivots = vec![0usize; steps];
        with_float_dtype!(self.dtype(), OP, T => {
            let a = self.packed::<T>(OP)?;
            let mut gl = l.write::<T>(OP)?;
            let mut gu = u.write::<T>(OP)?;
            lapack::getrf(m, n, &a[..], n.max(1), &mut gl[..], steps.max(1), &mut gu[..], n.max(1), &mut pivots)
                .map_err(TensorError::from)
        })?;
        Ok(LuFactors { l, u, pivots })
    }

    /// LU factors packed into one matrix (`L` strictly below the diagonal,
    /// unit diagonal implied, `U` on and above it) plus the pivots.
    pub fn lu_packed(&self) -> Result<(Tensor, Vec<usize>), TensorError> {
        const OP: &str = "lu_packed";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        let lu = self.to_contiguous()?;
        let mut pivots = vec![0usize; m.min(n)];
        with_float_dtype!(self.dtype(), OP, T => {
            let mut a = lu.write::<T>(OP)?;
            lapack::getrf_ip(m, n, &mut a[..], n.max(1), &mut pivots).map_err(TensorError::from)
        })?;
        Ok((lu, pivots))
    }

    /// Inverse of a square F32/F64 matrix.
    pub fn inverse(&self) -> Result<Tensor, TensorError> {
        require_rank("inverse", self, 2)?;
        let mut out = self.alloc_like()?;
        self.inverse_into(&mut out)?;
        Ok(out)
    }

    pub fn inverse_into<'o>(&self, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "inverse";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        if m != n {
            return Err(TensorError::NotSquare { op: OP, rows: m, cols: n });
        }
        check_destination(OP, out, self.dtype(), self.shape())?;
        with_float_dtype!(self.dtype(), OP, T => {
            let a = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            lapack::inverse(m, n, &a[..], n.max(1), &mut d[..], n.max(1))?;
            drop(a);
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// Householder QR: returns `(Q, R)` with `Q` the full `m × m`
    /// orthogonal factor and `R` the `m × n` upper triangle.
    pub fn qr(&self) -> Result<(Tensor, Tensor), TensorError> {
        const OP: &str = "qr";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        let steps = m.min(n);
        let r = self.to_contiguous()?;
        let q = Tensor::new(self.dtype(), Shape::matrix(m, m))?;
        with_float_dtype!(self.dtype(), OP, T => {
            let mut tau = memory_manager::acquire_filled::<T>(steps, T::zero());
            let mut a = r.write::<T>(OP)?;
            lapack::geqrf(m, n, &mut a[..], n.max(1), &mut tau[..])?;
            let mut gq = q.write::<T>(OP)?;
            lapack::orgqr(m, n, steps, &a[..], n.max(1), &tau[..], &mut gq[..], m.max(1))?;
            // Reflector tails sit below the diagonal; R keeps the upper part.
            for i in 0..m {
                for j in 0..i.min(n) {
                    a[i * n + j] = T::zero();
                }
            }
            Ok::<(), TensorError>(())
        })?;
        Ok((q, r))
    }

    /// Thin SVD of an F32/F64 `m × n` matrix with `m ≥ n`.
    pub fn svd(&self) -> Result<Svd, TensorError> {
        const OP: &str = "svd";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        let u = Tensor::new(self.dtype(), Shape::matrix(m, n))?;
        let s = Tensor::new(self.dtype(), Shape::vector(n))?;
        let vt = Tensor::new(self.dtype(), Shape::matrix(n, n))?;
        with_float_dtype!(self.dtype(), OP, T => {
            let a = self.packed::<T>(OP)?;
            let mut gu = u.write::<T>(OP)?;
            let mut gs = s.write::<T>(OP)?;
            let mut gv = vt.write::<T>(OP)?;
            lapack::gesvd(m, n, &a[..], n.max(1), &mut gu[..], n.max(1), &mut gs[..], &mut gv[..], n.max(1))
                .map_err(TensorError::from)
        })?;
        Ok(Svd { u, s, vt })
    }

    /// Moore–Penrose pseudo-inverse (`n × m`). Singular values at or below
    /// `tol·max(S)` are dropped; `None` uses the kernel default.
    pub fn pinv(&self, tol: Option<f64>) -> Result<Tensor, TensorError> {
        require_rank("pinv", self, 2)?;
        let mut out = Tensor::new(self.dtype(), Shape::matrix(self.dims()[1], self.dims()[0]))?;
        self.pinv_into(tol, &mut out)?;
        Ok(out)
    }

    pub fn pinv_into<'o>(&self, tol: Option<f64>, out: &'o mut Tensor) -> Result<&'o mut Tensor, TensorError> {
        const OP: &str = "pinv";
        require_rank(OP, self, 2)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        check_destination(OP, out, self.dtype(), &Shape::matrix(n, m))?;
        with_float_dtype!(self.dtype(), OP, T => {
            let a = self.packed_for::<T>(OP, out)?;
            let mut d = out.packed_out::<T>(OP)?;
            lapack::pinv(m, n, &a[..], n.max(1), &mut d[..], m.max(1), tol.map(T::of_f64))?;
            drop(a);
            out.commit(d, OP)
        })?;
        Ok(out)
    }

    /// Non-negative least squares: the `x ≥ 0` minimising `‖self·x − b‖₂`,
    /// and that residual norm.
    pub fn nnls(&self, b: &Tensor) -> Result<(Tensor, f64), TensorError> {
        const OP: &str = "nnls";
        require_rank(OP, self, 2)?;
        require_rank(OP, b, 1)?;
        require_dtype(OP, self, b)?;
        let (m, n) = (self.dims()[0], self.dims()[1]);
        if b.dims()[0] != m {
            return Err(TensorError::ShapeMismatch {
                op: OP,
                lhs: self.shape().clone(),
                rhs: b.shape().clone(),
            });
        }
        let x = Tensor::new(self.dtype(), Shape::vector(n))?;
        let residual = with_float_dtype!(self.dtype(), OP, T => {
            let a = self.packed::<T>(OP)?;
            let rhs = b.packed::<T>(OP)?;
            let mut gx = x.write::<T>(OP)?;
            lapack::nnls(m, n, &a[..], n.max(1), &rhs[..], &mut gx[..])
                .map(|r| r.as_f64())
                .map_err(TensorError::from)
        })?;
        Ok((x, residual))
    }
}
