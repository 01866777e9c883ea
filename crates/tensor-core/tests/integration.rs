// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end checks of the tensor core against fixed scenarios and the
//! layout, dispatch and conversion properties every kernel relies on.

use kernels::blas::{self, Trans};
use kernels::elementwise::{par_unary, unary};
use kernels::layout;
use kernels::quant::{self, Q8GemmParams, QuantParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensor_core::{DType, Shape, Tensor, TensorError, Window2d};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_f32(rng: &mut StdRng, n: usize) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(-4.0f32..4.0)).collect()
}

fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "element {i}: {a} vs {e}");
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn test_elementwise_add_leaves_inputs() {
    init_tracing();
    let a = Tensor::from_slice(Shape::matrix(2, 2), &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let b = Tensor::from_slice(Shape::matrix(2, 2), &[5.0f32, 6.0, 7.0, 8.0]).unwrap();
    let c = a.add(&b).unwrap();
    assert_eq!(c.to_vec::<f32>().unwrap(), vec![6.0, 8.0, 10.0, 12.0]);
    assert_eq!(a.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_gemv_with_leading_dimension_padding() {
    let nan = f32::NAN;
    let a = [1.0f32, 2.0, nan, nan, 3.0, 4.0, nan, nan];
    let x = [1.0f32, 1.0];
    let mut y = [0.0f32; 2];
    blas::gemv(Trans::No, 2, 2, 1.0, &a, 4, &x, 0.0, &mut y).unwrap();
    assert_eq!(y, [3.0, 7.0]);

    // The same matrix as a padded view through the tensor API.
    let buf = Tensor::from_slice(Shape::vector(8), &[1.0f32, 2.0, 0.0, 0.0, 3.0, 4.0, 0.0, 0.0]).unwrap();
    let m = buf.view(Shape::matrix(2, 2), &[4, 1], 0).unwrap();
    let xv = Tensor::from_slice(Shape::vector(2), &x).unwrap();
    assert_eq!(m.matvec(&xv).unwrap().to_vec::<f32>().unwrap(), vec![3.0, 7.0]);
}

#[test]
fn test_gemv_transposed() {
    let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let x = [1.0f32, 2.0];
    let mut y = [0.0f32; 3];
    blas::gemv_t(2, 3, 1.0, &a, 3, &x, 0.0, &mut y).unwrap();
    assert_eq!(y, [9.0, 12.0, 15.0]);

    let m = Tensor::from_slice(Shape::matrix(2, 3), &a).unwrap();
    let xv = Tensor::from_slice(Shape::vector(2), &x).unwrap();
    let yt = m.transpose(0, 1).unwrap().matvec(&xv).unwrap();
    assert_eq!(yt.to_vec::<f32>().unwrap(), vec![9.0, 12.0, 15.0]);
}

#[test]
fn test_ger_rank_one_update() {
    let mut a = [0.0f32; 4];
    blas::ger(2, 2, 1.0, &[1.0, 2.0], &[3.0, 4.0], &mut a, 2).unwrap();
    assert_eq!(a, [3.0, 4.0, 6.0, 8.0]);
}

#[test]
fn test_lu_two_by_two() {
    let a = Tensor::from_slice(Shape::matrix(2, 2), &[4.0f32, 3.0, 6.0, 3.0]).unwrap();
    let lu = a.lu().unwrap();
    assert_eq!(lu.pivots, vec![1, 1]);
    assert_close(&lu.l.to_vec::<f32>().unwrap(), &[1.0, 0.0, 4.0 / 6.0, 1.0], 1e-6);
    assert_close(&lu.u.to_vec::<f32>().unwrap(), &[6.0, 3.0, 0.0, 1.0], 1e-6);

    let inv = a.inverse().unwrap();
    let id = inv.matmul(&a, Trans::No, Trans::No).unwrap();
    assert_close(&id.to_vec::<f32>().unwrap(), &[1.0, 0.0, 0.0, 1.0], 1e-5);
}

#[test]
fn test_q8_gemm_and_saturation() {
    let weight = [1u8, 2, 3, 4];
    let mut out = [0u8; 4];
    let unit = Q8GemmParams::default();
    quant::gemm_nn_q8(2, 2, 2, &[10, 20, 30, 40], 2, &weight, 2, &mut out, 2, &unit).unwrap();
    assert_eq!(out, [70, 100, 150, 220]);

    let shifted = Q8GemmParams {
        input: QuantParams::new(1.0, 128),
        weight: QuantParams::default(),
        output: QuantParams::new(1.0, 128),
    };
    quant::gemm_nn_q8(2, 2, 2, &[138, 148, 158, 168], 2, &weight, 2, &mut out, 2, &shifted).unwrap();
    assert_eq!(out, [198, 228, 255, 255]);
}

#[test]
fn test_max_pool_backward_routes_to_argmax() {
    let x = Tensor::from_slice(vec![1, 1, 2, 2], &[1.0f32, 5.0, 3.0, 2.0]).unwrap();
    let window = Window2d::new(2, 2).stride(2, 2);
    let (y, idx) = x.max_pool_2d_with_indices(window).unwrap();
    assert_eq!(y.to_vec::<f32>().unwrap(), vec![5.0]);
    assert_eq!(idx.to_vec::<i64>().unwrap(), vec![1]);

    let g = Tensor::from_slice(vec![1, 1, 1, 1], &[2.5f32]).unwrap();
    let dx = g.max_pool_2d_backward(&idx, x.shape(), window).unwrap();
    assert_eq!(dx.to_vec::<f32>().unwrap(), vec![0.0, 2.5, 0.0, 0.0]);
}

#[test]
fn test_softmax_large_inputs_stay_finite() {
    let x = Tensor::from_slice(Shape::vector(3), &[1000.0f32, 1000.0, 1000.0]).unwrap();
    let y = x.softmax(0).unwrap().to_vec::<f32>().unwrap();
    assert_close(&y, &[1.0 / 3.0; 3], 1e-6);
}

// ── Layout properties ───────────────────────────────────────────────

#[test]
fn test_size_and_packed_strides() {
    let shapes: [&[usize]; 5] = [&[], &[7], &[2, 3], &[4, 1, 5], &[2, 3, 4, 5]];
    for shape in shapes {
        let expected: usize = shape.iter().product();
        assert_eq!(layout::size(shape), expected);

        let strides = layout::packed_strides(shape);
        if let Some(&last) = strides.last() {
            assert_eq!(last, 1);
        }
        for i in 0..shape.len().saturating_sub(1) {
            assert_eq!(strides[i], strides[i + 1] * shape[i + 1] as isize);
        }
        assert!(layout::is_contiguous(&strides, shape));
    }
    assert_eq!(layout::size(&[]), 1);
}

#[test]
fn test_strided_path_matches_contiguous_path() {
    let mut rng = StdRng::seed_from_u64(7);
    let a = Tensor::from_slice(Shape::matrix(16, 24), &random_f32(&mut rng, 16 * 24)).unwrap();
    let b = Tensor::from_slice(Shape::matrix(24, 16), &random_f32(&mut rng, 24 * 16)).unwrap();

    // bᵀ is a strided view of the same logical values as its packed copy.
    let bt = b.transpose(0, 1).unwrap();
    assert!(!bt.is_contiguous());
    let packed = bt.to_contiguous().unwrap();

    let strided = a.mul(&bt).unwrap().exp().unwrap();
    let flat = a.mul(&packed).unwrap().exp().unwrap();
    let s: Vec<u32> = strided.to_vec::<f32>().unwrap().iter().map(|v| v.to_bits()).collect();
    let f: Vec<u32> = flat.to_vec::<f32>().unwrap().iter().map(|v| v.to_bits()).collect();
    assert_eq!(s, f);
}

#[test]
fn test_parallel_matches_serial() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 1 << 16;
    let src = random_f32(&mut rng, n);
    let mut serial = vec![0.0f32; n];
    let mut parallel = vec![0.0f32; n];
    unary(&mut serial, &src, n, |x: f32| x.sin() * 0.5 + x);
    par_unary(&mut parallel, &src, n, |x: f32| x.sin() * 0.5 + x);
    assert!(serial.iter().zip(&parallel).all(|(a, b)| a.to_bits() == b.to_bits()));
}

#[test]
fn test_copy_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(3);
    let x = Tensor::from_slice(vec![3, 4, 5], &random_f32(&mut rng, 60)).unwrap();
    let view = x.transpose(0, 2).unwrap();
    let once = view.to_contiguous().unwrap();
    let twice = once.to_contiguous().unwrap();
    assert_eq!(once.to_vec::<f32>().unwrap(), twice.to_vec::<f32>().unwrap());
    assert_eq!(view.to_vec::<f32>().unwrap(), once.to_vec::<f32>().unwrap());
}

#[test]
fn test_widening_cast_round_trip() {
    let src = [i16::MIN, -1, 0, 1, 1234, i16::MAX];
    let x = Tensor::from_slice(Shape::vector(6), &src).unwrap();
    let back = x.cast(DType::F64).unwrap().cast(DType::I16).unwrap();
    assert_eq!(back.to_vec::<i16>().unwrap(), src.to_vec());

    let y = Tensor::from_slice(Shape::vector(3), &[1.5f32, -2.25, 1e30]).unwrap();
    let yb = y.cast(DType::F64).unwrap().cast(DType::F32).unwrap();
    assert_eq!(yb.to_vec::<f32>().unwrap(), vec![1.5, -2.25, 1e30]);
}

#[test]
fn test_narrowing_cast_truncates_and_saturates() {
    let x = Tensor::from_slice(Shape::vector(6), &[-300.7f64, 2.9, -2.9, 127.5, 1e9, f64::NAN]).unwrap();
    let y = x.cast(DType::I8).unwrap();
    assert_eq!(y.to_vec::<i8>().unwrap(), vec![-128, 2, -2, 127, 127, 0]);

    let wide = Tensor::from_slice(Shape::vector(3), &[70_000i64, -70_000, 5]).unwrap();
    let mut narrow = Tensor::new(DType::I16, Shape::vector(3)).unwrap();
    wide.copy_to(&mut narrow).unwrap();
    assert_eq!(narrow.to_vec::<i16>().unwrap(), vec![i16::MAX, i16::MIN, 5]);
}

#[test]
fn test_gemm_beta_zero_ignores_nan() {
    let a = [1.0f64, 2.0, 3.0, 4.0];
    let b = [1.0f64, 0.0, 0.0, 1.0];
    let mut c = [f64::NAN; 4];
    blas::gemm(Trans::No, Trans::No, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2).unwrap();
    assert_eq!(c, a);

    // The tensor API overwrites a NaN-filled destination the same way.
    let ta = Tensor::from_slice(Shape::matrix(2, 2), &a).unwrap();
    let tb = Tensor::from_slice(Shape::matrix(2, 2), &b).unwrap();
    let mut out = Tensor::full(DType::F64, Shape::matrix(2, 2), f64::NAN).unwrap();
    ta.matmul_into(&tb, Trans::No, Trans::No, &mut out).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), a.to_vec());
}

#[test]
fn test_quantize_round_trip_error_bounded() {
    let mut rng = StdRng::seed_from_u64(19);
    let q = QuantParams::new(0.05, 100);
    // Representable range is s·(0 − z) ..= s·(255 − z).
    let src: Vec<f32> = (0..512).map(|_| rng.gen_range(-5.0f32..7.75)).collect();
    let mut codes = vec![0u8; src.len()];
    let mut back = vec![0.0f32; src.len()];
    quant::quantize(&mut codes, &src, src.len(), q).unwrap();
    quant::dequantize(&mut back, &codes, src.len(), q).unwrap();
    for (x, y) in src.iter().zip(&back) {
        assert!((x - y).abs() <= q.scale, "{x} came back as {y}");
    }
}

// ── Façade behaviour ────────────────────────────────────────────────

#[test]
fn test_chained_into_calls() {
    let x = Tensor::from_slice(Shape::vector(4), &[-2.0f32, -1.0, 1.0, 2.0]).unwrap();
    let mut tmp = Tensor::zeros(x.dtype(), x.shape().clone()).unwrap();
    let mut out = Tensor::zeros(x.dtype(), x.shape().clone()).unwrap();
    x.relu_into(&mut tmp).unwrap().scale_into(3.0, &mut out).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.0, 0.0, 3.0, 6.0]);
}

#[test]
fn test_destination_is_validated() {
    let x = Tensor::from_slice(Shape::vector(3), &[1.0f32, 2.0, 3.0]).unwrap();
    let mut wrong_dtype = Tensor::new(DType::F64, Shape::vector(3)).unwrap();
    assert!(matches!(x.exp_into(&mut wrong_dtype), Err(TensorError::DTypeMismatch { .. })));

    let mut wrong_shape = Tensor::new(DType::F32, Shape::vector(4)).unwrap();
    assert!(matches!(x.exp_into(&mut wrong_shape), Err(TensorError::ShapeMismatch { .. })));

    let i = Tensor::from_slice(Shape::vector(3), &[1i32, 2, 3]).unwrap();
    assert!(matches!(x.add(&i), Err(TensorError::DTypeMismatch { .. })));
}

#[test]
fn test_operations_on_views_write_through() {
    let base = Tensor::zeros(DType::F32, Shape::matrix(3, 4)).unwrap();
    let mut col = base.view(Shape::vector(3), &[4], 1).unwrap();
    let ones = Tensor::full(DType::F32, Shape::vector(3), 1.0).unwrap();
    ones.scale_into(2.0, &mut col).unwrap();
    assert_eq!(
        base.to_vec::<f32>().unwrap(),
        vec![0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0]
    );
}

#[test]
fn test_small_network_forward() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(23);
    let x = Tensor::from_slice(vec![2, 1, 6, 6], &random_f32(&mut rng, 72)).unwrap();
    let w = Tensor::from_slice(vec![4, 1, 3, 3], &random_f32(&mut rng, 36)).unwrap();

    let h = x.conv_2d(&w, None, [1, 1], [1, 1]).unwrap().relu().unwrap();
    assert_eq!(h.dims(), &[2, 4, 6, 6]);
    let p = h.max_pool_2d(Window2d::new(2, 2)).unwrap();
    assert_eq!(p.dims(), &[2, 4, 3, 3]);
    let g = p.global_avg_pool_2d().unwrap();
    assert_eq!(g.dims(), &[2, 4, 1, 1]);

    let logits = g.reshape(Shape::matrix(2, 4)).unwrap().softmax(1).unwrap();
    let rows = logits.sum(&[1]).unwrap().to_vec::<f32>().unwrap();
    assert_close(&rows, &[1.0, 1.0], 1e-5);
}
