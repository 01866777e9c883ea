// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for tensor operations.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensor_core::{DType, Shape, Tensor, Trans, Window2d};

fn random(rng: &mut StdRng, shape: impl Into<Shape>) -> Tensor {
    let shape = shape.into();
    let data: Vec<f32> = (0..shape.num_elements()).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    Tensor::from_slice(shape, &data).expect("bench input")
}

fn bench_matmul(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut group = c.benchmark_group("matmul");
    for n in [32usize, 128, 256] {
        let a = random(&mut rng, Shape::matrix(n, n));
        let b = random(&mut rng, Shape::matrix(n, n));
        let mut out = Tensor::new(DType::F32, Shape::matrix(n, n)).expect("bench output");
        group.throughput(Throughput::Elements((2 * n * n * n) as u64));
        group.bench_with_input(BenchmarkId::new("nn", n), &n, |bench, _| {
            bench.iter(|| {
                a.matmul_into(&b, Trans::No, Trans::No, &mut out).expect("matmul");
            })
        });
        group.bench_with_input(BenchmarkId::new("nt", n), &n, |bench, _| {
            bench.iter(|| {
                a.matmul_into(&b, Trans::No, Trans::Yes, &mut out).expect("matmul");
            })
        });
    }
    group.finish();
}

fn bench_softmax(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut group = c.benchmark_group("softmax");
    for cols in [64usize, 1024, 8192] {
        let x = random(&mut rng, Shape::matrix(64, cols));
        group.throughput(Throughput::Elements((64 * cols) as u64));
        group.bench_with_input(BenchmarkId::new("last_axis", cols), &cols, |bench, _| {
            bench.iter(|| black_box(x.softmax(1).expect("softmax")))
        });
    }
    group.finish();
}

fn bench_add(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let mut group = c.benchmark_group("add");
    for n in [1usize << 10, 1 << 16, 1 << 20] {
        let a = random(&mut rng, Shape::vector(n));
        let b = random(&mut rng, Shape::vector(n));
        let mut out = Tensor::new(DType::F32, Shape::vector(n)).expect("bench output");
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("contiguous", n), &n, |bench, _| {
            bench.iter(|| {
                a.add_into(&b, &mut out).expect("add");
            })
        });

        let side = (n as f64).sqrt() as usize;
        let m = random(&mut rng, Shape::matrix(side, side));
        let mt = m.transpose(0, 1).expect("transpose");
        let mut sq = Tensor::new(DType::F32, Shape::matrix(side, side)).expect("bench output");
        group.bench_with_input(BenchmarkId::new("strided", n), &n, |bench, _| {
            bench.iter(|| {
                m.add_into(&mt, &mut sq).expect("add");
            })
        });
    }
    group.finish();
}

fn bench_conv2d(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(4);
    let mut group = c.benchmark_group("conv2d");
    for hw in [16usize, 32, 64] {
        let x = random(&mut rng, vec![1, 16, hw, hw]);
        let w = random(&mut rng, vec![32, 16, 3, 3]);
        let bias = random(&mut rng, Shape::vector(32));
        group.bench_with_input(BenchmarkId::new("3x3", hw), &hw, |bench, _| {
            bench.iter(|| black_box(x.conv_2d(&w, Some(&bias), [1, 1], [1, 1]).expect("conv")))
        });
        group.bench_with_input(BenchmarkId::new("max_pool_2x2", hw), &hw, |bench, _| {
            bench.iter(|| black_box(x.max_pool_2d(Window2d::new(2, 2)).expect("pool")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_matmul, bench_softmax, bench_add, bench_conv2d);
criterion_main!(benches);
