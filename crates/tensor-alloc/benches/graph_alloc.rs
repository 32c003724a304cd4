// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for graph planning.

use compute_graph::{ComputeGraph, DType, Op, Shape, Validated};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tensor_alloc::{GraphAllocator, TensorAllocator};

/// A stack of `layers` transformer-like blocks over a `[dim, tokens]`
/// activation.
fn layered_graph(layers: usize, dim: usize, tokens: usize) -> ComputeGraph<Validated> {
    let act = Shape::matrix(dim, tokens);
    let mut g = ComputeGraph::new("bench");
    let mut x = g.new_tensor("x", DType::F32, act.clone()).expect("input");
    for l in 0..layers {
        let w = g
            .new_tensor(format!("w{l}"), DType::F16, Shape::matrix(dim, dim))
            .expect("weight");
        let n = g
            .op(format!("norm{l}"), Op::RmsNorm, &[x], DType::F32, act.clone())
            .expect("norm");
        let h = g
            .op(format!("mm{l}"), Op::MulMat, &[w, n], DType::F32, act.clone())
            .expect("matmul");
        let a = g
            .op(format!("act{l}"), Op::Silu, &[h], DType::F32, act.clone())
            .expect("activation");
        x = g
            .op(format!("res{l}"), Op::Add, &[x, a], DType::F32, act.clone())
            .expect("residual");
    }
    g.mark_output(x).expect("output");
    g.validate().expect("valid graph")
}

fn bench_measure_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("measure_pass");
    for layers in [8, 32, 128] {
        let graph = layered_graph(layers, 512, 16);
        group.bench_with_input(BenchmarkId::from_parameter(layers), &graph, |b, graph| {
            b.iter(|| {
                let mut g = graph.clone();
                let mut measure = TensorAllocator::new_measure(32).expect("alignment");
                let size = GraphAllocator::new()
                    .alloc_graph(&mut g, &mut measure)
                    .expect("measure");
                black_box(size)
            })
        });
    }
    group.finish();
}

fn bench_two_pass(c: &mut Criterion) {
    let graph = layered_graph(32, 512, 16);
    c.bench_function("two_pass_32_layers", |b| {
        b.iter(|| {
            let mut g = graph.clone();
            let mut gallocr = GraphAllocator::new();
            let mut measure = TensorAllocator::new_measure(32).expect("alignment");
            let size = gallocr.alloc_graph(&mut g, &mut measure).expect("measure");
            g.clear_planned();
            let mut real = TensorAllocator::new(0, size, 32).expect("alignment");
            black_box(gallocr.alloc_graph(&mut g, &mut real).expect("real pass"))
        })
    });
}

criterion_group!(benches, bench_measure_pass, bench_two_pass);
criterion_main!(benches);
