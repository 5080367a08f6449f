// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for full-graph execution and shape epochs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_ir::{Conv2DOptions, Graph, Node, NodeOptions, OpKind, Validated};
use runtime::{InferenceEngine, RuntimeConfig};
use tensor_core::{ConstantData, DType, FusedActivation, Layout, Padding, Tensor, TensorInfo};

fn ramp(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i % 17) as f32 - 8.0) * 0.125).collect()
}

/// Two same-padded 3x3 convolutions with an add skip connection.
fn residual_block(size: usize, channels: usize) -> Graph<Validated> {
    let conv = NodeOptions::Conv2D(Conv2DOptions {
        padding: Padding::Same,
        stride_h: 1,
        stride_w: 1,
        dilation_h: 1,
        dilation_w: 1,
        fused_activation: FusedActivation::Relu,
    });
    let filter = channels * 9 * channels;

    let mut g = Graph::new("residual", Layout::Nhwc);
    let x = g.add_input("x", TensorInfo::new(vec![1, size, size, channels], DType::F32));
    let w0 = g.add_constant(
        "w0",
        TensorInfo::new(vec![channels, 3, 3, channels], DType::F32),
        ConstantData::from_values(&ramp(filter)),
    );
    let w1 = g.add_constant(
        "w1",
        TensorInfo::new(vec![channels, 3, 3, channels], DType::F32),
        ConstantData::from_values(&ramp(filter)),
    );
    let a = g.add_intermediate("a", TensorInfo::undefined(DType::F32));
    let b = g.add_intermediate("b", TensorInfo::undefined(DType::F32));
    let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
    g.add_node(Node::new("conv0", OpKind::Conv2D, vec![x, w0], vec![a], conv.clone()));
    g.add_node(Node::new("conv1", OpKind::Conv2D, vec![a, w1], vec![b], conv));
    g.add_node(Node::new("skip", OpKind::Add, vec![x, b], vec![y], NodeOptions::Arithmetic(Default::default())));
    g.mark_output(y);
    g.validate().unwrap()
}

fn engine(backends: &[&str]) -> InferenceEngine<runtime::Ready> {
    let config = RuntimeConfig {
        memory_budget: "4M".into(),
        backends: backends.iter().map(|b| b.to_string()).collect(),
        enable_profiling: false,
        ..Default::default()
    };
    InferenceEngine::new(config)
        .prepare(residual_block(28, 8))
        .unwrap()
        .plan()
        .unwrap()
}

fn bench_run(c: &mut Criterion) {
    let input = Tensor::from_f32(vec![1, 28, 28, 8], &ramp(28 * 28 * 8)).unwrap();
    for backends in [&["cpu"][..], &["planar", "cpu"][..]] {
        let mut engine = engine(backends);
        let inputs = [input.clone()];
        c.bench_function(&format!("residual_28x28x8_{}", backends.join("+")), |b| {
            b.iter(|| black_box(engine.run(&inputs).unwrap()))
        });
    }
}

fn bench_reshape(c: &mut Criterion) {
    let mut engine = engine(&["cpu"]);
    let mut size = 28;
    c.bench_function("reshape_replan", |b| {
        b.iter(|| {
            size = if size == 28 { 32 } else { 28 };
            engine.reshape(&[("x", vec![1, size, size, 8])]).unwrap();
        })
    });
}

criterion_group!(benches, bench_run, bench_reshape);
criterion_main!(benches);
