// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end inference pipeline.
//!
//! These tests exercise the complete flow from graph construction through
//! negotiation, kernel configuration, arena planning and execution, proving
//! that the crates compose correctly and that the type-state transitions
//! work end-to-end.

use backend_planner::{BackendError, CpuBackend, PlanarBackend};
use model_ir::{
    Conv2DOptions, Graph, Node, NodeId, NodeOptions, OpKind, SoftmaxOptions, TransposeConvOptions,
    Validated,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use runtime::{InferenceEngine, Ready, RuntimeConfig, RuntimeError};
use tensor_core::{
    ConstantData, DType, FusedActivation, Layout, Padding, Quantization, Tensor, TensorInfo,
};

// ── Helpers ────────────────────────────────────────────────────

fn config(budget: &str, backends: &[&str]) -> RuntimeConfig {
    RuntimeConfig {
        memory_budget: budget.into(),
        backends: backends.iter().map(|b| b.to_string()).collect(),
        ..Default::default()
    }
}

fn conv_options(padding: Padding, fused_activation: FusedActivation) -> NodeOptions {
    NodeOptions::Conv2D(Conv2DOptions {
        padding,
        stride_h: 1,
        stride_w: 1,
        dilation_h: 1,
        dilation_w: 1,
        fused_activation,
    })
}

/// Integer-valued ramp so every sum is exact in `f32` whatever the
/// accumulation order.
fn ramp(n: usize, modulo: usize, offset: f32) -> Vec<f32> {
    (0..n).map(|i| (i % modulo) as f32 - offset).collect()
}

/// x[1,6,6,3] -> conv 3x3 same (w[4,3,3,3]) -> y -> relu -> z -> maxpool 2x2 -> p
fn conv_net() -> Graph<Validated> {
    let mut g = Graph::new("conv_net", Layout::Nhwc);
    let x = g.add_input("x", TensorInfo::new(vec![1, 6, 6, 3], DType::F32));
    let w = g.add_constant(
        "w",
        TensorInfo::new(vec![4, 3, 3, 3], DType::F32),
        ConstantData::from_values(&ramp(108, 3, 1.0)),
    );
    let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
    let z = g.add_intermediate("z", TensorInfo::undefined(DType::F32));
    let p = g.add_intermediate("p", TensorInfo::undefined(DType::F32));
    g.add_node(Node::new("conv", OpKind::Conv2D, vec![x, w], vec![y], conv_options(Padding::Same, FusedActivation::None)));
    g.add_node(Node::new("relu", OpKind::Relu, vec![y], vec![z], NodeOptions::None));
    g.add_node(Node::new(
        "pool",
        OpKind::MaxPool2D,
        vec![z],
        vec![p],
        NodeOptions::Pool2D(model_ir::Pool2DOptions {
            padding: Padding::Valid,
            stride_h: 2,
            stride_w: 2,
            filter_h: 2,
            filter_w: 2,
            fused_activation: FusedActivation::None,
        }),
    ));
    g.mark_output(p);
    g.validate().unwrap()
}

fn ready(graph: Graph<Validated>, cfg: RuntimeConfig) -> InferenceEngine<Ready> {
    InferenceEngine::new(cfg).prepare(graph).unwrap().plan().unwrap()
}

// ── End-to-end runs ────────────────────────────────────────────

#[test]
fn test_cpu_conv_pipeline() {
    let mut engine = ready(conv_net(), config("64K", &["cpu"]));
    let x = Tensor::from_f32(vec![1, 6, 6, 3], &ramp(108, 5, 2.0)).unwrap();
    let out = engine.run(&[x]).unwrap();

    let p = out.output("p").unwrap();
    assert_eq!(p.dims(), &[1, 3, 3, 4]);
    assert!(p.to_f32_vec().iter().all(|&v| v >= 0.0));
    assert_eq!(out.metrics.node_metrics.len(), 3);
}

#[test]
fn test_planar_matches_cpu() {
    let x = Tensor::from_f32(vec![1, 6, 6, 3], &ramp(108, 5, 2.0)).unwrap();

    let mut cpu = ready(conv_net(), config("64K", &["cpu"]));
    let mut mixed = ready(conv_net(), config("64K", &["planar", "cpu"]));
    assert_eq!(cpu.negotiated().conversions, 0);
    assert_eq!(mixed.negotiated().conversions, 2);
    assert_eq!(mixed.negotiated().backend_id(NodeId(0)), Some("planar"));

    let expected = cpu.run(&[x.clone()]).unwrap();
    let actual = mixed.run(&[x]).unwrap();
    assert_eq!(actual.outputs[0].dims(), expected.outputs[0].dims());
    assert_eq!(actual.outputs[0].to_f32_vec(), expected.outputs[0].to_f32_vec());
    assert!(actual
        .metrics
        .node_metrics
        .iter()
        .any(|m| m.kind == "permute"));
}

#[test]
fn test_injected_backends_override_config() {
    let mut engine = InferenceEngine::new(config("64K", &["cpu"]))
        .with_backends(vec![Box::new(PlanarBackend::default()), Box::new(CpuBackend::default())])
        .prepare(conv_net())
        .unwrap()
        .plan()
        .unwrap();
    assert_eq!(engine.backend_ids(), vec!["planar", "cpu"]);
    let x = Tensor::from_f32(vec![1, 6, 6, 3], &ramp(108, 5, 2.0)).unwrap();
    assert_eq!(engine.run(&[x]).unwrap().outputs[0].dims(), &[1, 3, 3, 4]);
}

#[test]
fn test_quantized_conv_pipeline() {
    let mut g = Graph::new("quantized", Layout::Nhwc);
    let x = g.add_input(
        "x",
        TensorInfo::new(vec![1, 2, 2, 1], DType::U8).with_quantization(Quantization::per_tensor(0.5, 128)),
    );
    let w = g.add_constant(
        "w",
        TensorInfo::new(vec![1, 1, 1, 1], DType::U8).with_quantization(Quantization::per_tensor(0.25, 0)),
        ConstantData::from_values(&[8u8]),
    );
    let y = g.add_intermediate(
        "y",
        TensorInfo::undefined(DType::U8).with_quantization(Quantization::per_tensor(2.0, 0)),
    );
    g.add_node(Node::new("conv", OpKind::Conv2D, vec![x, w], vec![y], conv_options(Padding::Valid, FusedActivation::None)));
    g.mark_output(y);

    // The planar backend is float-only, so the whole graph stays on cpu.
    let mut engine = ready(g.validate().unwrap(), config("4K", &["planar", "cpu"]));
    assert_eq!(engine.negotiated().backend_id(NodeId(0)), Some("cpu"));

    let x = Tensor::from_slice(vec![1, 2, 2, 1], &[130u8, 132, 128, 136]).unwrap();
    let out = engine.run(&[x]).unwrap();
    assert_eq!(out.outputs[0].to_vec::<u8>(), vec![1, 2, 0, 4]);
    assert_eq!(out.outputs[0].quantization(), Some(&Quantization::per_tensor(2.0, 0)));
}

#[test]
fn test_transpose_conv_uses_arena_scratch() {
    let q = || Quantization::per_tensor(1.0, 0);
    let mut g = Graph::new("upsample", Layout::Nhwc);
    let shape = g.add_constant("shape", TensorInfo::new(vec![4], DType::I32), ConstantData::from_values(&[1i32, 4, 4, 1]));
    let w = g.add_constant(
        "w",
        TensorInfo::new(vec![1, 3, 3, 1], DType::U8).with_quantization(q()),
        ConstantData::from_values(&[1u8; 9]),
    );
    let x = g.add_input("x", TensorInfo::new(vec![1, 2, 2, 1], DType::U8).with_quantization(q()));
    let y = g.add_intermediate("y", TensorInfo::undefined(DType::U8).with_quantization(q()));
    g.add_node(Node::new(
        "deconv",
        OpKind::TransposeConv,
        vec![shape, w, x],
        vec![y],
        NodeOptions::TransposeConv(TransposeConvOptions {
            padding: Padding::Valid,
            stride_h: 1,
            stride_w: 1,
            fused_activation: FusedActivation::None,
        }),
    ));
    g.mark_output(y);

    let mut engine = ready(g.validate().unwrap(), config("4K", &["cpu"]));
    assert_eq!(engine.kernels()[0].scratch_bytes(), 64);
    assert!(engine.memory_plan().scratch_slot(0).is_some());
    // x (4) + y (16) + scratch (64), each 16-byte aligned.
    assert_eq!(engine.memory_plan().arena_bytes(), 96);

    let x = Tensor::from_slice(vec![1, 2, 2, 1], &[1u8; 4]).unwrap();
    let out = engine.run(&[x]).unwrap();
    assert_eq!(
        out.outputs[0].to_vec::<u8>(),
        vec![1, 2, 2, 1, 2, 4, 4, 2, 2, 4, 4, 2, 1, 2, 2, 1]
    );
}

// ── Planning properties ────────────────────────────────────────

#[test]
fn test_execution_order_follows_producers() {
    // Nodes are declared consumer-first.
    let mut g = Graph::new("reversed", Layout::Nhwc);
    let x = g.add_input("x", TensorInfo::new(vec![1, 2, 2, 1], DType::F32));
    let a = g.add_intermediate("a", TensorInfo::undefined(DType::F32));
    let b = g.add_intermediate("b", TensorInfo::undefined(DType::F32));
    let c = g.add_intermediate("c", TensorInfo::undefined(DType::F32));
    g.add_node(Node::new("last", OpKind::Add, vec![a, b], vec![c], NodeOptions::Arithmetic(Default::default())));
    g.add_node(Node::new("second", OpKind::Tanh, vec![a], vec![b], NodeOptions::None));
    g.add_node(Node::new("first", OpKind::Relu, vec![x], vec![a], NodeOptions::None));
    g.mark_output(c);

    let mut engine = ready(g.validate().unwrap(), config("4K", &["cpu"]));
    let graph = engine.graph();
    let position = |id: NodeId| graph.order().iter().position(|&n| n == id).unwrap();
    for &id in graph.order() {
        for &t in &graph.node(id).unwrap().inputs {
            if let Some(producer) = graph.producer(t) {
                assert!(position(producer) < position(id));
            }
        }
    }

    let x = Tensor::from_f32(vec![1, 2, 2, 1], &[-1.0, 0.0, 1.0, 2.0]).unwrap();
    let out = engine.run(&[x]).unwrap();
    let expected: Vec<f32> = [0.0f32, 0.0, 1.0, 2.0].iter().map(|v| v + v.tanh()).collect();
    for (got, want) in out.outputs[0].to_f32_vec().iter().zip(&expected) {
        assert!((got - want).abs() < 1e-6);
    }
}

#[test]
fn test_random_graphs_never_alias_live_tensors() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..20 {
        let mut g = Graph::new(format!("random_{round}"), Layout::Nhwc);
        let channels = rng.gen_range(1..4);
        let mut live = vec![g.add_input("x", TensorInfo::new(vec![1, 3, 3, channels], DType::F32))];
        for i in 0..rng.gen_range(2..12) {
            let out = g.add_intermediate(format!("t{i}"), TensorInfo::undefined(DType::F32));
            let a = live[rng.gen_range(0..live.len())];
            if rng.gen_bool(0.5) {
                let b = live[rng.gen_range(0..live.len())];
                g.add_node(Node::new(format!("add{i}"), OpKind::Add, vec![a, b], vec![out], NodeOptions::Arithmetic(Default::default())));
            } else {
                g.add_node(Node::new(format!("relu{i}"), OpKind::Relu, vec![a], vec![out], NodeOptions::None));
            }
            live.push(out);
        }
        if let Some(&last) = live.last() {
            g.mark_output(last);
        }

        let mut engine = ready(g.validate().unwrap(), config("1M", &["cpu"]));
        let plan = engine.memory_plan();
        let tensors: Vec<_> = (0..engine.graph().tensors().len())
            .map(model_ir::TensorId)
            .filter_map(|t| Some((plan.tensor_slot(t)?, plan.lifetime(t)?)))
            .collect();
        for (i, (sa, (fa, la))) in tensors.iter().enumerate() {
            for (sb, (fb, lb)) in &tensors[i + 1..] {
                if fa <= lb && fb <= la {
                    assert!(!sa.overlaps(sb), "round {round}: {sa:?} aliases {sb:?}");
                }
            }
        }
        assert!(plan.arena_bytes() >= plan.stats().peak_live_bytes);

        let x = Tensor::from_f32(vec![1, 3, 3, channels], &vec![1.0; 9 * channels]).unwrap();
        assert!(engine.run(&[x]).is_ok());
    }
}

// ── Shape epochs and budgets ───────────────────────────────────

#[test]
fn test_reshape_replans_arena() {
    let mut engine = ready(conv_net(), config("64K", &["planar", "cpu"]));
    let before = engine.memory_plan().arena_bytes();

    engine.reshape(&[("x", vec![1, 10, 10, 3])]).unwrap();
    assert_eq!(engine.epoch(), 1);
    assert!(engine.memory_plan().arena_bytes() > before);

    let x = Tensor::from_f32(vec![1, 10, 10, 3], &ramp(300, 5, 2.0)).unwrap();
    let out = engine.run(&[x]).unwrap();
    assert_eq!(out.outputs[0].dims(), &[1, 5, 5, 4]);

    let err = engine.run(&[Tensor::zeros(vec![1, 6, 6, 3], DType::F32)]).unwrap_err();
    assert!(matches!(err, RuntimeError::InputMismatch { .. }));
}

#[test]
fn test_over_budget_is_rejected() {
    let err = InferenceEngine::new(config("256", &["cpu"]))
        .prepare(conv_net())
        .unwrap()
        .plan()
        .unwrap_err();
    assert!(err.to_string().contains("budget"));
}

#[test]
fn test_unsupported_configuration_names_node() {
    let mut g = Graph::new("no_backend", Layout::Nhwc);
    let x = g.add_input("x", TensorInfo::new(vec![1, 4], DType::F32));
    let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
    g.add_node(Node::new(
        "act",
        OpKind::Softmax,
        vec![x],
        vec![y],
        NodeOptions::Softmax(SoftmaxOptions { beta: 1.0 }),
    ));
    g.mark_output(y);

    let err = InferenceEngine::new(config("4K", &["cpu"]))
        .with_backends(vec![Box::new(PlanarBackend::default())])
        .prepare(g.validate().unwrap())
        .unwrap_err();
    match err {
        RuntimeError::BackendError(BackendError::UnsupportedConfiguration { node, name, .. }) => {
            assert_eq!(node, 0);
            assert_eq!(name, "act");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Loading from disk ──────────────────────────────────────────

const MANIFEST: &str = r#"{
    "name": "scale",
    "layout": "nhwc",
    "inputs": ["x"],
    "outputs": ["y"],
    "tensors": [
        { "name": "x", "dtype": "f32", "shape": [-1, 2, 2, 1] },
        { "name": "w", "dtype": "f32", "shape": [1, 1, 1, 1], "values": [3.0] },
        { "name": "y", "dtype": "f32" }
    ],
    "nodes": [
        { "name": "conv", "op": "conv2d", "inputs": ["x", "w"], "outputs": ["y"],
          "options": { "padding": "valid" } }
    ]
}"#;

#[test]
fn test_load_model_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.json"), MANIFEST).unwrap();
    let toml = format!(
        "model_path = {:?}\nmemory_budget = \"4K\"\n\n[input_shapes]\nx = [2, 2, 2, 1]\n",
        dir.path().display().to_string()
    );
    let cfg = RuntimeConfig::from_toml(&toml).unwrap();

    let mut engine = InferenceEngine::new(cfg).load_model().unwrap().plan().unwrap();
    let x = Tensor::from_f32(vec![2, 2, 2, 1], &ramp(8, 8, 0.0)).unwrap();
    let out = engine.run(&[x]).unwrap();
    assert_eq!(
        out.output("y").unwrap().to_f32_vec(),
        vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0]
    );
}

#[test]
fn test_missing_model_directory() {
    let cfg = RuntimeConfig {
        model_path: "/nonexistent/model".into(),
        ..Default::default()
    };
    let err = InferenceEngine::new(cfg).load_model().unwrap_err();
    assert!(matches!(err, RuntimeError::ModelError(_)));
}
