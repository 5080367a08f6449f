// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-node graphs for kernel tests.

use model_ir::{Graph, Node, NodeId, NodeOptions, OpKind, TensorDef, Validated};
use tensor_core::{ConstantData, DType, Element, Layout, Quantization, TensorInfo, TensorView};

use crate::{Kernel, KernelIo, KernelRegistry};

pub(crate) fn input(name: &str, dims: &[usize], dtype: DType) -> TensorDef {
    TensorDef::input(name, TensorInfo::new(dims.to_vec(), dtype))
}

pub(crate) fn constant<T: Element>(name: &str, dims: &[usize], values: &[T]) -> TensorDef {
    TensorDef::constant(
        name,
        TensorInfo::new(dims.to_vec(), T::DTYPE),
        ConstantData::from_values(values),
    )
}

pub(crate) fn quantized(mut def: TensorDef, scale: f32, zero_point: i64) -> TensorDef {
    def.info.quantization = Some(Quantization::per_tensor(scale, zero_point));
    def
}

pub(crate) fn output(dtype: DType) -> TensorInfo {
    TensorInfo::undefined(dtype)
}

pub(crate) fn bytes<T: Element>(values: &[T]) -> Vec<u8> {
    ConstantData::from_values(values).as_bytes().to_vec()
}

pub(crate) fn decode<T: Element>(bytes: &[u8]) -> Vec<T> {
    let n = bytes.len() / T::DTYPE.size_bytes();
    TensorView::new(&[n], T::DTYPE, bytes).unwrap().to_vec()
}

/// One `kind` node over `inputs` producing `y`.
pub(crate) fn graph_with(
    kind: OpKind,
    inputs: Vec<TensorDef>,
    out: TensorInfo,
    options: NodeOptions,
) -> Graph<Validated> {
    let mut g = Graph::new(kind.as_str(), Layout::Nhwc);
    let ids = inputs.into_iter().map(|d| g.add_tensor(d)).collect();
    let y = g.add_intermediate("y", out);
    g.add_node(Node::new(kind.as_str(), kind, ids, vec![y], options));
    g.mark_output(y);
    g.validate().unwrap()
}

pub(crate) fn configured(graph: &mut Graph<Validated>) -> Kernel {
    let node = graph.node(NodeId(0)).unwrap().clone();
    let mut kernel = KernelRegistry::reference()
        .build(NodeId(0), &node, graph.layout)
        .unwrap();
    kernel.configure(graph).unwrap();
    kernel
}

/// Executes `kernel`, taking constants from the graph and every other
/// input from `host` in order.
pub(crate) fn execute(graph: &Graph<Validated>, kernel: &Kernel, host: &[&[u8]]) -> Vec<u8> {
    let mut host = host.iter();
    let inputs: Vec<&[u8]> = kernel
        .inputs()
        .iter()
        .map(|&t| match &graph.tensor(t).unwrap().data {
            Some(data) => data.as_bytes(),
            None => *host.next().unwrap(),
        })
        .collect();
    let mut out = vec![0u8; kernel.output_bytes()];
    let mut scratch = vec![0u8; kernel.scratch_bytes()];
    kernel
        .execute(&mut KernelIo::new(&inputs, &mut out).with_scratch(&mut scratch))
        .unwrap();
    out
}
