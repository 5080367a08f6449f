// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layout negotiation.
//!
//! Nodes are visited in execution order. Each takes the first backend in
//! the caller's preference list that computes its kind and operand type in
//! an acceptable layout:
//!
//! - spatial kinds prefer the backend's native layout, then the graph's
//!   frontend layout;
//! - element-wise kinds whose operands share one shape follow the layout
//!   of their producer;
//! - every other kind interprets axes in frontend order and runs in the
//!   frontend layout.
//!
//! Where a rank-4 operand is stored in a layout other than the one its
//! consumer runs in, a `Permute` node is synthesized on that edge, hosted
//! by a backend that supports permutation. Conversions are shared per
//! (tensor, layout). Graph outputs are always handed back in the frontend
//! layout.

use std::collections::HashMap;
use std::fmt::Write as _;

use model_ir::{
    Graph, GraphState, Loaded, Node, NodeId, NodeOptions, OpKind, PermuteOptions, ShapeInference,
    TensorId, Validated,
};
use tensor_core::{DType, Layout, Shape, ShapeStatus, TensorInfo};
use tracing::{debug, info};

use crate::{Backend, BackendError};

/// Backend and layout chosen for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct NodeAssignment {
    /// Index into the backend list negotiation was given.
    pub backend: usize,
    pub layout: Layout,
}

/// A graph lowered onto concrete backends.
///
/// Node ids of the input graph are preserved; synthesized conversions are
/// appended after them. Derived shapes are reset so they can be re-inferred
/// in each node's negotiated layout.
#[derive(Debug)]
pub struct NegotiatedGraph {
    pub graph: Graph<Validated>,
    /// One entry per node, indexed by [`NodeId`].
    pub assignments: Vec<NodeAssignment>,
    /// Number of `Permute` nodes inserted.
    pub conversions: usize,
    backend_ids: Vec<String>,
}

impl NegotiatedGraph {
    pub fn assignment(&self, id: NodeId) -> Option<&NodeAssignment> {
        self.assignments.get(id.0)
    }

    /// Layout node `id` executes in.
    pub fn layout(&self, id: NodeId) -> Layout {
        self.assignment(id).map_or(self.graph.layout, |a| a.layout)
    }

    pub fn backend_id(&self, id: NodeId) -> Option<&str> {
        self.assignment(id)
            .and_then(|a| self.backend_ids.get(a.backend))
            .map(String::as_str)
    }

    /// Human-readable assignment table.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Negotiated: {} nodes, {} layout conversions\n",
            self.assignments.len(),
            self.conversions
        );
        for (i, backend) in self.backend_ids.iter().enumerate() {
            let count = self.assignments.iter().filter(|a| a.backend == i).count();
            if count > 0 {
                let _ = writeln!(s, "  {backend}: {count} nodes");
            }
        }
        for &id in self.graph.order() {
            if let Some(node) = self.graph.node(id) {
                let _ = writeln!(
                    s,
                    "  {id} {:<18} {:<24} {} [{}]",
                    node.kind.as_str(),
                    node.name,
                    self.backend_id(id).unwrap_or("?"),
                    self.layout(id)
                );
            }
        }
        s
    }
}

/// How a node's result depends on the physical layout of its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutClass {
    Spatial,
    Elementwise,
    Frontend,
}

/// Inputs whose layout the node's computation depends on. Weights, bias
/// and shape-driving operands are excluded.
fn activation_operands(node: &Node) -> std::ops::Range<usize> {
    match node.kind {
        OpKind::TransposeConv => 2..3.min(node.inputs.len()),
        OpKind::Conv2D
        | OpKind::DepthwiseConv2D
        | OpKind::FullyConnected
        | OpKind::Reshape
        | OpKind::Transpose
        | OpKind::StridedSlice
        | OpKind::Mean => 0..1.min(node.inputs.len()),
        _ => 0..node.inputs.len(),
    }
}

/// Classifies `kind` given its operand shapes in frontend order.
/// Broadcasting element-wise ops align axes by position, so they stay in
/// the frontend layout.
fn layout_class(kind: OpKind, shapes: &[Shape]) -> LayoutClass {
    if kind.is_spatial() {
        LayoutClass::Spatial
    } else if kind.is_elementwise() && shapes.windows(2).all(|w| w[0] == w[1]) {
        LayoutClass::Elementwise
    } else {
        LayoutClass::Frontend
    }
}

fn is_rank4<S: GraphState>(graph: &Graph<S>, t: TensorId) -> bool {
    let rank4 = graph.info(t).is_some_and(|i| i.shape.rank() == 4);
    rank4
        || graph
            .nodes()
            .iter()
            .any(|n| n.kind.is_spatial() && n.outputs.contains(&t))
}

fn permute_template(from: Layout, to: Layout) -> Node {
    Node::new(
        "permute",
        OpKind::Permute,
        Vec::new(),
        Vec::new(),
        NodeOptions::Permute(PermuteOptions { from, to }),
    )
}

/// Physical layout of every tensor, and the converted copies made so far.
struct Rewrite {
    frontend: Layout,
    stored: HashMap<TensorId, Layout>,
    converted: HashMap<(TensorId, Layout), TensorId>,
    assignments: Vec<NodeAssignment>,
    conversions: usize,
}

impl Rewrite {
    fn stored(&self, t: TensorId) -> Layout {
        self.stored.get(&t).copied().unwrap_or(self.frontend)
    }

    /// Tensor holding `t` in `layout`, synthesizing a conversion when none
    /// exists yet.
    fn convert(
        &mut self,
        graph: &mut Graph<Loaded>,
        t: TensorId,
        layout: Layout,
        host: usize,
    ) -> TensorId {
        let from = self.stored(t);
        if from == layout {
            return t;
        }
        if let Some(&done) = self.converted.get(&(t, layout)) {
            return done;
        }
        let (name, info) = match graph.tensor(t) {
            Some(def) => (def.name.clone(), def.info.clone()),
            None => return t,
        };
        let copy = graph.add_intermediate(format!("{name}@{layout}"), permuted(&info, from, layout));
        self.add_permute(graph, t, copy, from, layout, host);
        self.stored.insert(copy, layout);
        self.converted.insert((t, layout), copy);
        copy
    }

    fn add_permute(
        &mut self,
        graph: &mut Graph<Loaded>,
        src: TensorId,
        dst: TensorId,
        from: Layout,
        to: Layout,
        host: usize,
    ) {
        let name = graph.tensor(src).map_or_else(String::new, |d| d.name.clone());
        graph.add_node(Node::new(
            format!("permute_{name}_{to}"),
            OpKind::Permute,
            vec![src],
            vec![dst],
            NodeOptions::Permute(PermuteOptions { from, to }),
        ));
        self.assignments.push(NodeAssignment { backend: host, layout: to });
        self.conversions += 1;
        debug!(tensor = %name, %from, %to, "inserted layout conversion");
    }
}

fn permuted(info: &TensorInfo, from: Layout, to: Layout) -> TensorInfo {
    TensorInfo {
        shape: from.permute_shape(&info.shape, to),
        dtype: info.dtype,
        quantization: info.quantization.clone(),
        status: ShapeStatus::Undefined,
    }
}

/// Index of the backend that hosts conversions for a node placed on
/// `preferred`.
fn permutation_host(
    backends: &[Box<dyn Backend>],
    preferred: usize,
    dtype: DType,
    from: Layout,
    to: Layout,
) -> Option<usize> {
    if backends[preferred].supports_permutation() {
        return Some(preferred);
    }
    let template = permute_template(from, to);
    backends
        .iter()
        .position(|b| b.supports_permutation() && b.supports(&template, dtype))
}

/// Assigns every node of `graph` to one of `backends` (in preference order)
/// and inserts the layout conversions the assignment requires.
pub fn negotiate(
    mut graph: Graph<Validated>,
    backends: &[Box<dyn Backend>],
) -> Result<NegotiatedGraph, BackendError> {
    if backends.is_empty() {
        return Err(BackendError::NoBackends);
    }
    let frontend = graph.layout;
    // Ranks and operand types of intermediates, as far as they resolve.
    ShapeInference::run(&mut graph, |_| frontend)?;

    let order = graph.order().to_vec();
    let outputs: Vec<TensorId> = graph.outputs().to_vec();
    let num_nodes = graph.num_nodes();
    let mut graph = graph.into_loaded();
    let mut rw = Rewrite {
        frontend,
        stored: HashMap::new(),
        converted: HashMap::new(),
        assignments: vec![
            NodeAssignment {
                backend: 0,
                layout: frontend
            };
            num_nodes
        ],
        conversions: 0,
    };

    for id in order {
        let Some(node) = graph.node(id).cloned() else { continue };
        let operands = activation_operands(&node);
        let dtype = node
            .inputs
            .get(operands.start)
            .or_else(|| node.inputs.first())
            .and_then(|&t| graph.info(t))
            .map_or(DType::F32, |i| i.dtype);
        let rank4_inputs: Vec<(usize, TensorId)> = operands
            .clone()
            .map(|i| (i, node.inputs[i]))
            .filter(|&(_, t)| is_rank4(&graph, t))
            .collect();
        let rank4_outputs: Vec<(usize, TensorId)> = node
            .outputs
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, t)| is_rank4(&graph, t))
            .collect();
        let follow = rank4_inputs
            .first()
            .map_or(frontend, |&(_, t)| rw.stored(t));
        let shapes: Vec<Shape> = node
            .inputs
            .iter()
            .filter_map(|&t| graph.info(t).map(|i| rw.stored(t).permute_shape(&i.shape, frontend)))
            .collect();
        let class = layout_class(node.kind, &shapes);

        let mut choice = None;
        for (b, backend) in backends.iter().enumerate() {
            if !backend.supports(&node, dtype) {
                continue;
            }
            let candidates = match class {
                LayoutClass::Spatial => vec![backend.native_layout(), frontend],
                LayoutClass::Elementwise => vec![follow, backend.native_layout(), frontend],
                LayoutClass::Frontend => vec![frontend],
            };
            let found = candidates.into_iter().find_map(|layout| {
                if !backend.supports_layout(&node, layout) {
                    return None;
                }
                let needs_in = rank4_inputs.iter().find(|&&(_, t)| rw.stored(t) != layout);
                let needs_out = layout != frontend
                    && rank4_outputs.iter().any(|&(_, t)| outputs.contains(&t));
                let host = match (needs_in, needs_out) {
                    (None, false) => b,
                    (Some(&(_, t)), _) => permutation_host(backends, b, dtype, rw.stored(t), layout)?,
                    (None, true) => permutation_host(backends, b, dtype, layout, frontend)?,
                };
                Some((layout, host))
            });
            if let Some((layout, host)) = found {
                choice = Some((b, layout, host));
                break;
            }
        }
        let Some((backend, layout, host)) = choice else {
            return Err(BackendError::UnsupportedConfiguration {
                node: id.0,
                name: node.name,
                kind: node.kind,
                dtype,
            });
        };
        debug!(
            node = %id,
            name = %node.name,
            backend = backends[backend].id(),
            %layout,
            "assigned node"
        );
        rw.assignments[id.0] = NodeAssignment { backend, layout };

        for &(i, t) in &rank4_inputs {
            let src = rw.convert(&mut graph, t, layout, host);
            if let Some(n) = graph.node_mut(id) {
                n.inputs[i] = src;
            }
        }
        for &(j, t) in &rank4_outputs {
            if layout == frontend {
                continue;
            }
            if outputs.contains(&t) {
                let Some(info) = graph.info(t).cloned() else { continue };
                let name = graph.tensor(t).map_or_else(String::new, |d| d.name.clone());
                let inner = graph.add_intermediate(format!("{name}@{layout}"), permuted(&info, frontend, layout));
                if let Some(n) = graph.node_mut(id) {
                    n.outputs[j] = inner;
                }
                rw.add_permute(&mut graph, inner, t, layout, frontend, host);
                rw.stored.insert(inner, layout);
                rw.converted.insert((t, layout), inner);
            } else {
                if let Some(def) = graph.tensor_mut(t) {
                    def.info.shape = frontend.permute_shape(&def.info.shape, layout);
                }
                rw.stored.insert(t, layout);
            }
        }
    }

    let mut graph = graph.validate().map_err(BackendError::Graph)?;
    graph.reset_derived_shapes();
    let negotiated = NegotiatedGraph {
        graph,
        assignments: rw.assignments,
        conversions: rw.conversions,
        backend_ids: backends.iter().map(|b| b.id().to_string()).collect(),
    };
    info!(
        nodes = negotiated.assignments.len(),
        conversions = negotiated.conversions,
        "backend negotiation finished"
    );
    Ok(negotiated)
}
