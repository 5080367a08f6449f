// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model graph: tensors and nodes stored in index-addressed arenas.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! Graph<Loaded>     — nodes and tensors as built, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated>  — references checked, acyclic, execution order cached.
//! ```
//!
//! Shape inference, negotiation and planning only accept a validated graph.
//! Structural edits go back through [`Graph::into_loaded`] and a fresh
//! validation, so a cached order can never describe a different graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::marker::PhantomData;

use tensor_core::{ConstantData, Layout, ShapeStatus, TensorInfo};

use crate::{ModelError, Node, NodeId, TensorDef, TensorId, TensorKind};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been built but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and carries its execution order.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone + private::Sealed {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Loaded {}
    impl Sealed for super::Validated {}
}

// ── Graph ──────────────────────────────────────────────────────────

/// A directed acyclic graph of operations with tensors as edges.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    /// Human-readable model name.
    pub name: String,
    /// Layout the model was authored in.
    pub layout: Layout,
    tensors: Vec<TensorDef>,
    nodes: Vec<Node>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    /// Execution order; empty until validated.
    order: Vec<NodeId>,
    producers: Vec<Option<NodeId>>,
    consumers: Vec<Vec<NodeId>>,
    _state: PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates an empty graph in the `Loaded` state.
    pub fn new(name: impl Into<String>, layout: Layout) -> Self {
        Self {
            name: name.into(),
            layout,
            tensors: Vec::new(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            order: Vec::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Appends a tensor. Input tensors are also registered as graph inputs.
    pub fn add_tensor(&mut self, def: TensorDef) -> TensorId {
        let id = TensorId(self.tensors.len());
        if def.kind == TensorKind::Input {
            self.inputs.push(id);
        }
        self.tensors.push(def);
        id
    }

    pub fn add_input(&mut self, name: impl Into<String>, info: TensorInfo) -> TensorId {
        self.add_tensor(TensorDef::input(name, info))
    }

    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        info: TensorInfo,
        data: ConstantData,
    ) -> TensorId {
        self.add_tensor(TensorDef::constant(name, info, data))
    }

    pub fn add_intermediate(&mut self, name: impl Into<String>, info: TensorInfo) -> TensorId {
        self.add_tensor(TensorDef::intermediate(name, info))
    }

    /// Appends a node. References are checked by [`Graph::validate`].
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Replaces the graph input list (host binding order).
    pub fn set_inputs(&mut self, ids: Vec<TensorId>) {
        self.inputs = ids;
    }

    /// Marks a produced tensor as a graph output.
    pub fn mark_output(&mut self, id: TensorId) {
        if let Some(t) = self.tensors.get_mut(id.0) {
            if t.kind == TensorKind::Intermediate {
                t.kind = TensorKind::Output;
            }
        }
        if !self.outputs.contains(&id) {
            self.outputs.push(id);
        }
    }

    /// Replaces the graph output at `position` (used when a conversion
    /// node takes over the production of an output).
    pub fn replace_output(&mut self, position: usize, id: TensorId) {
        if let Some(slot) = self.outputs.get_mut(position) {
            *slot = id;
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn tensor_mut(&mut self, id: TensorId) -> Option<&mut TensorDef> {
        self.tensors.get_mut(id.0)
    }

    /// Duplicates `source` into this graph as a disconnected node.
    ///
    /// Kind, name and option table are carried over unchanged; the tensor
    /// bindings are left empty for the caller to fill in. A source whose
    /// options are incomplete (an `Undefined` padding or activation) or do
    /// not belong to its kind is rejected.
    pub fn clone_node_from(&mut self, source: &Node) -> Result<NodeId, ModelError> {
        let node = self.nodes.len();
        if !source.options.matches(source.kind) {
            return Err(ModelError::InvalidNode {
                node,
                name: source.name.clone(),
                detail: format!("options do not belong to op '{}'", source.kind),
            });
        }
        source
            .options
            .check()
            .map_err(|detail| ModelError::InvalidNode {
                node,
                name: source.name.clone(),
                detail,
            })?;
        Ok(self.add_node(Node::new(
            source.name.clone(),
            source.kind,
            Vec::new(),
            Vec::new(),
            source.options.clone(),
        )))
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - Every tensor id referenced by a node or the graph I/O is in range.
    /// - Every constant carries data; inputs and constants are never produced.
    /// - Each tensor has at most one producer; graph outputs have one.
    /// - Each node's options belong to its kind and are complete.
    /// - Node inputs are graph inputs, constants or produced tensors.
    /// - The graph is acyclic.
    pub fn validate(self) -> Result<Graph<Validated>, ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidGraph("graph contains no nodes".into()));
        }
        let n_tensors = self.tensors.len();
        let in_range = |t: &TensorId| t.0 < n_tensors;

        for t in self.inputs.iter().chain(&self.outputs) {
            if !in_range(t) {
                return Err(ModelError::InvalidGraph(format!(
                    "graph I/O references missing tensor {t}"
                )));
            }
        }
        for t in &self.tensors {
            if t.is_constant() && t.data.is_none() {
                return Err(ModelError::InvalidTensor {
                    tensor: t.name.clone(),
                    detail: "constant has no data".into(),
                });
            }
        }

        let mut producers: Vec<Option<NodeId>> = vec![None; n_tensors];
        let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); n_tensors];
        for (i, node) in self.nodes.iter().enumerate() {
            let invalid = |detail: String| ModelError::InvalidNode {
                node: i,
                name: node.name.clone(),
                detail,
            };
            if !node.options.matches(node.kind) {
                return Err(invalid(format!("options do not belong to op '{}'", node.kind)));
            }
            node.options.check().map_err(invalid)?;
            if node.outputs.is_empty() {
                return Err(invalid("node has no outputs".into()));
            }
            for t in node.inputs.iter().chain(&node.outputs) {
                if !in_range(t) {
                    return Err(invalid(format!("references missing tensor {t}")));
                }
            }
            for &t in &node.outputs {
                let def = &self.tensors[t.0];
                if matches!(def.kind, TensorKind::Input | TensorKind::Constant) {
                    return Err(invalid(format!(
                        "writes {:?} tensor '{}'",
                        def.kind, def.name
                    )));
                }
                if let Some(other) = producers[t.0] {
                    return Err(ModelError::InvalidGraph(format!(
                        "tensor '{}' produced by nodes {other} and #{i}",
                        def.name
                    )));
                }
                producers[t.0] = Some(NodeId(i));
            }
            for &t in &node.inputs {
                if !consumers[t.0].contains(&NodeId(i)) {
                    consumers[t.0].push(NodeId(i));
                }
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            for &t in &node.inputs {
                let def = &self.tensors[t.0];
                let sourced = matches!(def.kind, TensorKind::Input | TensorKind::Constant)
                    || producers[t.0].is_some();
                if !sourced {
                    return Err(ModelError::InvalidNode {
                        node: i,
                        name: node.name.clone(),
                        detail: format!("input '{}' is never produced", def.name),
                    });
                }
            }
        }
        for &t in &self.outputs {
            let def = &self.tensors[t.0];
            if producers[t.0].is_none() && def.kind != TensorKind::Input {
                return Err(ModelError::InvalidGraph(format!(
                    "graph output '{}' is never produced",
                    def.name
                )));
            }
        }

        let order = topological_order(&self.nodes, &producers)?;
        tracing::debug!(
            "validated graph '{}': {} nodes, {} tensors",
            self.name,
            self.nodes.len(),
            n_tensors
        );

        Ok(Graph {
            name: self.name,
            layout: self.layout,
            tensors: self.tensors,
            nodes: self.nodes,
            inputs: self.inputs,
            outputs: self.outputs,
            order,
            producers,
            consumers,
            _state: PhantomData,
        })
    }
}

/// Kahn's algorithm; among ready nodes the lowest index runs first.
fn topological_order(
    nodes: &[Node],
    producers: &[Option<NodeId>],
) -> Result<Vec<NodeId>, ModelError> {
    let mut indegree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let upstream: HashSet<usize> = node
            .inputs
            .iter()
            .filter_map(|t| producers[t.0])
            .map(|p| p.0)
            .collect();
        indegree[i] = upstream.len();
        for p in upstream {
            dependents[p].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(NodeId(i));
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(i, _)| nodes[i].name.as_str())
            .collect();
        return Err(ModelError::InvalidGraph(format!(
            "graph contains a cycle through {stuck:?}"
        )));
    }
    Ok(order)
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    /// Deterministic execution order: every node follows its producers.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Node that produces `id`, if any.
    pub fn producer(&self, id: TensorId) -> Option<NodeId> {
        self.producers.get(id.0).copied().flatten()
    }

    /// Nodes that read `id`, in index order.
    pub fn consumers(&self, id: TensorId) -> &[NodeId] {
        self.consumers.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Overwrites the resolved descriptor of a non-constant tensor.
    pub fn set_info(&mut self, id: TensorId, info: TensorInfo) {
        if let Some(t) = self.tensors.get_mut(id.0) {
            if !t.is_constant() {
                t.info = info;
            }
        }
    }

    /// Starts a new shape epoch: every produced tensor goes back to
    /// `Undefined` while keeping its declared dtype and quantization.
    pub fn reset_derived_shapes(&mut self) {
        for (i, t) in self.tensors.iter_mut().enumerate() {
            if self.producers[i].is_some() {
                t.info.status = ShapeStatus::Undefined;
            }
        }
    }

    /// Returns to the `Loaded` state for structural edits.
    pub fn into_loaded(self) -> Graph<Loaded> {
        Graph {
            name: self.name,
            layout: self.layout,
            tensors: self.tensors,
            nodes: self.nodes,
            inputs: self.inputs,
            outputs: self.outputs,
            order: Vec::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            _state: PhantomData,
        }
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let constant_bytes: usize = self
            .tensors
            .iter()
            .filter_map(|t| t.data.as_ref().map(|d| d.len()))
            .sum();
        format!(
            "Graph '{}' ({}): {} nodes, {} tensors, {} inputs, {} outputs, {:.1} KB constants",
            self.name,
            self.layout,
            self.nodes.len(),
            self.tensors.len(),
            self.inputs.len(),
            self.outputs.len(),
            constant_bytes as f64 / 1024.0,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> Graph<S> {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn tensors(&self) -> &[TensorDef] {
        &self.tensors
    }

    pub fn tensor(&self, id: TensorId) -> Option<&TensorDef> {
        self.tensors.get(id.0)
    }

    /// Resolved descriptor of `id`.
    pub fn info(&self, id: TensorId) -> Option<&TensorInfo> {
        self.tensors.get(id.0).map(|t| &t.info)
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn find_tensor(&self, name: &str) -> Option<TensorId> {
        self.tensors
            .iter()
            .position(|t| t.name == name)
            .map(TensorId)
    }
}

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Graph '{}' ({} nodes, {} tensors):",
            self.name,
            self.nodes.len(),
            self.tensors.len()
        )?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f, "  #{i:<3} {}", node.summary())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ArithmeticOptions, Conv2DOptions, NodeOptions, OpKind, Pool2DOptions,
    };
    use tensor_core::{DType, FusedActivation, Padding};

    fn add_opts() -> NodeOptions {
        NodeOptions::Arithmetic(ArithmeticOptions::default())
    }

    /// Helper: input -> relu -> add(relu, input) -> output.
    fn diamond() -> Graph<Loaded> {
        let mut g = Graph::new("diamond", Layout::Nhwc);
        let x = g.add_input("x", TensorInfo::new(vec![1, 4], DType::F32));
        let r = g.add_intermediate("r", TensorInfo::undefined(DType::F32));
        let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
        g.add_node(Node::new("add", OpKind::Add, vec![r, x], vec![y], add_opts()));
        g.add_node(Node::new("relu", OpKind::Relu, vec![x], vec![r], NodeOptions::None));
        g.mark_output(y);
        g
    }

    #[test]
    fn test_validate_orders_producers_first() {
        let g = diamond().validate().unwrap();
        assert_eq!(g.order(), &[NodeId(1), NodeId(0)]);
        assert_eq!(g.producer(TensorId(1)), Some(NodeId(1)));
        assert_eq!(g.consumers(TensorId(0)), &[NodeId(0), NodeId(1)]);
        assert_eq!(g.tensor(TensorId(2)).unwrap().kind, TensorKind::Output);
    }

    #[test]
    fn test_order_ties_break_by_index() {
        let mut g = Graph::new("fan", Layout::Nhwc);
        let x = g.add_input("x", TensorInfo::new(vec![4], DType::F32));
        let outs: Vec<_> = (0..3)
            .map(|i| g.add_intermediate(format!("o{i}"), TensorInfo::undefined(DType::F32)))
            .collect();
        for (i, &o) in outs.iter().enumerate().rev() {
            g.add_node(Node::new(format!("n{i}"), OpKind::Relu, vec![x], vec![o], NodeOptions::None));
        }
        let g = g.validate().unwrap();
        assert_eq!(g.order(), &[NodeId(0), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut g = Graph::new("cycle", Layout::Nhwc);
        let a = g.add_intermediate("a", TensorInfo::undefined(DType::F32));
        let b = g.add_intermediate("b", TensorInfo::undefined(DType::F32));
        g.add_node(Node::new("n0", OpKind::Relu, vec![b], vec![a], NodeOptions::None));
        g.add_node(Node::new("n1", OpKind::Relu, vec![a], vec![b], NodeOptions::None));
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_validate_rejects_two_producers() {
        let mut g = Graph::new("dup", Layout::Nhwc);
        let x = g.add_input("x", TensorInfo::new(vec![4], DType::F32));
        let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
        g.add_node(Node::new("n0", OpKind::Relu, vec![x], vec![y], NodeOptions::None));
        g.add_node(Node::new("n1", OpKind::Tanh, vec![x], vec![y], NodeOptions::None));
        assert!(matches!(g.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_validate_rejects_unproduced_input() {
        let mut g = Graph::new("dangling", Layout::Nhwc);
        let ghost = g.add_intermediate("ghost", TensorInfo::undefined(DType::F32));
        let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
        g.add_node(Node::new("n0", OpKind::Relu, vec![ghost], vec![y], NodeOptions::None));
        let err = g.validate().unwrap_err();
        assert!(matches!(err, ModelError::InvalidNode { node: 0, .. }));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut g = Graph::new("range", Layout::Nhwc);
        let x = g.add_input("x", TensorInfo::new(vec![4], DType::F32));
        g.add_node(Node::new("n0", OpKind::Relu, vec![x], vec![TensorId(9)], NodeOptions::None));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_undefined_padding() {
        let mut g = Graph::new("pad", Layout::Nhwc);
        let x = g.add_input("x", TensorInfo::new(vec![1, 4, 4, 1], DType::F32));
        let y = g.add_intermediate("y", TensorInfo::undefined(DType::F32));
        let opts = NodeOptions::Pool2D(Pool2DOptions {
            padding: Padding::Undefined,
            stride_h: 1,
            stride_w: 1,
            filter_h: 2,
            filter_w: 2,
            fused_activation: FusedActivation::None,
        });
        g.add_node(Node::new("pool", OpKind::MaxPool2D, vec![x], vec![y], opts));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_clone_node_preserves_options() {
        let opts = NodeOptions::Conv2D(Conv2DOptions {
            padding: Padding::Same,
            stride_h: 2,
            stride_w: 3,
            dilation_h: 1,
            dilation_w: 2,
            fused_activation: FusedActivation::Relu6,
        });
        let source = Node::new("conv", OpKind::Conv2D, vec![TensorId(0)], vec![TensorId(1)], opts);
        let mut fresh = Graph::new("fresh", Layout::Nhwc);
        let id = fresh.clone_node_from(&source).unwrap();
        let cloned = fresh.node(id).unwrap();
        assert_eq!(cloned.kind, source.kind);
        assert_eq!(cloned.name, source.name);
        assert_eq!(cloned.options, source.options);
        assert!(cloned.inputs.is_empty());
    }

    #[test]
    fn test_clone_node_rejects_undefined_enums() {
        let mut opts = Conv2DOptions {
            padding: Padding::Undefined,
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            fused_activation: FusedActivation::None,
        };
        let mut fresh = Graph::new("fresh", Layout::Nhwc);
        let node = Node::new("conv", OpKind::Conv2D, vec![], vec![], NodeOptions::Conv2D(opts.clone()));
        assert!(fresh.clone_node_from(&node).is_err());

        opts.padding = Padding::Valid;
        opts.fused_activation = FusedActivation::Undefined;
        let node = Node::new("conv", OpKind::Conv2D, vec![], vec![], NodeOptions::Conv2D(opts));
        assert!(fresh.clone_node_from(&node).is_err());
        assert_eq!(fresh.num_nodes(), 0);
    }

    #[test]
    fn test_reset_derived_shapes() {
        let mut g = diamond().validate().unwrap();
        g.set_info(TensorId(1), TensorInfo::new(vec![1, 4], DType::F32));
        g.reset_derived_shapes();
        assert!(!g.info(TensorId(1)).unwrap().is_ready());
        assert!(g.info(TensorId(0)).unwrap().is_ready());
    }

    #[test]
    fn test_summary_and_display() {
        let g = diamond().validate().unwrap();
        assert!(g.summary().contains("2 nodes"));
        let shown = format!("{g}");
        assert!(shown.contains("relu"));
        assert!(shown.contains("add"));
    }

    #[test]
    fn test_into_loaded_roundtrip() {
        let g = diamond().validate().unwrap().into_loaded();
        assert!(g.validate().is_ok());
    }
}
