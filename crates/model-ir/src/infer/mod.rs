// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape and type inference.
//!
//! Every operation kind has one rule that maps its input descriptors to
//! output descriptors. Rules are pure: they read [`TensorDef`]s and return
//! [`TensorInfo`]s, and the same rule runs twice per shape epoch:
//!
//! 1. statically, over the whole graph, by [`ShapeInference::run`], where
//!    dimensions may still be unknown;
//! 2. during kernel configuration, on concrete shapes.
//!
//! A rule distinguishes two failures. [`InferError::NotReady`] means an
//! input has no authoritative shape yet; the caller may retry once the
//! producer is resolved. [`InferError::Invalid`] means the node can never
//! be resolved and aborts preparation.

mod conv;
mod elementwise;
mod pool;
mod reduce;
mod shape_ops;

pub use elementwise::broadcast_shapes;
pub use reduce::reduction_mask;
pub use shape_ops::{permutation, resolve_strided_slice, ResolvedAxis, SliceResolution};

use tensor_core::{DType, Dim, Layout, Quantization, Shape, ShapeStatus, TensorInfo};

use crate::{Graph, ModelError, Node, NodeId, OpKind, TensorDef, Validated};

/// Why a node's outputs could not be inferred.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferError {
    /// An input has status `Undefined`; retry after its producer resolves.
    #[error("input '{tensor}' is not ready")]
    NotReady { tensor: String },

    /// The node is structurally invalid.
    #[error("{0}")]
    Invalid(String),
}

impl InferError {
    /// `true` when the failure may go away once upstream nodes resolve.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InferError::NotReady { .. })
    }
}

pub(crate) fn invalid(detail: impl Into<String>) -> InferError {
    InferError::Invalid(detail.into())
}

// ── Rule output ────────────────────────────────────────────────────

/// How an output's quantization parameters are obtained.
#[derive(Debug, Clone)]
pub(crate) enum QuantRule {
    /// The op re-scales; quantized outputs must declare parameters.
    Rescaled,
    /// Propagates the given parameters unless the output declares its own.
    Inherit(Option<Quantization>),
    /// The op's output range is fixed.
    Fixed(Quantization),
}

#[derive(Debug, Clone)]
pub(crate) struct OutputRule {
    pub shape: Shape,
    pub dtype: DType,
    pub quant: QuantRule,
}

impl OutputRule {
    pub fn rescaled(shape: Shape, dtype: DType) -> Self {
        Self {
            shape,
            dtype,
            quant: QuantRule::Rescaled,
        }
    }

    pub fn inherit(shape: Shape, from: &TensorInfo) -> Self {
        Self {
            shape,
            dtype: from.dtype,
            quant: QuantRule::Inherit(from.quantization.clone()),
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────

/// Infers the output descriptors of `node`.
///
/// `inputs` and `declared` are the node's input and output tensors in
/// binding order; `layout` is the layout the node executes in. Declared
/// output dtypes must agree with the inferred ones, and declared
/// quantization takes precedence over propagated quantization.
pub fn infer_node(
    node: &Node,
    inputs: &[&TensorDef],
    layout: Layout,
    declared: &[&TensorDef],
) -> Result<Vec<TensorInfo>, InferError> {
    for t in inputs {
        if t.info.status != ShapeStatus::Valid {
            return Err(InferError::NotReady {
                tensor: t.name.clone(),
            });
        }
    }
    if declared.len() != node.outputs.len() {
        return Err(invalid(format!(
            "expected {} output descriptors, got {}",
            node.outputs.len(),
            declared.len()
        )));
    }

    let rules = match node.kind {
        OpKind::Conv2D => vec![conv::conv2d(node, inputs, layout)?],
        OpKind::DepthwiseConv2D => vec![conv::depthwise_conv2d(node, inputs, layout)?],
        OpKind::TransposeConv => vec![conv::transpose_conv(node, inputs, layout)?],
        OpKind::FullyConnected => vec![conv::fully_connected(node, inputs)?],
        OpKind::AveragePool2D | OpKind::MaxPool2D => vec![pool::pool2d(node, inputs, layout)?],
        OpKind::Add | OpKind::Mul => vec![elementwise::arithmetic(node, inputs)?],
        OpKind::Relu
        | OpKind::Relu6
        | OpKind::Logistic
        | OpKind::Tanh
        | OpKind::Gelu => vec![elementwise::activation(node, inputs)?],
        OpKind::Softmax => vec![elementwise::softmax(inputs)?],
        OpKind::Reshape => vec![shape_ops::reshape(node, inputs)?],
        OpKind::Transpose => vec![shape_ops::transpose(inputs)?],
        OpKind::StridedSlice => vec![shape_ops::strided_slice(node, inputs)?],
        OpKind::Permute => vec![shape_ops::permute(node, inputs)?],
        OpKind::Mean => vec![reduce::mean(node, inputs)?],
    };

    if rules.len() != declared.len() {
        return Err(invalid(format!(
            "'{}' produces {} outputs, node binds {}",
            node.kind,
            rules.len(),
            declared.len()
        )));
    }
    rules
        .into_iter()
        .zip(declared)
        .map(|(rule, decl)| finish(rule, decl))
        .collect()
}

/// Merges a rule's result with the declared output descriptor.
fn finish(rule: OutputRule, declared: &TensorDef) -> Result<TensorInfo, InferError> {
    if declared.info.dtype != rule.dtype {
        return Err(invalid(format!(
            "output '{}' declared as {}, op produces {}",
            declared.name, declared.info.dtype, rule.dtype
        )));
    }
    let quantization = match rule.quant {
        QuantRule::Rescaled => {
            if rule.dtype.is_quantized() && declared.info.quantization.is_none() {
                return Err(invalid(format!(
                    "quantized output '{}' has no quantization parameters",
                    declared.name
                )));
            }
            declared.info.quantization.clone()
        }
        QuantRule::Inherit(q) => declared.info.quantization.clone().or(q),
        QuantRule::Fixed(q) => match &declared.info.quantization {
            Some(d) if *d != q => {
                return Err(invalid(format!(
                    "output '{}' must be quantized with scale {} and zero point {}",
                    declared.name,
                    q.scale(),
                    q.zero_point()
                )))
            }
            _ => Some(q),
        },
    };
    Ok(TensorInfo {
        shape: rule.shape,
        dtype: rule.dtype,
        quantization,
        status: ShapeStatus::Valid,
    })
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Input `index`, or an arity error.
pub(crate) fn operand<'a>(
    inputs: &[&'a TensorDef],
    index: usize,
    what: &str,
) -> Result<&'a TensorDef, InferError> {
    inputs
        .get(index)
        .copied()
        .ok_or_else(|| invalid(format!("missing {what} operand (input {index})")))
}

pub(crate) fn expect_rank(t: &TensorDef, rank: usize) -> Result<(), InferError> {
    if t.info.shape.rank() != rank {
        return Err(invalid(format!(
            "'{}' must have rank {rank}, has shape {}",
            t.name, t.info.shape
        )));
    }
    Ok(())
}

pub(crate) fn expect_dtype_in(t: &TensorDef, allowed: &[DType], op: OpKind) -> Result<(), InferError> {
    if !allowed.contains(&t.info.dtype) {
        return Err(invalid(format!(
            "'{op}' does not support {} input '{}'",
            t.info.dtype, t.name
        )));
    }
    Ok(())
}

/// Integer values of a shape-driving operand, which must be a constant.
pub(crate) fn constant_ints(t: &TensorDef, what: &str) -> Result<Vec<i64>, InferError> {
    if !t.is_constant() {
        return Err(invalid(format!("{what} operand '{}' must be a constant", t.name)));
    }
    if !matches!(t.info.dtype, DType::I32 | DType::I64) {
        return Err(invalid(format!(
            "{what} operand '{}' must be i32 or i64, is {}",
            t.name, t.info.dtype
        )));
    }
    t.constant_i64()
        .ok_or_else(|| invalid(format!("{what} operand '{}' has no data", t.name)))
}

/// Logical `(batch, height, width, channels)` of a rank-4 activation.
pub(crate) fn spatial_dims(t: &TensorDef, layout: Layout) -> Result<[Dim; 4], InferError> {
    expect_rank(t, 4)?;
    let d = t.info.shape.dims();
    Ok([
        d[0],
        d[layout.height_axis()],
        d[layout.width_axis()],
        d[layout.channel_axis()],
    ])
}

/// Arranges logical extents in `layout` order.
pub(crate) fn spatial_shape(layout: Layout, batch: Dim, height: Dim, width: Dim, channels: Dim) -> Shape {
    let dims = match layout {
        Layout::Nhwc => vec![batch, height, width, channels],
        Layout::Nchw => vec![batch, channels, height, width],
    };
    Shape::from_dims(dims)
}

/// Concrete dims of a tensor that must be fully known (filters, weights).
pub(crate) fn known_dims(t: &TensorDef) -> Result<Vec<usize>, InferError> {
    t.info
        .shape
        .to_concrete()
        .ok_or_else(|| invalid(format!("'{}' must have a fully known shape", t.name)))
}

// ── Graph-wide sweep ───────────────────────────────────────────────

/// Outcome of a graph-wide inference sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReport {
    /// Nodes whose outputs were resolved.
    pub resolved: usize,
    /// Nodes left for kernel configuration, in execution order.
    pub deferred: Vec<NodeId>,
}

/// Resolves every tensor of a validated graph it can.
pub struct ShapeInference;

impl ShapeInference {
    /// Sweeps the graph in execution order until no further node resolves.
    ///
    /// `layout_of` gives the layout each node executes in. Structurally
    /// invalid nodes abort the sweep; nodes whose inputs never become ready
    /// are reported as deferred.
    pub fn run(
        graph: &mut Graph<Validated>,
        layout_of: impl Fn(NodeId) -> Layout,
    ) -> Result<InferenceReport, ModelError> {
        let order = graph.order().to_vec();
        let mut done = vec![false; graph.num_nodes()];
        let mut report = InferenceReport::default();

        loop {
            let mut progress = false;
            report.deferred.clear();
            for &id in &order {
                if done[id.0] {
                    continue;
                }
                let outcome = {
                    let Some(node) = graph.node(id) else { continue };
                    let inputs: Vec<&TensorDef> =
                        node.inputs.iter().filter_map(|&t| graph.tensor(t)).collect();
                    let declared: Vec<&TensorDef> =
                        node.outputs.iter().filter_map(|&t| graph.tensor(t)).collect();
                    infer_node(node, &inputs, layout_of(id), &declared)
                        .map(|infos| (node.outputs.clone(), infos))
                };
                match outcome {
                    Ok((outputs, infos)) => {
                        for (t, info) in outputs.into_iter().zip(infos) {
                            graph.set_info(t, info);
                        }
                        done[id.0] = true;
                        report.resolved += 1;
                        progress = true;
                    }
                    Err(e) if e.is_recoverable() => report.deferred.push(id),
                    Err(source) => {
                        let name = graph.node(id).map(|n| n.name.clone()).unwrap_or_default();
                        return Err(ModelError::Inference {
                            node: id.0,
                            name,
                            source,
                        });
                    }
                }
            }
            if !progress || report.deferred.is_empty() {
                break;
            }
        }

        for &id in &report.deferred {
            if let Some(node) = graph.node(id) {
                tracing::warn!(
                    "shape of node #{} '{}' deferred to kernel configuration",
                    id.0,
                    node.name
                );
            }
        }
        tracing::info!(
            "shape inference: {} nodes resolved, {} deferred",
            report.resolved,
            report.deferred.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use tensor_core::{ConstantData, DType, Dim, Shape, TensorInfo};

    use crate::TensorDef;

    pub fn activation(name: &str, dims: &[i64], dtype: DType) -> TensorDef {
        let dims = dims
            .iter()
            .map(|&d| if d < 0 { Dim::Unknown } else { Dim::Known(d as usize) })
            .collect();
        TensorDef::input(name, TensorInfo::new(Shape::from_dims(dims), dtype))
    }

    pub fn weights(name: &str, dims: Vec<usize>, dtype: DType) -> TensorDef {
        let bytes = vec![0u8; dims.iter().product::<usize>() * dtype.size_bytes()];
        TensorDef::constant(name, TensorInfo::new(dims, dtype), ConstantData::from_vec(bytes))
    }

    pub fn ints(name: &str, values: &[i32]) -> TensorDef {
        TensorDef::constant(
            name,
            TensorInfo::new(vec![values.len()], DType::I32),
            ConstantData::from_values(values),
        )
    }

    pub fn out(dtype: DType) -> TensorDef {
        TensorDef::intermediate("out", TensorInfo::undefined(dtype))
    }
}
