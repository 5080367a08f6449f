// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kind-keyed kernel construction.
//!
//! A [`KernelRegistry`] maps each [`OpKind`] to a builder that unpacks the
//! node's raw option table into typed parameters. Before a builder runs the
//! registry checks the node's arity against [`arity`] and that its option
//! table belongs to its kind; both failures are fatal for graph load.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use model_ir::{Node, NodeId, OpKind};
use tensor_core::Layout;

use crate::kinds::{
    build_activation, build_binary, build_conv, build_fully_connected, build_mean, build_permute,
    build_pool, build_reshape, build_softmax, build_strided_slice, build_transpose,
    build_transpose_conv,
};
use crate::{Kernel, KernelError, KernelOp};

/// Unpacks a node's options into a [`KernelOp`].
pub type KernelBuilder = fn(&Node) -> Result<KernelOp, KernelError>;

/// Accepted input count and exact output count of an operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arity {
    pub inputs: RangeInclusive<usize>,
    pub outputs: usize,
}

/// Tensor counts every node of `kind` must bind. Optional trailing
/// operands (bias, shape) widen the input range.
pub fn arity(kind: OpKind) -> Arity {
    let inputs = match kind {
        OpKind::Conv2D | OpKind::DepthwiseConv2D | OpKind::FullyConnected => 2..=3,
        OpKind::TransposeConv => 3..=4,
        OpKind::Add | OpKind::Mul | OpKind::Transpose | OpKind::Mean => 2..=2,
        OpKind::Reshape => 1..=2,
        OpKind::StridedSlice => 4..=4,
        OpKind::AveragePool2D
        | OpKind::MaxPool2D
        | OpKind::Relu
        | OpKind::Relu6
        | OpKind::Logistic
        | OpKind::Tanh
        | OpKind::Gelu
        | OpKind::Softmax
        | OpKind::Permute => 1..=1,
    };
    Arity { inputs, outputs: 1 }
}

/// The builder of the reference implementation for `kind`.
pub fn reference_builder(kind: OpKind) -> KernelBuilder {
    match kind {
        OpKind::Conv2D | OpKind::DepthwiseConv2D => build_conv,
        OpKind::TransposeConv => build_transpose_conv,
        OpKind::AveragePool2D | OpKind::MaxPool2D => build_pool,
        OpKind::FullyConnected => build_fully_connected,
        OpKind::Add | OpKind::Mul => build_binary,
        OpKind::Relu | OpKind::Relu6 | OpKind::Logistic | OpKind::Tanh | OpKind::Gelu => {
            build_activation
        }
        OpKind::Softmax => build_softmax,
        OpKind::Reshape => build_reshape,
        OpKind::Transpose => build_transpose,
        OpKind::StridedSlice => build_strided_slice,
        OpKind::Mean => build_mean,
        OpKind::Permute => build_permute,
    }
}

/// Maps operation kinds to kernel builders.
#[derive(Clone)]
pub struct KernelRegistry {
    builders: HashMap<OpKind, KernelBuilder>,
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.builders.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("KernelRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::reference()
    }
}

impl KernelRegistry {
    /// A registry with no builders.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Reference builders for every operation kind.
    pub fn reference() -> Self {
        Self::with_kinds(&OpKind::ALL)
    }

    /// Reference builders for `kinds` only.
    pub fn with_kinds(kinds: &[OpKind]) -> Self {
        let mut registry = Self::empty();
        for &kind in kinds {
            registry.register(kind, reference_builder(kind));
        }
        registry
    }

    /// Installs (or replaces) the builder for `kind`.
    pub fn register(&mut self, kind: OpKind, builder: KernelBuilder) {
        self.builders.insert(kind, builder);
    }

    pub fn supports(&self, kind: OpKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Builds the kernel of node `id`, computing in `layout`.
    pub fn build(&self, id: NodeId, node: &Node, layout: Layout) -> Result<Kernel, KernelError> {
        let expected = arity(node.kind);
        if !expected.inputs.contains(&node.inputs.len()) {
            let (lo, hi) = (*expected.inputs.start(), *expected.inputs.end());
            return Err(KernelError::Arity {
                kind: node.kind,
                what: "inputs",
                expected: if lo == hi {
                    lo.to_string()
                } else {
                    format!("{lo} to {hi}")
                },
                actual: node.inputs.len(),
            });
        }
        if node.outputs.len() != expected.outputs {
            return Err(KernelError::Arity {
                kind: node.kind,
                what: "outputs",
                expected: expected.outputs.to_string(),
                actual: node.outputs.len(),
            });
        }
        if !node.options.matches(node.kind) {
            return Err(KernelError::MalformedNode {
                kind: node.kind,
                detail: "option table belongs to a different operation".into(),
            });
        }
        node.options
            .check()
            .map_err(|detail| KernelError::MalformedNode {
                kind: node.kind,
                detail,
            })?;

        let builder = self
            .builders
            .get(&node.kind)
            .ok_or(KernelError::Unregistered(node.kind))?;
        let op = builder(node)?;
        Ok(Kernel::new(id, node, layout, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{Conv2DOptions, NodeOptions, SoftmaxOptions, StridedSliceOptions, TensorId};
    use tensor_core::{FusedActivation, Padding};

    fn node(kind: OpKind, inputs: usize, options: NodeOptions) -> Node {
        Node::new(
            kind.as_str(),
            kind,
            (0..inputs).map(TensorId).collect(),
            vec![TensorId(inputs)],
            options,
        )
    }

    fn conv(padding: Padding) -> NodeOptions {
        NodeOptions::Conv2D(Conv2DOptions {
            padding,
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            fused_activation: FusedActivation::Relu,
        })
    }

    fn build(registry: &KernelRegistry, n: &Node) -> Result<Kernel, KernelError> {
        registry.build(NodeId(0), n, Layout::Nhwc)
    }

    #[test]
    fn test_reference_covers_every_kind() {
        let registry = KernelRegistry::reference();
        for kind in OpKind::ALL {
            assert!(registry.supports(kind), "{kind} missing");
        }
        assert!(!KernelRegistry::empty().supports(OpKind::Add));
    }

    #[test]
    fn test_input_arity() {
        let registry = KernelRegistry::reference();
        let err = build(
            &registry,
            &node(OpKind::StridedSlice, 3, NodeOptions::StridedSlice(Default::default())),
        )
        .unwrap_err();
        match err {
            KernelError::Arity {
                what,
                expected,
                actual,
                ..
            } => {
                assert_eq!(what, "inputs");
                assert_eq!(expected, "4");
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = build(&registry, &node(OpKind::Conv2D, 1, conv(Padding::Valid))).unwrap_err();
        assert!(matches!(err, KernelError::Arity { ref expected, .. } if expected == "2 to 3"));
    }

    #[test]
    fn test_output_arity() {
        let mut n = node(OpKind::Relu, 1, NodeOptions::None);
        n.outputs.push(TensorId(5));
        let err = build(&KernelRegistry::reference(), &n).unwrap_err();
        assert!(matches!(err, KernelError::Arity { what: "outputs", .. }));
    }

    #[test]
    fn test_mismatched_options() {
        let err = build(&KernelRegistry::reference(), &node(OpKind::Conv2D, 2, NodeOptions::None))
            .unwrap_err();
        assert!(matches!(err, KernelError::MalformedNode { kind: OpKind::Conv2D, .. }));
    }

    #[test]
    fn test_undefined_padding() {
        let err = build(&KernelRegistry::reference(), &node(OpKind::Conv2D, 2, conv(Padding::Undefined)))
            .unwrap_err();
        assert!(err.to_string().contains("padding"));
    }

    #[test]
    fn test_strided_slice_masks() {
        let registry = KernelRegistry::reference();
        let negative = StridedSliceOptions {
            begin_mask: -1,
            ..Default::default()
        };
        assert!(matches!(
            build(&registry, &node(OpKind::StridedSlice, 4, NodeOptions::StridedSlice(negative))),
            Err(KernelError::MalformedNode { .. })
        ));
        let two_ellipses = StridedSliceOptions {
            ellipsis_mask: 0b11,
            ..Default::default()
        };
        assert!(matches!(
            build(&registry, &node(OpKind::StridedSlice, 4, NodeOptions::StridedSlice(two_ellipses))),
            Err(KernelError::MalformedNode { .. })
        ));
    }

    #[test]
    fn test_softmax_beta_must_be_positive() {
        let n = node(OpKind::Softmax, 1, NodeOptions::Softmax(SoftmaxOptions { beta: 0.0 }));
        assert!(build(&KernelRegistry::reference(), &n).is_err());
    }

    #[test]
    fn test_restricted_registry() {
        let registry = KernelRegistry::with_kinds(&[OpKind::Relu]);
        assert!(build(&registry, &node(OpKind::Relu, 1, NodeOptions::None)).is_ok());
        let err = build(
            &registry,
            &node(OpKind::Add, 2, NodeOptions::Arithmetic(Default::default())),
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::Unregistered(OpKind::Add)));
    }

    #[test]
    fn test_built_kernel_params() {
        let k = build(&KernelRegistry::reference(), &node(OpKind::Conv2D, 3, conv(Padding::Same)))
            .unwrap();
        let KernelOp::Conv(c) = k.op() else {
            panic!("expected a convolution kernel");
        };
        assert_eq!(c.params.padding, Padding::Same);
        assert_eq!(c.params.activation, FusedActivation::Relu);
        assert_eq!(k.inputs().len(), 3);
        assert_eq!(k.output_bytes(), 0);
    }
}
