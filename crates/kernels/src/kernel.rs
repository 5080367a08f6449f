// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The per-node kernel and its two-phase protocol.
//!
//! ```text
//!            configure()              execute()
//! Constructed ──────────► Configured ──────────► Configured
//!                            ▲   │
//!                            └───┘ configure() again after a reshape
//! ```

use std::fmt;

use model_ir::{infer_node, Graph, Node, NodeId, OpKind, TensorDef, TensorId, Validated};
use smallvec::SmallVec;
use tensor_core::{DType, Layout, TensorInfo, TensorView, TensorViewMut};
use tracing::debug;

use crate::{KernelError, KernelOp};

/// Lifecycle of a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Built from the node; no shapes resolved yet.
    Constructed,
    /// Shapes, types and derived parameters resolved; ready to execute.
    Configured,
}

/// Concrete extents and element type of one bound tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    dims: Vec<usize>,
    dtype: DType,
}

impl Binding {
    fn size_bytes(&self) -> usize {
        self.dims.iter().product::<usize>() * self.dtype.size_bytes()
    }
}

/// Buffers handed to one [`Kernel::execute`] call.
///
/// `inputs` follows the node's input order; constants and arena-resident
/// tensors are passed alike. `scratch` must hold exactly
/// [`Kernel::scratch_bytes`] bytes.
pub struct KernelIo<'a> {
    pub inputs: SmallVec<[&'a [u8]; 4]>,
    pub output: &'a mut [u8],
    pub scratch: &'a mut [u8],
}

impl<'a> KernelIo<'a> {
    pub fn new(inputs: &[&'a [u8]], output: &'a mut [u8]) -> Self {
        Self {
            inputs: SmallVec::from_slice(inputs),
            output,
            scratch: <&mut [u8]>::default(),
        }
    }

    pub fn with_scratch(mut self, scratch: &'a mut [u8]) -> Self {
        self.scratch = scratch;
        self
    }
}

/// One node bound to its numeric implementation.
///
/// The node's parameters are copied in at construction and never change;
/// everything computed from shapes lives in the [`KernelOp`] and is
/// recomputed by each [`Kernel::configure`].
#[derive(Debug, Clone)]
pub struct Kernel {
    id: NodeId,
    node: Node,
    layout: Layout,
    state: KernelState,
    op: KernelOp,
    inputs: Vec<Binding>,
    output: Option<Binding>,
    scratch_bytes: usize,
}

impl Kernel {
    pub(crate) fn new(id: NodeId, node: &Node, layout: Layout, op: KernelOp) -> Self {
        Self {
            id,
            node: node.clone(),
            layout,
            state: KernelState::Constructed,
            op,
            inputs: Vec::new(),
            output: None,
            scratch_bytes: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn kind(&self) -> OpKind {
        self.node.kind
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.node.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.node.outputs
    }

    /// Layout the kernel computes in.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn op(&self) -> &KernelOp {
        &self.op
    }

    /// Scratch bytes the numeric path needs; valid once configured.
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes
    }

    /// Resolves output shapes and derived parameters from the current
    /// input descriptors and writes the outputs back into `graph`.
    ///
    /// Every input must already have a concrete shape. Re-running after
    /// input shapes change recomputes all derived state.
    pub fn configure(&mut self, graph: &mut Graph<Validated>) -> Result<(), KernelError> {
        self.state = KernelState::Constructed;

        let info = {
            let lookup = |t: &TensorId| {
                graph
                    .tensor(*t)
                    .ok_or_else(|| KernelError::MissingTensor(t.to_string()))
            };
            let inputs: Vec<&TensorDef> = self.node.inputs.iter().map(lookup).collect::<Result<_, _>>()?;
            let declared: Vec<&TensorDef> = self.node.outputs.iter().map(lookup).collect::<Result<_, _>>()?;

            let mut bindings = Vec::with_capacity(inputs.len());
            for t in &inputs {
                let dims = t.info.concrete_dims().ok_or_else(|| KernelError::UnknownShape {
                    tensor: t.name.clone(),
                })?;
                bindings.push(Binding {
                    dims,
                    dtype: t.info.dtype,
                });
            }

            let mut infos = infer_node(&self.node, &inputs, self.layout, &declared)?;
            let info = infos.pop().filter(|_| infos.is_empty()).ok_or_else(|| {
                KernelError::MalformedNode {
                    kind: self.node.kind,
                    detail: "kernels produce exactly one output".into(),
                }
            })?;
            let dims = info.concrete_dims().ok_or_else(|| KernelError::UnknownShape {
                tensor: declared[0].name.clone(),
            })?;

            self.scratch_bytes = self.op.prepare(self.layout, &inputs, &info)?;
            self.inputs = bindings;
            self.output = Some(Binding {
                dims,
                dtype: info.dtype,
            });
            info
        };

        graph.set_info(self.node.outputs[0], info);
        self.state = KernelState::Configured;
        debug!(
            node = %self.id,
            name = %self.node.name,
            kind = %self.node.kind,
            scratch_bytes = self.scratch_bytes,
            "configured kernel"
        );
        Ok(())
    }

    /// Byte size of the output buffer; valid once configured.
    pub fn output_bytes(&self) -> usize {
        self.output.as_ref().map_or(0, Binding::size_bytes)
    }

    /// Resolved descriptor of the output as the kernel sees it.
    pub fn output_info(&self) -> Option<TensorInfo> {
        self.output
            .as_ref()
            .map(|b| TensorInfo::new(b.dims.clone(), b.dtype))
    }

    /// Computes the output from `io`.
    pub fn execute(&self, io: &mut KernelIo<'_>) -> Result<(), KernelError> {
        let Some(output) = self.output.as_ref().filter(|_| self.state == KernelState::Configured) else {
            return Err(KernelError::NotConfigured(self.node.kind));
        };
        if io.inputs.len() != self.inputs.len() {
            return Err(KernelError::Binding {
                what: "inputs",
                expected: self.inputs.len(),
                actual: io.inputs.len(),
            });
        }
        if io.scratch.len() != self.scratch_bytes {
            return Err(KernelError::Binding {
                what: "scratch bytes",
                expected: self.scratch_bytes,
                actual: io.scratch.len(),
            });
        }

        let views: SmallVec<[TensorView<'_>; 4]> = self
            .inputs
            .iter()
            .zip(&io.inputs)
            .map(|(b, bytes)| TensorView::new(&b.dims, b.dtype, bytes))
            .collect::<Result<_, _>>()?;
        let mut out = TensorViewMut::new(&output.dims, output.dtype, &mut *io.output)?;
        self.op.run(self.layout, &views, &mut out, &mut *io.scratch)
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}' [{}] {:?}",
            self.id, self.node.kind, self.node.name, self.layout, self.state
        )?;
        if self.scratch_bytes > 0 {
            write!(f, " scratch={}B", self.scratch_bytes)?;
        }
        Ok(())
    }
}
