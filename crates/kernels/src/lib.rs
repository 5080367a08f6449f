// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # kernels
//!
//! Binds IR nodes to numeric implementations.
//!
//! Every node becomes one [`Kernel`] following a two-phase protocol:
//!
//! 1. [`Kernel::configure`] validates the resolved operands, fixes the
//!    output shape (including shapes driven by constant operands), sizes
//!    the scratch buffer and derives fixed-point parameters such as the
//!    normalized multiplier and shift of `input_scale * filter_scale /
//!    output_scale`.
//! 2. [`Kernel::execute`] dispatches on the element type into the
//!    allocation-free routines of `tensor_core::ops`.
//!
//! Kernels are built by a [`KernelRegistry`], which checks arity and
//! option tables per [`model_ir::OpKind`] before unpacking parameters.
//!
//! # Example
//! ```
//! use kernels::{KernelIo, KernelRegistry};
//! use model_ir::{Graph, Node, NodeOptions, OpKind};
//! use tensor_core::{DType, Layout, TensorInfo, TensorView};
//!
//! let mut graph = Graph::new("relu", Layout::Nhwc);
//! let x = graph.add_input("x", TensorInfo::new(vec![4], DType::F32));
//! let y = graph.add_intermediate("y", TensorInfo::undefined(DType::F32));
//! let id = graph.add_node(Node::new("relu", OpKind::Relu, vec![x], vec![y], NodeOptions::None));
//! graph.mark_output(y);
//! let mut graph = graph.validate().unwrap();
//!
//! let node = graph.node(id).unwrap().clone();
//! let mut kernel = KernelRegistry::reference().build(id, &node, Layout::Nhwc).unwrap();
//! kernel.configure(&mut graph).unwrap();
//!
//! let input: Vec<u8> = [-1.0f32, 2.0, -3.0, 4.0].iter().flat_map(|v| v.to_le_bytes()).collect();
//! let mut output = vec![0u8; kernel.output_bytes()];
//! kernel.execute(&mut KernelIo::new(&[&input], &mut output)).unwrap();
//!
//! let view = TensorView::new(&[4], DType::F32, &output).unwrap();
//! assert_eq!(view.to_vec::<f32>(), vec![0.0, 2.0, 0.0, 4.0]);
//! ```

mod error;
mod kernel;
mod kinds;
mod registry;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::KernelError;
pub use kernel::{Kernel, KernelIo, KernelState};
pub use kinds::{
    ActivationKernel, BinaryKernel, ConvKernel, ConvParams, FullyConnectedKernel, KernelOp,
    MeanKernel, PermuteKernel, PoolKernel, ReshapeKernel, SoftmaxKernel, StridedSliceKernel,
    StridedSliceParams, TransposeConvKernel, TransposeKernel,
};
pub use registry::{arity, reference_builder, Arity, KernelBuilder, KernelRegistry};
