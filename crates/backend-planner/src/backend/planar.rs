// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Channel-first float backend.
//!
//! Covers the float convolution and pooling family in `NCHW` plus the
//! element-wise kinds, which run in whatever layout their producer chose.
//! It cannot host layout conversions; another backend in the list must.

use kernels::{Kernel, KernelError, KernelRegistry};
use model_ir::{Node, NodeId, OpKind};
use tensor_core::{DType, Layout};

use super::Backend;

/// Kinds the planar backend computes.
pub const PLANAR_KINDS: [OpKind; 10] = [
    OpKind::Conv2D,
    OpKind::DepthwiseConv2D,
    OpKind::AveragePool2D,
    OpKind::MaxPool2D,
    OpKind::Add,
    OpKind::Mul,
    OpKind::Relu,
    OpKind::Relu6,
    OpKind::Logistic,
    OpKind::Tanh,
];

#[derive(Debug, Clone)]
pub struct PlanarBackend {
    registry: KernelRegistry,
}

impl PlanarBackend {
    pub const ID: &'static str = "planar";

    pub fn new() -> Self {
        Self {
            registry: KernelRegistry::with_kinds(&PLANAR_KINDS),
        }
    }
}

impl Default for PlanarBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PlanarBackend {
    fn id(&self) -> &str {
        Self::ID
    }

    fn native_layout(&self) -> Layout {
        Layout::Nchw
    }

    fn supports(&self, node: &Node, dtype: DType) -> bool {
        dtype == DType::F32 && self.registry.supports(node.kind)
    }

    fn supports_permutation(&self) -> bool {
        false
    }

    fn build_kernel(&self, id: NodeId, node: &Node, layout: Layout) -> Result<Kernel, KernelError> {
        self.registry.build(id, node, layout)
    }
}
