// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Channel-last reference backend.

use kernels::{Kernel, KernelError, KernelRegistry};
use model_ir::{Node, NodeId};
use tensor_core::{DType, Layout};

use super::Backend;

/// Runs every operation kind on every element type the reference kernels
/// implement, and hosts layout conversions.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    registry: KernelRegistry,
}

impl CpuBackend {
    pub const ID: &'static str = "cpu";

    pub fn new() -> Self {
        Self {
            registry: KernelRegistry::reference(),
        }
    }
}

impl Backend for CpuBackend {
    fn id(&self) -> &str {
        Self::ID
    }

    fn native_layout(&self) -> Layout {
        Layout::Nhwc
    }

    fn supports(&self, node: &Node, _dtype: DType) -> bool {
        self.registry.supports(node.kind)
    }

    fn supports_permutation(&self) -> bool {
        true
    }

    fn build_kernel(&self, id: NodeId, node: &Node, layout: Layout) -> Result<Kernel, KernelError> {
        self.registry.build(id, node, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{NodeOptions, OpKind, TensorId};

    #[test]
    fn test_spatial_kinds_need_channel_last() {
        let cpu = CpuBackend::new();
        let pool = Node::new("p", OpKind::MaxPool2D, vec![TensorId(0)], vec![TensorId(1)], NodeOptions::None);
        let relu = Node::new("r", OpKind::Relu, vec![TensorId(0)], vec![TensorId(1)], NodeOptions::None);
        assert!(cpu.supports(&pool, DType::I8));
        assert!(cpu.supports_layout(&pool, Layout::Nhwc));
        assert!(!cpu.supports_layout(&pool, Layout::Nchw));
        assert!(cpu.supports_layout(&relu, Layout::Nchw));
    }
}
