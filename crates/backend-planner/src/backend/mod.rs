// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`Backend`] capability trait and the shipped backends.

pub mod cpu;
pub mod planar;

use kernels::{Kernel, KernelError, KernelRegistry};
use model_ir::{Node, NodeId};
use tensor_core::{DType, Layout};

use crate::BackendError;

/// Capability descriptor and kernel factory of one execution target.
///
/// Negotiation only asks questions; it never inspects a backend's
/// internals, so tests can inject minimal fakes.
pub trait Backend: Send + Sync {
    /// Stable identifier used in configuration and reports.
    fn id(&self) -> &str;

    /// Layout this backend's spatial kernels are written for.
    fn native_layout(&self) -> Layout;

    /// Whether this backend computes `node` on operands of `dtype`.
    fn supports(&self, node: &Node, dtype: DType) -> bool;

    /// Whether `node` may execute here with its tensors in `layout`.
    fn supports_layout(&self, node: &Node, layout: Layout) -> bool {
        !node.kind.is_spatial() || layout == self.native_layout()
    }

    /// Whether this backend can host the layout conversions the engine
    /// inserts on mismatched edges.
    fn supports_permutation(&self) -> bool;

    /// Builds the kernel of node `id` executing in `layout`.
    fn build_kernel(&self, id: NodeId, node: &Node, layout: Layout) -> Result<Kernel, KernelError> {
        KernelRegistry::reference().build(id, node, layout)
    }
}

/// Ids of the shipped backends, in default preference order.
pub const BACKEND_IDS: [&str; 2] = [cpu::CpuBackend::ID, planar::PlanarBackend::ID];

/// Constructs a shipped backend from its id.
pub fn create_backend(id: &str) -> Result<Box<dyn Backend>, BackendError> {
    match id.trim().to_ascii_lowercase().as_str() {
        cpu::CpuBackend::ID => Ok(Box::new(cpu::CpuBackend::new())),
        planar::PlanarBackend::ID => Ok(Box::new(planar::PlanarBackend::new())),
        other => Err(BackendError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend() {
        assert_eq!(create_backend("cpu").unwrap().id(), "cpu");
        assert_eq!(create_backend(" Planar ").unwrap().native_layout(), Layout::Nchw);
        assert!(matches!(
            create_backend("gpu"),
            Err(BackendError::UnknownBackend(id)) if id == "gpu"
        ));
    }
}
