// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lifetime analysis and arena slot assignment for one shape epoch.
//!
//! Steps are positions in the graph's execution order. A produced tensor
//! lives from its producer's step to its last consumer's step; graph inputs
//! are live from step 0 and graph outputs until the last step, so neither
//! is ever overwritten during a pass. Scratch is live only at its own node.

use kernels::Kernel;
use memory_manager::{ArenaPlan, ArenaPlanner, BufferRequest, PlanStats, Slot};
use model_ir::{Graph, TensorId, Validated};
use tracing::debug;

use crate::RuntimeError;

/// Arena slots for every activation tensor and every kernel scratch buffer.
#[derive(Debug, Clone)]
pub struct MemoryPlan {
    plan: ArenaPlan,
    requests: Vec<BufferRequest>,
    /// Request index per tensor, indexed by [`TensorId`]; `None` for
    /// constants and unused tensors.
    tensor_requests: Vec<Option<usize>>,
    /// Request index per execution step.
    scratch_requests: Vec<Option<usize>>,
}

impl MemoryPlan {
    /// Plans the arena for `graph` as configured by `kernels`.
    ///
    /// `kernels` is indexed by node id and must all be configured.
    pub fn build(
        graph: &Graph<Validated>,
        kernels: &[Kernel],
        planner: &ArenaPlanner,
    ) -> Result<Self, RuntimeError> {
        let order = graph.order();
        let last_step = order.len().saturating_sub(1);
        let mut lifetimes: Vec<Option<(usize, usize)>> = vec![None; graph.tensors().len()];

        for &t in graph.inputs() {
            lifetimes[t.0] = Some((0, 0));
        }
        for (step, &id) in order.iter().enumerate() {
            let kernel = &kernels[id.0];
            for &t in kernel.inputs() {
                if let Some((_, last)) = lifetimes[t.0].as_mut() {
                    *last = (*last).max(step);
                }
            }
            for &t in kernel.outputs() {
                lifetimes[t.0] = Some((step, step));
            }
        }
        for &t in graph.outputs() {
            if let Some((_, last)) = lifetimes[t.0].as_mut() {
                *last = last_step;
            }
        }

        let mut requests = Vec::new();
        let mut tensor_requests = vec![None; lifetimes.len()];
        for (index, lifetime) in lifetimes.iter().enumerate() {
            let Some((first, last)) = *lifetime else { continue };
            let id = TensorId(index);
            let Some(def) = graph.tensor(id).filter(|t| !t.is_constant()) else {
                continue;
            };
            let size = def.info.size_bytes().ok_or_else(|| RuntimeError::UnresolvedShape {
                tensor: def.name.clone(),
            })?;
            tensor_requests[index] = Some(requests.len());
            requests.push(BufferRequest::new(size, first, last));
        }

        let mut scratch_requests = vec![None; order.len()];
        for (step, &id) in order.iter().enumerate() {
            let bytes = kernels[id.0].scratch_bytes();
            if bytes > 0 {
                scratch_requests[step] = Some(requests.len());
                requests.push(BufferRequest::new(bytes, step, step));
            }
        }

        let plan = planner.plan(&requests)?;
        plan.verify(&requests)?;
        debug!(
            buffers = requests.len(),
            arena_bytes = plan.arena_bytes(),
            "memory plan built"
        );

        Ok(Self {
            plan,
            requests,
            tensor_requests,
            scratch_requests,
        })
    }

    /// Arena slot of an activation tensor.
    pub fn tensor_slot(&self, id: TensorId) -> Option<Slot> {
        self.tensor_requests
            .get(id.0)
            .copied()
            .flatten()
            .and_then(|r| self.plan.slot(r))
    }

    /// Lifetime `(first, last)` of an activation tensor, in steps.
    pub fn lifetime(&self, id: TensorId) -> Option<(usize, usize)> {
        self.tensor_requests
            .get(id.0)
            .copied()
            .flatten()
            .map(|r| (self.requests[r].first, self.requests[r].last))
    }

    /// Scratch slot of the node executed at `step`, if it needs one.
    pub fn scratch_slot(&self, step: usize) -> Option<Slot> {
        self.scratch_requests
            .get(step)
            .copied()
            .flatten()
            .and_then(|r| self.plan.slot(r))
    }

    pub fn arena_bytes(&self) -> usize {
        self.plan.arena_bytes()
    }

    pub fn stats(&self) -> &PlanStats {
        self.plan.stats()
    }
}
