// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph nodes.

use std::fmt;

use crate::{NodeOptions, OpKind, TensorId};

/// Stable index of a node in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One operation instance. Parameters are fixed at construction; derived
/// quantities live in the kernel bound to the node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: OpKind,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub options: NodeOptions,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
        options: NodeOptions,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs,
            outputs,
            options,
        }
    }

    /// Returns a one-line summary of this node.
    pub fn summary(&self) -> String {
        let join = |ids: &[TensorId]| {
            ids.iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "{:<20} {:<18} ({}) -> ({})",
            self.name,
            self.kind,
            join(&self.inputs),
            join(&self.outputs)
        )
    }
}
