// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph operands.

use std::fmt;

use tensor_core::{ConstantData, TensorInfo};

/// Stable index of a tensor in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub usize);

impl TensorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Role a tensor plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    /// Supplied by the host for every inference call.
    Input,
    /// Fixed at load time; immutable for the graph's lifetime.
    Constant,
    /// Produced by one node and consumed within the graph.
    Intermediate,
    /// Produced by one node and returned to the host.
    Output,
}

impl TensorKind {
    /// `true` for tensors whose storage lives in the execution arena.
    pub fn is_activation(self) -> bool {
        !matches!(self, TensorKind::Constant)
    }
}

/// One operand of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDef {
    pub name: String,
    pub info: TensorInfo,
    pub kind: TensorKind,
    /// Payload of a constant; `None` for every other kind.
    pub data: Option<ConstantData>,
}

impl TensorDef {
    pub fn input(name: impl Into<String>, info: TensorInfo) -> Self {
        Self {
            name: name.into(),
            info,
            kind: TensorKind::Input,
            data: None,
        }
    }

    pub fn constant(name: impl Into<String>, info: TensorInfo, data: ConstantData) -> Self {
        Self {
            name: name.into(),
            info,
            kind: TensorKind::Constant,
            data: Some(data),
        }
    }

    pub fn intermediate(name: impl Into<String>, info: TensorInfo) -> Self {
        Self {
            name: name.into(),
            info,
            kind: TensorKind::Intermediate,
            data: None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.kind == TensorKind::Constant
    }

    /// Constant payload decoded as integers (shape operands, axes, perms).
    pub fn constant_i64(&self) -> Option<Vec<i64>> {
        self.data
            .as_ref()
            .and_then(|d| d.to_i64_vec(self.info.dtype).ok())
    }

    /// One-line description for summaries and logs.
    pub fn summary(&self) -> String {
        let quant = match &self.info.quantization {
            Some(q) if q.is_per_axis() => format!(" q[axis {} x{}]", q.quantized_dimension, q.scales.len()),
            Some(q) => format!(" q[{:.6}, {}]", q.scale(), q.zero_point()),
            None => String::new(),
        };
        let status = if self.info.is_ready() { "" } else { " (undefined)" };
        format!(
            "{:<24} {:<12} {:<5} {}{}{}",
            self.name,
            format!("{:?}", self.kind),
            self.info.dtype,
            self.info.shape,
            quant,
            status
        )
    }
}
