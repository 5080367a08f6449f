// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors carried by graph operands.

use crate::{DType, Quantization, Shape};

/// Whether a tensor's shape can be relied upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeStatus {
    /// The shape has not been computed yet. Consumers must defer.
    #[default]
    Undefined,
    /// The shape (possibly with unknown dimensions) is authoritative.
    Valid,
}

/// Shape, element type, quantization and readiness of one tensor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorInfo {
    pub shape: Shape,
    pub dtype: DType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
    #[serde(default)]
    pub status: ShapeStatus,
}

impl TensorInfo {
    /// A descriptor whose shape is authoritative.
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
            quantization: None,
            status: ShapeStatus::Valid,
        }
    }

    /// A descriptor whose shape is still to be computed.
    pub fn undefined(dtype: DType) -> Self {
        Self {
            shape: Shape::scalar(),
            dtype,
            quantization: None,
            status: ShapeStatus::Undefined,
        }
    }

    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = Some(quantization);
        self
    }

    /// `true` when the shape status is `Valid`.
    pub fn is_ready(&self) -> bool {
        self.status == ShapeStatus::Valid
    }

    /// Concrete extents if the shape is valid and fully known.
    pub fn concrete_dims(&self) -> Option<Vec<usize>> {
        if self.is_ready() {
            self.shape.to_concrete()
        } else {
            None
        }
    }

    /// Per-tensor scale and zero point, or `(1.0, 0)` when unquantized.
    pub fn scale_zero_point(&self) -> (f32, i32) {
        self.quantization
            .as_ref()
            .map(|q| (q.scale(), q.zero_point()))
            .unwrap_or((1.0, 0))
    }

    /// Byte size once the shape is fully known.
    pub fn size_bytes(&self) -> Option<usize> {
        self.concrete_dims()
            .map(|d| d.iter().product::<usize>() * self.dtype.size_bytes())
    }
}
