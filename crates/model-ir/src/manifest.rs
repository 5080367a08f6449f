// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON model manifest parsing.
//!
//! The manifest (`model.json`) lists every tensor and node of the graph.
//! Constant payloads are either inlined (`values`) or refer to a tensor of
//! the model's SafeTensors file (`weight`).
//!
//! # Format
//! ```json
//! {
//!   "name": "tiny-cnn",
//!   "layout": "nhwc",
//!   "inputs": ["image"],
//!   "outputs": ["probs"],
//!   "tensors": [
//!     { "name": "image", "dtype": "f32", "shape": [-1, 28, 28, 3] },
//!     { "name": "conv.w", "dtype": "f32", "shape": [8, 3, 3, 3], "weight": "conv.weight" },
//!     { "name": "axes", "dtype": "i32", "shape": [2], "values": [1, 2] },
//!     { "name": "features", "dtype": "f32" },
//!     ...
//!   ],
//!   "nodes": [
//!     { "name": "conv", "op": "conv2d", "inputs": ["image", "conv.w"],
//!       "outputs": ["features"], "options": { "padding": "same" } },
//!     ...
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use tensor_core::{DType, Layout, Quantization, Shape};

use crate::{ModelError, OpKind};

/// Top-level model manifest, deserialized from `model.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name.
    pub name: String,
    /// Layout the model's activations are authored in.
    #[serde(default)]
    pub layout: Layout,
    /// Graph input tensor names, in host binding order.
    pub inputs: Vec<String>,
    /// Graph output tensor names, in host binding order.
    pub outputs: Vec<String>,
    pub tensors: Vec<ManifestTensor>,
    pub nodes: Vec<ManifestNode>,
}

/// A single tensor entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestTensor {
    pub name: String,
    /// Element type string (e.g. `"f32"`, `"uint8"`).
    pub dtype: String,
    /// Extents with `-1` for unknown; required for inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<Quantization>,
    /// Inline constant payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    /// Name of the constant's payload in the SafeTensors file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

impl ManifestTensor {
    pub fn is_constant(&self) -> bool {
        self.values.is_some() || self.weight.is_some()
    }
}

/// A single node entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestNode {
    pub name: String,
    /// Operation name (see [`OpKind::parse`]).
    pub op: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Kind-specific option table.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - At least one node is defined.
    /// - Every dtype and op name is recognised.
    /// - Tensor names are unique.
    /// - Every name referenced by a node or the graph I/O is declared.
    /// - Inputs have shapes and no payload; constants have one payload.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidGraph("manifest contains no nodes".into()));
        }

        let mut names = HashSet::new();
        for t in &self.tensors {
            if !names.insert(t.name.as_str()) {
                return Err(invalid_tensor(&t.name, "duplicate tensor name"));
            }
            if DType::parse(&t.dtype).is_none() {
                return Err(invalid_tensor(&t.name, format!("unsupported dtype '{}'", t.dtype)));
            }
            if t.values.is_some() && t.weight.is_some() {
                return Err(invalid_tensor(&t.name, "has both inline values and a weight key"));
            }
        }

        for name in &self.inputs {
            let t = self
                .tensors
                .iter()
                .find(|t| &t.name == name)
                .ok_or_else(|| ModelError::InvalidGraph(format!("graph input '{name}' is not declared")))?;
            if t.is_constant() {
                return Err(invalid_tensor(name, "graph input cannot carry constant data"));
            }
            if t.shape.is_none() {
                return Err(invalid_tensor(name, "graph input needs a shape"));
            }
        }
        for name in &self.outputs {
            if !names.contains(name.as_str()) {
                return Err(ModelError::InvalidGraph(format!(
                    "graph output '{name}' is not declared"
                )));
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let invalid = |detail: String| ModelError::InvalidNode {
                node: i,
                name: node.name.clone(),
                detail,
            };
            if OpKind::parse(&node.op).is_none() {
                return Err(invalid(format!("unknown op '{}'", node.op)));
            }
            for t in node.inputs.iter().chain(&node.outputs) {
                if !names.contains(t.as_str()) {
                    return Err(invalid(format!("references undeclared tensor '{t}'")));
                }
            }
        }
        Ok(())
    }

    /// Names of all SafeTensors payloads the manifest refers to.
    pub fn weight_names(&self) -> Vec<&str> {
        self.tensors
            .iter()
            .filter_map(|t| t.weight.as_deref())
            .collect()
    }
}

fn invalid_tensor(name: &str, detail: impl Into<String>) -> ModelError {
    ModelError::InvalidTensor {
        tensor: name.to_string(),
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_json() -> &'static str {
        r#"{
            "name": "tiny",
            "layout": "nhwc",
            "inputs": ["x"],
            "outputs": ["y"],
            "tensors": [
                { "name": "x", "dtype": "f32", "shape": [-1, 4, 4, 1] },
                { "name": "w", "dtype": "float32", "shape": [2, 3, 3, 1], "weight": "conv.weight" },
                { "name": "h", "dtype": "f32" },
                { "name": "axes", "dtype": "i32", "shape": [2], "values": [1, 2] },
                { "name": "y", "dtype": "f32" }
            ],
            "nodes": [
                { "name": "conv", "op": "conv2d", "inputs": ["x", "w"], "outputs": ["h"],
                  "options": { "padding": "valid", "fused_activation": "relu" } },
                { "name": "mean", "op": "mean", "inputs": ["h", "axes"], "outputs": ["y"] }
            ]
        }"#
    }

    #[test]
    fn test_parse_manifest() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        assert_eq!(m.name, "tiny");
        assert_eq!(m.layout, Layout::Nhwc);
        assert_eq!(m.tensors.len(), 5);
        assert_eq!(m.nodes[1].options, serde_json::Value::Null);
        assert_eq!(m.tensors[0].shape.as_ref().unwrap().to_string(), "[?, 4, 4, 1]");
        assert_eq!(m.weight_names(), vec!["conv.weight"]);
    }

    #[test]
    fn test_validate_ok() {
        ModelManifest::from_json(sample_manifest_json())
            .unwrap()
            .validate()
            .unwrap();
    }

    #[test]
    fn test_validate_unknown_op() {
        let mut m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.nodes[0].op = "lstm".into();
        assert!(matches!(m.validate(), Err(ModelError::InvalidNode { node: 0, .. })));
    }

    #[test]
    fn test_validate_unknown_dtype() {
        let mut m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.tensors[2].dtype = "f16".into();
        assert!(matches!(m.validate(), Err(ModelError::InvalidTensor { .. })));
    }

    #[test]
    fn test_validate_duplicate_tensor() {
        let mut m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.tensors[4].name = "h".into();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_dangling_reference() {
        let mut m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.nodes[1].inputs[0] = "missing".into();
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validate_input_needs_shape() {
        let mut m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        m.tensors[0].shape = None;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        let json = serde_json::to_string_pretty(&m).unwrap();
        let back = ModelManifest::from_json(&json).unwrap();
        assert_eq!(back.name, m.name);
        assert_eq!(back.nodes.len(), m.nodes.len());
    }
}
