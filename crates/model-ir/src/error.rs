// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and IR construction.

use crate::InferError;

/// Errors that can occur when building, loading or resolving a model graph.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A constant referenced in the manifest was not found in the SafeTensors file.
    #[error("weight tensor not found: {name}")]
    WeightNotFound { name: String },

    /// The SafeTensors file could not be loaded.
    #[error("failed to load SafeTensors: {0}")]
    SafeTensorsError(String),

    /// A tensor definition is invalid (unknown dtype, bad constant payload, ...).
    #[error("invalid tensor '{tensor}': {detail}")]
    InvalidTensor { tensor: String, detail: String },

    /// A node definition is malformed (unknown op, dangling reference, bad options).
    #[error("invalid node #{node} '{name}': {detail}")]
    InvalidNode {
        node: usize,
        name: String,
        detail: String,
    },

    /// The graph as a whole is malformed (cycle, multiple producers, ...).
    #[error("invalid model graph: {0}")]
    InvalidGraph(String),

    /// Shape/type inference found a structurally invalid node.
    #[error("shape inference failed at node #{node} '{name}': {source}")]
    Inference {
        node: usize,
        name: String,
        #[source]
        source: InferError,
    },
}
