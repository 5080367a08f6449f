// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the inference runtime.

use kernels::KernelError;

/// Errors that can occur while preparing or running a graph.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Model loading, validation or shape inference failed.
    #[error("model error: {0}")]
    ModelError(#[from] model_ir::ModelError),

    /// No backend could take a node.
    #[error("backend error: {0}")]
    BackendError(#[from] backend_planner::BackendError),

    /// Memory planning failed or the arena exceeds the budget.
    #[error("memory error: {0}")]
    MemoryError(#[from] memory_manager::MemoryError),

    /// Building or configuring the kernel of a node failed.
    #[error("preparing node #{node} '{name}' failed: {source}")]
    Prepare {
        node: usize,
        name: String,
        #[source]
        source: KernelError,
    },

    /// A configured kernel failed during execution.
    #[error("execution error in node #{node} '{name}': {source}")]
    ExecutionError {
        node: usize,
        name: String,
        #[source]
        source: KernelError,
    },

    /// A tensor that needs arena storage has no concrete shape.
    #[error("tensor '{tensor}' has no concrete shape; resize the graph inputs first")]
    UnresolvedShape { tensor: String },

    /// No graph input carries this name.
    #[error("unknown graph input '{0}'")]
    UnknownInput(String),

    /// The host passed the wrong number of input tensors.
    #[error("graph takes {expected} inputs, {actual} given")]
    InputCount { expected: usize, actual: usize },

    /// A host tensor does not match the graph input it binds.
    #[error("input {index} ('{name}'): {detail}")]
    InputMismatch {
        index: usize,
        name: String,
        detail: String,
    },

    /// A host tensor could not be assembled.
    #[error("tensor error: {0}")]
    TensorError(#[from] tensor_core::TensorError),
}
