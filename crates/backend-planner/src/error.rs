// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for backend negotiation.

use model_ir::{ModelError, OpKind};
use tensor_core::DType;

/// Errors that can occur while assigning nodes to backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No backend executes this node with its operand type, or every
    /// candidate would need a layout conversion nobody can provide.
    #[error("no backend supports node #{node} '{name}' ({kind} on {dtype})")]
    UnsupportedConfiguration {
        node: usize,
        name: String,
        kind: OpKind,
        dtype: DType,
    },

    /// Negotiation was called with an empty backend list.
    #[error("no backends available")]
    NoBackends,

    /// A backend id that no shipped backend answers to.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// The rewritten graph failed validation or inference.
    #[error(transparent)]
    Graph(#[from] ModelError),
}
