// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for kernel construction, configuration and execution.

use model_ir::{InferError, OpKind};
use tensor_core::{DType, TensorError};

/// Errors raised by kernels and the kernel registry.
///
/// Construction and configuration errors are fatal for graph preparation;
/// the runtime attaches the offending node. Execution only fails with
/// [`KernelError::UnsupportedType`] or a binding error, both of which
/// indicate a gap in preparation.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The node binds the wrong number of tensors for its kind.
    #[error("'{kind}' expects {expected} {what}, node binds {actual}")]
    Arity {
        kind: OpKind,
        what: &'static str,
        expected: String,
        actual: usize,
    },

    /// The node's parameters are malformed.
    #[error("malformed '{kind}' node: {detail}")]
    MalformedNode { kind: OpKind, detail: String },

    /// No builder is registered for the operation kind.
    #[error("no kernel registered for '{0}'")]
    Unregistered(OpKind),

    /// Shape or type resolution failed.
    #[error("shape resolution failed: {0}")]
    Infer(#[from] InferError),

    /// A tensor still has unknown dimensions at configuration time.
    #[error("tensor '{tensor}' has no concrete shape")]
    UnknownShape { tensor: String },

    /// A node references a tensor that is not in the graph.
    #[error("tensor {0} is not in the graph")]
    MissingTensor(String),

    /// No numeric path exists for the resolved element type.
    #[error("'{kind}' has no numeric path for {dtype}")]
    UnsupportedType { kind: OpKind, dtype: DType },

    /// `execute` was called before `configure`.
    #[error("'{0}' kernel executed before configuration")]
    NotConfigured(OpKind),

    /// The buffers handed to `execute` do not match the kernel's bindings.
    #[error("kernel binds {expected} {what}, got {actual}")]
    Binding {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A reference numeric routine rejected its operands.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
