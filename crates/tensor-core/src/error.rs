// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor construction and reference kernels.

use crate::{DType, Shape};

/// Errors that can occur while building tensors or running reference kernels.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the given shape and dtype.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype:?} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A concrete shape was required but some dimension is unknown.
    #[error("shape {shape} is not fully known")]
    UnknownShape { shape: Shape },

    /// The tensor rank exceeds what the reference kernels index.
    #[error("rank {rank} exceeds the supported maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },

    /// Quantization parameters are inconsistent with the tensor.
    #[error("invalid quantization: {0}")]
    InvalidQuantization(String),

    /// A permutation vector is not a permutation of `0..rank`.
    #[error("invalid permutation {perm:?} for rank {rank}")]
    InvalidPermutation { perm: Vec<usize>, rank: usize },
}
