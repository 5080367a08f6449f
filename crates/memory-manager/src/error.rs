// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory planning and arena access.

/// Errors that can occur while planning or binding arena memory.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The planned arena does not fit the memory budget.
    #[error("arena needs {required_bytes} bytes, budget is {budget_bytes}")]
    OverBudget {
        required_bytes: usize,
        budget_bytes: usize,
    },

    /// A budget string could not be parsed.
    #[error("invalid memory budget '{0}': expected a number with an optional K/M/G suffix")]
    InvalidBudget(String),

    /// A buffer request is malformed.
    #[error("invalid buffer request #{index}: {detail}")]
    InvalidRequest { index: usize, detail: String },

    /// A slot lies outside the arena.
    #[error("slot {offset}..{end} exceeds arena of {arena_bytes} bytes")]
    OutOfBounds {
        offset: usize,
        end: usize,
        arena_bytes: usize,
    },

    /// Two bindings that must be disjoint overlap.
    #[error("slots {first:?} and {second:?} overlap")]
    Overlap {
        first: (usize, usize),
        second: (usize, usize),
    },
}
