// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The execution engine that prepares and runs a validated operator graph.
//!
//! The runtime takes:
//! - A validated `Graph` from `model-ir`.
//! - An ordered list of backends from `backend-planner`.
//! - A memory budget for the execution arena.
//!
//! It negotiates a backend and layout per node, builds and configures one
//! kernel per node, plans a single arena for every activation and scratch
//! buffer, and executes the kernels in topological order on each call.
//!
//! # Type-State Pipeline
//! The runtime enforces a type-safe pipeline:
//! ```text
//! InferenceEngine<Idle> → InferenceEngine<Prepared> → InferenceEngine<Ready>
//! ```
//! Transitions are compile-time checked.
//!
//! # Execution Model
//! A pass is synchronous and single-threaded; there are no suspension
//! points inside it. Hosts that need a deadline run the engine on their own
//! cancellable task and drop it on expiry.

mod config;
mod engine;
mod error;
mod memory;
mod metrics;

pub use config::RuntimeConfig;
pub use engine::{EngineState, Idle, InferenceEngine, InferenceOutput, Prepared, Ready};
pub use error::RuntimeError;
pub use memory::MemoryPlan;
pub use metrics::{InferenceMetrics, NodeMetrics};
