// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Static working-memory planning for graph execution on memory-constrained
//! targets. All activations and scratch buffers of one execution pass live in
//! a single arena whose size is fixed when the engine is planned; nothing is
//! allocated while kernels run.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a hard ceiling with human-readable parsing
//!   (`"256K"`, `"4M"`, etc.).
//! - [`ArenaPlanner`]: assigns each [`BufferRequest`] (size plus lifetime in
//!   execution steps) an offset so that simultaneously live buffers never
//!   alias.
//! - [`Arena`]: the byte buffer itself, with [`Arena::bind`] handing out
//!   disjoint slices per kernel invocation.
//! - [`PlanStats`]: how much the plan saves over one buffer per tensor.
//!
//! # Example
//! ```
//! use memory_manager::{Arena, ArenaPlanner, BufferRequest, MemoryBudget};
//!
//! // input -> conv -> relu -> output
//! let requests = [
//!     BufferRequest::new(4096, 0, 0), // input, read by step 0
//!     BufferRequest::new(2048, 0, 1), // conv output, read by step 1
//!     BufferRequest::new(2048, 1, 1), // relu output
//! ];
//! let plan = ArenaPlanner::default().plan(&requests).unwrap();
//! MemoryBudget::parse("8K").unwrap().check(plan.arena_bytes()).unwrap();
//!
//! // The relu output reuses the bytes of the dead input.
//! assert_eq!(plan.slot(2).unwrap().offset, 0);
//!
//! let mut arena = Arena::new(plan.arena_bytes());
//! let binding = arena
//!     .bind(&[plan.slot(1).unwrap()], &[plan.slot(2).unwrap()])
//!     .unwrap();
//! assert_eq!(binding.writes[0].len(), 2048);
//! ```

mod arena;
mod budget;
mod error;
mod planner;
mod stats;

pub use arena::{Arena, ArenaBinding};
pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use planner::{ArenaPlan, ArenaPlanner, BufferRequest, Slot, DEFAULT_ALIGNMENT};
pub use stats::PlanStats;
