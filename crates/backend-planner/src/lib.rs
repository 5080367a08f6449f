// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # backend-planner
//!
//! Assigns every node of a validated graph to an execution backend and
//! inserts the layout conversions that assignment requires.
//!
//! # Backends
//!
//! | Backend | Native layout | Kinds | Types | Hosts conversions |
//! |---|---|---|---|---|
//! | [`CpuBackend`] | NHWC | all | all | yes |
//! | [`PlanarBackend`] | NCHW | conv, depthwise, pooling, element-wise | f32 | no |
//!
//! # Trait-Based Extensibility
//!
//! Backends implement [`Backend`] and are passed to [`negotiate`] as an
//! ordered preference list, so new targets plug in without touching the
//! runtime:
//!
//! ```ignore
//! struct Accelerator;
//! impl Backend for Accelerator {
//!     fn id(&self) -> &str { "npu" }
//!     fn native_layout(&self) -> Layout { Layout::Nhwc }
//!     fn supports(&self, node: &Node, dtype: DType) -> bool { dtype == DType::I8 }
//!     fn supports_permutation(&self) -> bool { false }
//! }
//! ```
//!
//! # Example
//! ```no_run
//! use backend_planner::{create_backend, negotiate};
//! use model_ir::ModelLoader;
//! use std::path::Path;
//!
//! let graph = ModelLoader::load(Path::new("./model")).unwrap();
//! let backends = vec![create_backend("planar").unwrap(), create_backend("cpu").unwrap()];
//! let negotiated = negotiate(graph, &backends).unwrap();
//! println!("{}", negotiated.summary());
//! ```

pub mod backend;
mod error;
mod negotiate;

pub use backend::cpu::CpuBackend;
pub use backend::planar::{PlanarBackend, PLANAR_KINDS};
pub use backend::{create_backend, Backend, BACKEND_IDS};
pub use error::BackendError;
pub use negotiate::{negotiate, NegotiatedGraph, NodeAssignment};
