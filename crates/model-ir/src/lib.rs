// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The intermediate representation (IR) of a model graph, its shape/type
//! inference, and the loader that builds it from disk.
//!
//! - [`TensorDef`] / [`TensorId`] — graph operands in an index-addressed arena.
//! - [`Node`] / [`OpKind`] / [`NodeOptions`] — operation instances with
//!   their raw, immutable parameters.
//! - [`Graph`] — the DAG, with a **type-state pattern**
//!   (`Loaded` → `Validated`) that caches a deterministic execution order.
//! - [`infer_node`] / [`ShapeInference`] — per-kind shape, dtype and
//!   quantization rules.
//! - [`ModelLoader`] — loads a JSON manifest + SafeTensors constants.
//!
//! # Supported Model Format
//! A model is stored as:
//! - `model.json` — tensors, nodes and graph I/O.
//! - `model.safetensors` — constant payloads in HuggingFace SafeTensors format.
//!
//! # Example
//! ```no_run
//! use model_ir::{ModelLoader, ShapeInference};
//! use std::path::Path;
//!
//! let mut graph = ModelLoader::load(Path::new("./models/tiny-cnn")).unwrap();
//! let layout = graph.layout;
//! ShapeInference::run(&mut graph, |_| layout).unwrap();
//! for t in graph.tensors() {
//!     println!("  {}", t.summary());
//! }
//! ```

mod error;
pub mod graph;
pub mod infer;
mod loader;
mod manifest;
mod node;
mod op;
mod tensor;

pub use error::ModelError;
pub use graph::{Graph, GraphState, Loaded, Validated};
pub use infer::{infer_node, InferError, InferenceReport, ShapeInference};
pub use loader::{ModelLoader, WeightMeta, WeightStore};
pub use manifest::{ManifestNode, ManifestTensor, ModelManifest};
pub use node::{Node, NodeId};
pub use op::{
    ArithmeticOptions, Conv2DOptions, DepthwiseConv2DOptions, FullyConnectedOptions, NodeOptions,
    OpKind, PermuteOptions, Pool2DOptions, ReducerOptions, ReshapeOptions, SoftmaxOptions,
    StridedSliceOptions, TransposeConvOptions,
};
pub use tensor::{TensorDef, TensorId, TensorKind};
