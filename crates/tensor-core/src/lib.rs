// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Operand model and reference arithmetic for on-device graph execution.
//!
//! This crate provides:
//! - [`DType`] — the closed set of element types (f32, u8, i8, i16, i32, i64, bool).
//! - [`Shape`] / [`Dim`] — shapes whose dimensions may be individually unknown.
//! - [`TensorInfo`] — shape + type + [`Quantization`] + readiness status.
//! - [`Layout`] — channel-last / channel-first memory orderings.
//! - Fixed-point helpers ([`quantize_multiplier`], [`multiply_by_quantized_multiplier`]).
//! - [`Tensor`], [`TensorView`], [`TensorViewMut`], [`ConstantData`] — byte-backed storage.
//! - [`ops`] — allocation-free reference numeric kernels keyed by
//!   (operation, element type, layout).
//!
//! # Design Goals
//! - No heap allocation in numeric routines: every kernel writes into a
//!   caller-provided output buffer and never reads outside declared extents.
//! - Alignment-free element access: buffers are plain bytes, elements are
//!   decoded little-endian through the [`Element`] trait.
//! - Clean error types via `thiserror`.

mod dtype;
mod element;
mod error;
mod info;
mod layout;
pub mod ops;
mod params;
mod quant;
mod shape;
mod tensor;

pub use dtype::DType;
pub use element::{Element, QuantizedElement};
pub use error::TensorError;
pub use info::{ShapeStatus, TensorInfo};
pub use layout::{Extent4, Layout};
pub use params::{
    compute_output_size, compute_padding_with_offset, FusedActivation, Padding, PaddingValues,
};
pub use quant::{
    activation_range_quantized, dequantize, multiply_by_quantized_multiplier,
    multiply_by_quantized_multiplier_i64, quantize_multiplier, quantize_value, Quantization, QuantizedMultiplier,
};
pub use shape::{Dim, Shape, MAX_RANK};
pub use tensor::{ConstantData, Tensor, TensorView, TensorViewMut};
