// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-kind kernel implementations.
//!
//! [`KernelOp`] is a closed sum type with one variant per family of
//! operation kinds. Each variant holds the node's typed parameters plus the
//! state derived during configuration (window geometry, fixed-point
//! multipliers, slice plans). Dispatch goes through the crate-internal
//! [`OpKernel`] trait so every family implements the same two calls.

mod conv;
mod elementwise;
mod pool;
mod shape;

pub use conv::{ConvKernel, ConvParams, FullyConnectedKernel, TransposeConvKernel};
pub use elementwise::{ActivationKernel, BinaryKernel, MeanKernel, SoftmaxKernel};
pub use pool::PoolKernel;
pub use shape::{PermuteKernel, ReshapeKernel, StridedSliceKernel, StridedSliceParams, TransposeKernel};

pub(crate) use conv::{build_conv, build_fully_connected, build_transpose_conv};
pub(crate) use elementwise::{build_activation, build_binary, build_mean, build_softmax};
pub(crate) use pool::build_pool;
pub(crate) use shape::{build_permute, build_reshape, build_strided_slice, build_transpose};

use model_ir::{OpKind, TensorDef};
use tensor_core::{
    activation_range_quantized, compute_padding_with_offset, ops::QuantizedConvParams,
    quantize_multiplier, DType, FusedActivation, Layout, Padding, QuantizedMultiplier, TensorInfo,
    TensorView, TensorViewMut,
};

use crate::KernelError;

/// The two calls every kernel family implements.
pub(crate) trait OpKernel {
    /// Derives execution state from resolved operands and returns the
    /// scratch bytes the numeric path needs.
    fn prepare(
        &mut self,
        layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError>;

    /// Computes the output. `scratch` holds exactly the bytes requested by
    /// [`OpKernel::prepare`].
    fn run(
        &self,
        layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        scratch: &mut [u8],
    ) -> Result<(), KernelError>;
}

/// Typed parameters and derived state of one kernel.
#[derive(Debug, Clone)]
pub enum KernelOp {
    Conv(ConvKernel),
    TransposeConv(TransposeConvKernel),
    Pool(PoolKernel),
    FullyConnected(FullyConnectedKernel),
    Binary(BinaryKernel),
    Activation(ActivationKernel),
    Softmax(SoftmaxKernel),
    Reshape(ReshapeKernel),
    Transpose(TransposeKernel),
    StridedSlice(StridedSliceKernel),
    Mean(MeanKernel),
    Permute(PermuteKernel),
}

impl KernelOp {
    fn as_kernel(&self) -> &dyn OpKernel {
        match self {
            KernelOp::Conv(k) => k,
            KernelOp::TransposeConv(k) => k,
            KernelOp::Pool(k) => k,
            KernelOp::FullyConnected(k) => k,
            KernelOp::Binary(k) => k,
            KernelOp::Activation(k) => k,
            KernelOp::Softmax(k) => k,
            KernelOp::Reshape(k) => k,
            KernelOp::Transpose(k) => k,
            KernelOp::StridedSlice(k) => k,
            KernelOp::Mean(k) => k,
            KernelOp::Permute(k) => k,
        }
    }

    fn as_kernel_mut(&mut self) -> &mut dyn OpKernel {
        match self {
            KernelOp::Conv(k) => k,
            KernelOp::TransposeConv(k) => k,
            KernelOp::Pool(k) => k,
            KernelOp::FullyConnected(k) => k,
            KernelOp::Binary(k) => k,
            KernelOp::Activation(k) => k,
            KernelOp::Softmax(k) => k,
            KernelOp::Reshape(k) => k,
            KernelOp::Transpose(k) => k,
            KernelOp::StridedSlice(k) => k,
            KernelOp::Mean(k) => k,
            KernelOp::Permute(k) => k,
        }
    }

    pub(crate) fn prepare(
        &mut self,
        layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        self.as_kernel_mut().prepare(layout, inputs, output)
    }

    pub(crate) fn run(
        &self,
        layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        self.as_kernel().run(layout, inputs, output, scratch)
    }

    /// Fixed-point output multipliers derived for multiply-accumulate
    /// kernels, one per output channel for per-axis weights.
    pub fn multipliers(&self) -> Option<&[QuantizedMultiplier]> {
        let quant = match self {
            KernelOp::Conv(k) => k.quant.as_ref(),
            KernelOp::TransposeConv(k) => k.quant.as_ref(),
            KernelOp::FullyConnected(k) => k.quant.as_ref(),
            _ => None,
        };
        quant.map(|q| q.multipliers.as_slice())
    }
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Fixed-point parameters of a multiply-accumulate kernel.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MacQuant {
    input_offset: i32,
    filter_offsets: Vec<i32>,
    output_offset: i32,
    multipliers: Vec<QuantizedMultiplier>,
    act_min: i32,
    act_max: i32,
}

impl MacQuant {
    /// Derives `m = input_scale * filter_scale / output_scale` per output
    /// channel (or once for per-tensor weights) and the activation clamp.
    pub(crate) fn derive(
        input: &TensorInfo,
        filter: &TensorInfo,
        output: &TensorInfo,
        channels: usize,
        activation: FusedActivation,
    ) -> Self {
        let (input_scale, input_zp) = input.scale_zero_point();
        let (output_scale, output_zp) = output.scale_zero_point();
        let per_axis = filter.quantization.as_ref().is_some_and(|q| q.is_per_axis());
        let slices = if per_axis { channels } else { 1 };
        let (mut filter_offsets, mut multipliers) = (Vec::with_capacity(slices), Vec::with_capacity(slices));
        for c in 0..slices {
            let (scale, zp) = filter
                .quantization
                .as_ref()
                .map(|q| (q.scale_at(c), q.zero_point_at(c)))
                .unwrap_or((1.0, 0));
            filter_offsets.push(-zp);
            multipliers.push(quantize_multiplier(
                input_scale as f64 * scale as f64 / output_scale as f64,
            ));
        }
        let (act_min, act_max) = activation_range_quantized(activation, output.dtype, output_scale, output_zp);
        Self {
            input_offset: -input_zp,
            filter_offsets,
            output_offset: output_zp,
            multipliers,
            act_min,
            act_max,
        }
    }

    pub(crate) fn params(&self) -> QuantizedConvParams<'_> {
        QuantizedConvParams {
            input_offset: self.input_offset,
            filter_offsets: &self.filter_offsets,
            output_offset: self.output_offset,
            multipliers: &self.multipliers,
            act_min: self.act_min,
            act_max: self.act_max,
        }
    }
}

/// Leading padding of one window axis. The odd remainder of `Same`
/// padding falls on the trailing edge and is never materialised.
pub(crate) fn leading_padding(
    padding: Padding,
    stride: usize,
    dilation: usize,
    image: usize,
    filter: usize,
    out: usize,
) -> usize {
    match padding {
        Padding::Same => compute_padding_with_offset(stride, dilation, image, filter, out).before,
        Padding::Valid | Padding::Undefined => 0,
    }
}

/// Concrete dims of a configured operand.
pub(crate) fn concrete(t: &TensorDef) -> Result<Vec<usize>, KernelError> {
    t.info.concrete_dims().ok_or_else(|| KernelError::UnknownShape {
        tensor: t.name.clone(),
    })
}

/// Integer values of a shape-driving constant operand.
pub(crate) fn constant_values(kind: OpKind, t: &TensorDef) -> Result<Vec<i64>, KernelError> {
    t.constant_i64().ok_or_else(|| KernelError::MalformedNode {
        kind,
        detail: format!("operand '{}' must be an integer constant", t.name),
    })
}

pub(crate) fn unsupported(kind: OpKind, dtype: DType) -> KernelError {
    KernelError::UnsupportedType { kind, dtype }
}

pub(crate) fn malformed(kind: OpKind, detail: impl Into<String>) -> KernelError {
    KernelError::MalformedNode {
        kind,
        detail: detail.into(),
    }
}
