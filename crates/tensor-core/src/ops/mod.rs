// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference numeric kernels.
//!
//! Each operation writes into a caller-provided output view and never
//! allocates. Parameters that depend only on shapes and quantization
//! (broadcast strides, fixed-point multipliers, padding) are computed once
//! by the caller and passed in, so the hot path is pure arithmetic.

mod activation;
mod conv;
mod elementwise;
mod fully_connected;
mod pool;
mod reduce;
mod softmax;
mod transform;

pub use activation::{
    clamp_f32, clamp_quantized, gelu, gelu_f32, logistic, logistic_f32, logistic_i16,
    lookup_quantized, tanh_f32, tanh_i16, ActivationTable, FixedPointInput, QuantizedClamp,
};
pub use conv::{
    conv2d_f32, conv2d_quantized, depthwise_conv2d_f32, depthwise_conv2d_quantized,
    transpose_conv_f32, transpose_conv_quantized, ConvGeometry,
};
pub use elementwise::{
    add_quantized, binary_f32, binary_int, mul_quantized, BinaryOp, Broadcast, QuantizedAddParams,
    QuantizedMulParams,
};
pub use fully_connected::{fully_connected_f32, fully_connected_quantized};
pub use pool::{pool_f32, pool_quantized, PoolGeometry, PoolKind};
pub use reduce::{mean_f32, mean_quantized};
pub use softmax::{softmax_f32, softmax_quantized};
pub use transform::{copy, strided_slice, transpose, SliceAxis};

use crate::{DType, QuantizedElement, QuantizedMultiplier, TensorError};

/// Fixed-point parameters of a multiply-accumulate kernel
/// (convolution, depthwise convolution, fully connected).
///
/// `filter_offsets` and `multipliers` hold either one entry (per-tensor) or
/// one entry per output channel (per-axis weights).
#[derive(Debug, Clone, Copy)]
pub struct QuantizedConvParams<'a> {
    /// Negated input zero point.
    pub input_offset: i32,
    /// Negated filter zero points.
    pub filter_offsets: &'a [i32],
    /// Output zero point.
    pub output_offset: i32,
    pub multipliers: &'a [QuantizedMultiplier],
    pub act_min: i32,
    pub act_max: i32,
}

impl QuantizedConvParams<'_> {
    #[inline]
    pub(crate) fn filter_offset(&self, channel: usize) -> i32 {
        pick(self.filter_offsets, channel)
    }

    #[inline]
    pub(crate) fn multiplier(&self, channel: usize) -> QuantizedMultiplier {
        pick(self.multipliers, channel)
    }
}

/// One widened product `(x + input_offset) * (w + filter_offset)` of a
/// 16-bit activation path.
#[inline]
pub(crate) fn mac_i64(
    input: &crate::TensorView<'_>,
    filter: &crate::TensorView<'_>,
    params: &QuantizedConvParams<'_>,
    i: usize,
    f: usize,
    channel: usize,
) -> i64 {
    let x = load_i32(input, i) as i64 + params.input_offset as i64;
    let w = load_i32(filter, f) as i64 + params.filter_offset(channel) as i64;
    x * w
}

/// Adds the bias to a 64-bit accumulator, rescales it and stores the
/// clamped result at `o`.
#[inline]
pub(crate) fn store_rescaled_i64(
    output: &mut crate::TensorViewMut<'_>,
    bias: Option<&crate::TensorView<'_>>,
    params: &QuantizedConvParams<'_>,
    o: usize,
    channel: usize,
    acc: i64,
) {
    let acc = acc.saturating_add(bias.map_or(0, |b| load_i64(b, channel)));
    let v = crate::multiply_by_quantized_multiplier_i64(acc, params.multiplier(channel))
        .saturating_add(params.output_offset);
    store_i32(output, o, v.clamp(params.act_min, params.act_max));
}

#[inline]
fn pick<T: Copy + Default>(values: &[T], i: usize) -> T {
    match values.len() {
        0 => T::default(),
        1 => values[0],
        _ => values[i],
    }
}

pub(crate) fn expect_dtype(op: &'static str, actual: DType, expected: DType) -> Result<(), TensorError> {
    if actual != expected {
        return Err(TensorError::UnsupportedDType { op, dtype: actual });
    }
    Ok(())
}

pub(crate) fn expect_rank(op: &'static str, dims: &[usize], rank: usize) -> Result<(), TensorError> {
    if dims.len() != rank {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: crate::Shape::new(vec![0; rank]),
            rhs: crate::Shape::from(dims),
        });
    }
    Ok(())
}

pub(crate) fn expect_same_count(
    op: &'static str,
    lhs: &[usize],
    rhs: &[usize],
) -> Result<(), TensorError> {
    if lhs.iter().product::<usize>() != rhs.iter().product::<usize>() {
        return Err(TensorError::ShapeMismatch {
            op,
            lhs: crate::Shape::from(lhs),
            rhs: crate::Shape::from(rhs),
        });
    }
    Ok(())
}

/// Reads element `i` of a quantized (or i32) view as `i32`.
#[inline]
pub(crate) fn load_i32(view: &crate::TensorView<'_>, i: usize) -> i32 {
    match view.dtype() {
        DType::U8 => view.get::<u8>(i) as i32,
        DType::I8 => view.get::<i8>(i) as i32,
        DType::I16 => view.get::<i16>(i) as i32,
        DType::I32 => view.get::<i32>(i),
        _ => 0,
    }
}

/// Reads element `i` of a 64-bit accumulator operand such as a bias.
#[inline]
pub(crate) fn load_i64(view: &crate::TensorView<'_>, i: usize) -> i64 {
    match view.dtype() {
        DType::I64 => view.get::<i64>(i),
        _ => load_i32(view, i) as i64,
    }
}

/// Writes `v` into element `i`, saturating to the element type.
#[inline]
pub(crate) fn store_i32(view: &mut crate::TensorViewMut<'_>, i: usize, v: i32) {
    match view.dtype() {
        DType::U8 => view.set(i, u8::from_i32_saturating(v)),
        DType::I8 => view.set(i, i8::from_i32_saturating(v)),
        DType::I16 => view.set(i, i16::from_i32_saturating(v)),
        DType::I32 => view.set(i, v),
        _ => {}
    }
}

pub(crate) fn expect_quantized(op: &'static str, dtype: DType) -> Result<(), TensorError> {
    if !dtype.is_quantized() {
        return Err(TensorError::UnsupportedDType { op, dtype });
    }
    Ok(())
}
