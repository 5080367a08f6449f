// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rules for multiply-accumulate operations: convolutions and fully
//! connected layers.
//!
//! Filters are stored independently of the activation layout:
//! convolution `[out_ch, kh, kw, in_ch]`, depthwise `[1, kh, kw, out_ch]`,
//! transpose convolution `[out_ch, kh, kw, in_ch]`, fully connected
//! `[units, depth]`.

use tensor_core::{compute_output_size, DType, Dim, Extent4, Layout, Padding, Shape};

use super::{
    constant_ints, expect_rank, invalid, known_dims, operand, spatial_dims, spatial_shape,
    InferError, OutputRule,
};
use crate::{Node, NodeOptions, OpKind, TensorDef};

/// Output extent of a window sweep along one axis.
pub(super) fn window_extent(
    padding: Padding,
    image: Dim,
    filter: usize,
    stride: usize,
    dilation: usize,
) -> Result<Dim, InferError> {
    match image {
        Dim::Unknown => Ok(Dim::Unknown),
        Dim::Known(n) => compute_output_size(padding, n, filter, stride, dilation)
            .map(Dim::Known)
            .ok_or_else(|| {
                invalid(format!(
                    "window of {filter} (dilation {dilation}) does not fit extent {n} with {padding:?} padding"
                ))
            }),
    }
}

/// Accepted `(input, filter)` element type pairs.
fn check_weight_types(kind: OpKind, input: &TensorDef, filter: &TensorDef) -> Result<(), InferError> {
    let ok = matches!(
        (input.info.dtype, filter.info.dtype),
        (DType::F32, DType::F32)
            | (DType::U8, DType::U8)
            | (DType::I8, DType::I8)
            | (DType::I16, DType::I8)
    );
    if !ok {
        return Err(invalid(format!(
            "'{kind}' does not support {} input with {} weights",
            input.info.dtype, filter.info.dtype
        )));
    }
    if filter.info.dtype.is_quantized() {
        let q = filter.info.quantization.as_ref().ok_or_else(|| {
            invalid(format!(
                "quantized weights '{}' have no quantization parameters",
                filter.name
            ))
        })?;
        q.validate(&filter.info.shape)
            .map_err(|e| invalid(format!("weights '{}': {e}", filter.name)))?;
    }
    Ok(())
}

/// Bias must hold one value per output channel: f32 for float inputs, i64
/// for 16-bit inputs, i32 accumulators otherwise.
fn check_bias(input: &TensorDef, bias: Option<&&TensorDef>, channels: usize) -> Result<(), InferError> {
    let Some(bias) = bias else { return Ok(()) };
    let expected = match input.info.dtype {
        DType::F32 => DType::F32,
        DType::I16 => DType::I64,
        _ => DType::I32,
    };
    if bias.info.dtype != expected {
        return Err(invalid(format!(
            "bias '{}' must be {expected} for {} inputs, is {}",
            bias.name, input.info.dtype, bias.info.dtype
        )));
    }
    match bias.info.shape.num_elements() {
        Some(n) if n == channels => Ok(()),
        _ => Err(invalid(format!(
            "bias '{}' has shape {}, expected {channels} values",
            bias.name, bias.info.shape
        ))),
    }
}

fn check_channels(what: &str, actual: Dim, expected: usize) -> Result<(), InferError> {
    match actual.known() {
        Some(c) if c != expected => Err(invalid(format!(
            "{what}: input has {c} channels, weights expect {expected}"
        ))),
        _ => Ok(()),
    }
}

pub(super) fn conv2d(node: &Node, inputs: &[&TensorDef], layout: Layout) -> Result<OutputRule, InferError> {
    let NodeOptions::Conv2D(o) = &node.options else {
        return Err(invalid("conv2d requires convolution options"));
    };
    let input = operand(inputs, 0, "input")?;
    let filter = operand(inputs, 1, "filter")?;
    check_weight_types(node.kind, input, filter)?;
    let [b, h, w, c] = spatial_dims(input, layout)?;
    expect_rank(filter, 4)?;
    let f = known_dims(filter)?;
    check_channels("conv2d", c, f[3])?;
    check_bias(input, inputs.get(2), f[0])?;

    let oh = window_extent(o.padding, h, f[1], o.stride_h, o.dilation_h)?;
    let ow = window_extent(o.padding, w, f[2], o.stride_w, o.dilation_w)?;
    Ok(OutputRule::rescaled(
        spatial_shape(layout, b, oh, ow, Dim::Known(f[0])),
        input.info.dtype,
    ))
}

pub(super) fn depthwise_conv2d(
    node: &Node,
    inputs: &[&TensorDef],
    layout: Layout,
) -> Result<OutputRule, InferError> {
    let NodeOptions::DepthwiseConv2D(o) = &node.options else {
        return Err(invalid("depthwise_conv2d requires depthwise options"));
    };
    let input = operand(inputs, 0, "input")?;
    let filter = operand(inputs, 1, "filter")?;
    check_weight_types(node.kind, input, filter)?;
    let [b, h, w, c] = spatial_dims(input, layout)?;
    expect_rank(filter, 4)?;
    let f = known_dims(filter)?;
    if f[0] != 1 {
        return Err(invalid(format!(
            "depthwise filter '{}' must have a leading 1, has {}",
            filter.name, filter.info.shape
        )));
    }
    if o.depth_multiplier == 0 || f[3] % o.depth_multiplier != 0 {
        return Err(invalid(format!(
            "{} output channels are not a multiple of depth multiplier {}",
            f[3], o.depth_multiplier
        )));
    }
    check_channels("depthwise_conv2d", c, f[3] / o.depth_multiplier)?;
    check_bias(input, inputs.get(2), f[3])?;

    let oh = window_extent(o.padding, h, f[1], o.stride_h, o.dilation_h)?;
    let ow = window_extent(o.padding, w, f[2], o.stride_w, o.dilation_w)?;
    Ok(OutputRule::rescaled(
        spatial_shape(layout, b, oh, ow, Dim::Known(f[3])),
        input.info.dtype,
    ))
}

/// Operands: `[output_shape, filter, input, bias?]`. The output shape is a
/// constant holding logical `(batch, height, width, channels)`.
pub(super) fn transpose_conv(
    node: &Node,
    inputs: &[&TensorDef],
    layout: Layout,
) -> Result<OutputRule, InferError> {
    let NodeOptions::TransposeConv(o) = &node.options else {
        return Err(invalid("transpose_conv requires transpose convolution options"));
    };
    let shape = constant_ints(operand(inputs, 0, "output shape")?, "output shape")?;
    let filter = operand(inputs, 1, "filter")?;
    let input = operand(inputs, 2, "input")?;
    if input.info.dtype == DType::I16 {
        return Err(invalid("transpose_conv does not support i16 inputs"));
    }
    check_weight_types(node.kind, input, filter)?;
    let [_, h, w, c] = spatial_dims(input, layout)?;
    expect_rank(filter, 4)?;
    let f = known_dims(filter)?;
    check_channels("transpose_conv", c, f[3])?;
    check_bias(input, inputs.get(3), f[0])?;

    if shape.len() != 4 || shape.iter().any(|&d| d <= 0) {
        return Err(invalid(format!("output shape {shape:?} must be 4 positive extents")));
    }
    let out = Extent4 {
        batch: shape[0] as usize,
        height: shape[1] as usize,
        width: shape[2] as usize,
        depth: shape[3] as usize,
    };
    if out.depth != f[0] {
        return Err(invalid(format!(
            "output shape has {} channels, filter produces {}",
            out.depth, f[0]
        )));
    }
    // The forward window over the output must land back on the input.
    for (axis, image, kernel, stride, actual) in [
        ("height", out.height, f[1], o.stride_h, h),
        ("width", out.width, f[2], o.stride_w, w),
    ] {
        let forward = compute_output_size(o.padding, image, kernel, stride, 1);
        if let (Some(n), Some(expected)) = (actual.known(), forward) {
            if n != expected {
                return Err(invalid(format!(
                    "{axis}: output extent {image} maps back to {expected}, input has {n}"
                )));
            }
        }
    }
    Ok(OutputRule::rescaled(
        Shape::new(layout.dims_of(out).to_vec()),
        input.info.dtype,
    ))
}

/// Operands: `[input, weights, bias?]`. Without `keep_num_dims` the input is
/// flattened to `[batches, depth]`.
pub(super) fn fully_connected(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let NodeOptions::FullyConnected(o) = &node.options else {
        return Err(invalid("fully_connected requires fully connected options"));
    };
    let input = operand(inputs, 0, "input")?;
    let weights = operand(inputs, 1, "weights")?;
    check_weight_types(node.kind, input, weights)?;
    expect_rank(weights, 2)?;
    let wd = known_dims(weights)?;
    let (units, depth) = (wd[0], wd[1]);
    check_bias(input, inputs.get(2), units)?;

    let in_shape = &input.info.shape;
    if in_shape.rank() == 0 || depth == 0 {
        return Err(invalid("fully_connected needs a non-scalar input and non-empty weights"));
    }
    let shape = if o.keep_num_dims {
        let last = in_shape.rank() - 1;
        if let Some(d) = in_shape.dims()[last].known() {
            if d != depth {
                return Err(invalid(format!(
                    "input '{}' ends in {d}, weights expect {depth}",
                    input.name
                )));
            }
        }
        in_shape.with_dim(last, Dim::Known(units))
    } else {
        let batches = match in_shape.num_elements() {
            Some(n) if n % depth != 0 => {
                return Err(invalid(format!(
                    "input '{}' of {n} elements is not divisible by depth {depth}",
                    input.name
                )))
            }
            Some(n) => Dim::Known(n / depth),
            None => Dim::Unknown,
        };
        Shape::from_dims(vec![batches, Dim::Known(units)])
    };
    Ok(OutputRule::rescaled(shape, input.info.dtype))
}
