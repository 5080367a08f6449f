// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Multiply-accumulate kernels: convolution, depthwise convolution,
//! transposed convolution and fully connected.

use model_ir::{Node, NodeOptions, OpKind, TensorDef};
use tensor_core::{
    ops::{self, ConvGeometry},
    DType, FusedActivation, Layout, Padding, TensorInfo, TensorView, TensorViewMut,
};

use super::{concrete, leading_padding, malformed, unsupported, KernelOp, MacQuant, OpKernel};
use crate::KernelError;

/// Window parameters shared by the convolution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub activation: FusedActivation,
}

// ── Convolution / depthwise ────────────────────────────────────────

/// Regular or depthwise 2-D convolution.
///
/// Operands: `[input, filter, bias?]`.
#[derive(Debug, Clone)]
pub struct ConvKernel {
    pub params: ConvParams,
    depthwise: bool,
    geometry: ConvGeometry,
    pub(crate) quant: Option<MacQuant>,
}

pub(crate) fn build_conv(node: &Node) -> Result<KernelOp, KernelError> {
    let (params, depthwise) = match &node.options {
        NodeOptions::Conv2D(o) => (
            ConvParams {
                padding: o.padding,
                stride_h: o.stride_h,
                stride_w: o.stride_w,
                dilation_h: o.dilation_h,
                dilation_w: o.dilation_w,
                activation: o.fused_activation,
            },
            false,
        ),
        NodeOptions::DepthwiseConv2D(o) => (
            ConvParams {
                padding: o.padding,
                stride_h: o.stride_h,
                stride_w: o.stride_w,
                dilation_h: o.dilation_h,
                dilation_w: o.dilation_w,
                activation: o.fused_activation,
            },
            true,
        ),
        _ => return Err(malformed(node.kind, "expected convolution options")),
    };
    Ok(KernelOp::Conv(ConvKernel {
        params,
        depthwise,
        geometry: ConvGeometry::default(),
        quant: None,
    }))
}

impl ConvKernel {
    fn kind(&self) -> OpKind {
        if self.depthwise {
            OpKind::DepthwiseConv2D
        } else {
            OpKind::Conv2D
        }
    }
}

impl OpKernel for ConvKernel {
    fn prepare(
        &mut self,
        layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let ie = layout.extent(&concrete(inputs[0])?);
        let fd = concrete(inputs[1])?;
        let out_dims = output
            .concrete_dims()
            .ok_or_else(|| malformed(self.kind(), "output shape is not concrete"))?;
        let oe = layout.extent(&out_dims);
        let p = &self.params;
        self.geometry = ConvGeometry {
            stride_h: p.stride_h,
            stride_w: p.stride_w,
            dilation_h: p.dilation_h,
            dilation_w: p.dilation_w,
            pad_top: leading_padding(p.padding, p.stride_h, p.dilation_h, ie.height, fd[1], oe.height),
            pad_left: leading_padding(p.padding, p.stride_w, p.dilation_w, ie.width, fd[2], oe.width),
        };
        self.quant = inputs[0]
            .info
            .dtype
            .is_quantized()
            .then(|| MacQuant::derive(&inputs[0].info, &inputs[1].info, output, oe.depth, p.activation));
        Ok(0)
    }

    fn run(
        &self,
        layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let (input, filter, bias) = (&inputs[0], &inputs[1], inputs.get(2));
        let geo = &self.geometry;
        match (input.dtype(), &self.quant) {
            (DType::F32, _) if self.depthwise => {
                ops::depthwise_conv2d_f32(input, filter, bias, output, layout, geo, self.params.activation)?
            }
            (DType::F32, _) => {
                ops::conv2d_f32(input, filter, bias, output, layout, geo, self.params.activation)?
            }
            (_, Some(q)) if self.depthwise => {
                ops::depthwise_conv2d_quantized(input, filter, bias, output, layout, geo, &q.params())?
            }
            (_, Some(q)) => ops::conv2d_quantized(input, filter, bias, output, layout, geo, &q.params())?,
            (dtype, None) => return Err(unsupported(self.kind(), dtype)),
        }
        Ok(())
    }
}

// ── Transposed convolution ─────────────────────────────────────────

/// Transposed 2-D convolution.
///
/// Operands: `[output_shape, filter, input, bias?]`. Quantized inputs
/// accumulate into an `i32` scratch buffer covering the whole output.
#[derive(Debug, Clone)]
pub struct TransposeConvKernel {
    pub params: ConvParams,
    geometry: ConvGeometry,
    pub(crate) quant: Option<MacQuant>,
}

pub(crate) fn build_transpose_conv(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::TransposeConv(o) = &node.options else {
        return Err(malformed(node.kind, "expected transpose convolution options"));
    };
    Ok(KernelOp::TransposeConv(TransposeConvKernel {
        params: ConvParams {
            padding: o.padding,
            stride_h: o.stride_h,
            stride_w: o.stride_w,
            dilation_h: 1,
            dilation_w: 1,
            activation: o.fused_activation,
        },
        geometry: ConvGeometry::default(),
        quant: None,
    }))
}

impl OpKernel for TransposeConvKernel {
    fn prepare(
        &mut self,
        layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let fd = concrete(inputs[1])?;
        let ie = layout.extent(&concrete(inputs[2])?);
        let out_dims = output
            .concrete_dims()
            .ok_or_else(|| malformed(OpKind::TransposeConv, "output shape is not concrete"))?;
        let oe = layout.extent(&out_dims);
        let p = &self.params;
        // Padding is that of the forward convolution from output to input.
        self.geometry = ConvGeometry {
            stride_h: p.stride_h,
            stride_w: p.stride_w,
            dilation_h: 1,
            dilation_w: 1,
            pad_top: leading_padding(p.padding, p.stride_h, 1, oe.height, fd[1], ie.height),
            pad_left: leading_padding(p.padding, p.stride_w, 1, oe.width, fd[2], ie.width),
        };
        let input = &inputs[2].info;
        if !input.dtype.is_quantized() {
            self.quant = None;
            return Ok(0);
        }
        self.quant = Some(MacQuant::derive(input, &inputs[1].info, output, oe.depth, p.activation));
        Ok(out_dims.iter().product::<usize>() * DType::I32.size_bytes())
    }

    fn run(
        &self,
        layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let (filter, input, bias) = (&inputs[1], &inputs[2], inputs.get(3));
        let geo = &self.geometry;
        match (input.dtype(), &self.quant) {
            (DType::F32, _) => {
                ops::transpose_conv_f32(input, filter, bias, output, layout, geo, self.params.activation)?
            }
            (_, Some(q)) => {
                ops::transpose_conv_quantized(input, filter, bias, output, scratch, layout, geo, &q.params())?
            }
            (dtype, None) => return Err(unsupported(OpKind::TransposeConv, dtype)),
        }
        Ok(())
    }
}

// ── Fully connected ────────────────────────────────────────────────

/// Dense layer. Operands: `[input, weights, bias?]`.
#[derive(Debug, Clone)]
pub struct FullyConnectedKernel {
    pub activation: FusedActivation,
    pub keep_num_dims: bool,
    pub(crate) quant: Option<MacQuant>,
}

pub(crate) fn build_fully_connected(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::FullyConnected(o) = &node.options else {
        return Err(malformed(node.kind, "expected fully connected options"));
    };
    Ok(KernelOp::FullyConnected(FullyConnectedKernel {
        activation: o.fused_activation,
        keep_num_dims: o.keep_num_dims,
        quant: None,
    }))
}

impl OpKernel for FullyConnectedKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let units = concrete(inputs[1])?[0];
        self.quant = inputs[0]
            .info
            .dtype
            .is_quantized()
            .then(|| MacQuant::derive(&inputs[0].info, &inputs[1].info, output, units, self.activation));
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let (input, weights, bias) = (&inputs[0], &inputs[1], inputs.get(2));
        match (input.dtype(), &self.quant) {
            (DType::F32, _) => ops::fully_connected_f32(input, weights, bias, output, self.activation)?,
            (_, Some(q)) => ops::fully_connected_quantized(input, weights, bias, output, &q.params())?,
            (dtype, None) => return Err(unsupported(OpKind::FullyConnected, dtype)),
        }
        Ok(())
    }
}
