// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Average and max pooling kernels.

use model_ir::{Node, NodeOptions, OpKind, TensorDef};
use tensor_core::{
    activation_range_quantized,
    ops::{self, PoolGeometry, PoolKind},
    DType, FusedActivation, Layout, Padding, TensorInfo, TensorView, TensorViewMut,
};

use super::{concrete, leading_padding, malformed, unsupported, KernelOp, OpKernel};
use crate::KernelError;

/// 2-D pooling. Quantized pooling keeps the input's scale and zero point,
/// so only the activation clamp is derived.
#[derive(Debug, Clone)]
pub struct PoolKernel {
    pub kind: PoolKind,
    pub padding: Padding,
    pub activation: FusedActivation,
    geometry: PoolGeometry,
    act_range: (i32, i32),
}

pub(crate) fn build_pool(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::Pool2D(o) = &node.options else {
        return Err(malformed(node.kind, "expected pooling options"));
    };
    let kind = match node.kind {
        OpKind::AveragePool2D => PoolKind::Average,
        OpKind::MaxPool2D => PoolKind::Max,
        other => return Err(malformed(other, "not a pooling operation")),
    };
    Ok(KernelOp::Pool(PoolKernel {
        kind,
        padding: o.padding,
        activation: o.fused_activation,
        geometry: PoolGeometry {
            filter_h: o.filter_h,
            filter_w: o.filter_w,
            stride_h: o.stride_h,
            stride_w: o.stride_w,
            pad_top: 0,
            pad_left: 0,
        },
        act_range: (i32::MIN, i32::MAX),
    }))
}

impl PoolKernel {
    fn op_kind(&self) -> OpKind {
        match self.kind {
            PoolKind::Average => OpKind::AveragePool2D,
            PoolKind::Max => OpKind::MaxPool2D,
        }
    }
}

impl OpKernel for PoolKernel {
    fn prepare(
        &mut self,
        layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let ie = layout.extent(&concrete(inputs[0])?);
        let out_dims = output
            .concrete_dims()
            .ok_or_else(|| malformed(self.op_kind(), "output shape is not concrete"))?;
        let oe = layout.extent(&out_dims);
        let g = &mut self.geometry;
        g.pad_top = leading_padding(self.padding, g.stride_h, 1, ie.height, g.filter_h, oe.height);
        g.pad_left = leading_padding(self.padding, g.stride_w, 1, ie.width, g.filter_w, oe.width);
        if output.dtype.is_quantized() {
            let (scale, zero_point) = output.scale_zero_point();
            self.act_range = activation_range_quantized(self.activation, output.dtype, scale, zero_point);
        }
        Ok(0)
    }

    fn run(
        &self,
        layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let input = &inputs[0];
        match input.dtype() {
            DType::F32 => ops::pool_f32(self.kind, input, output, layout, &self.geometry, self.activation)?,
            DType::U8 | DType::I8 | DType::I16 => {
                let (lo, hi) = self.act_range;
                ops::pool_quantized(self.kind, input, output, layout, &self.geometry, lo, hi)?
            }
            dtype => return Err(unsupported(self.op_kind(), dtype)),
        }
        Ok(())
    }
}
