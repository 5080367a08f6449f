// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data-movement kernels: reshape, transpose, strided slice and layout
//! permutation. All of them are element-type agnostic.

use model_ir::{
    infer::{permutation, resolve_strided_slice},
    Node, NodeOptions, OpKind, StridedSliceOptions, TensorDef,
};
use tensor_core::{
    ops::{self, SliceAxis},
    Layout, TensorInfo, TensorView, TensorViewMut,
};

use super::{constant_values, malformed, KernelOp, OpKernel};
use crate::KernelError;

// ── Reshape ────────────────────────────────────────────────────────

/// Byte copy into the new shape. Operands: `[input, shape?]`.
#[derive(Debug, Clone, Default)]
pub struct ReshapeKernel;

pub(crate) fn build_reshape(node: &Node) -> Result<KernelOp, KernelError> {
    if node.inputs.len() == 1 {
        let NodeOptions::Reshape(o) = &node.options else {
            return Err(malformed(node.kind, "expected reshape options"));
        };
        if o.new_shape.is_none() {
            return Err(malformed(node.kind, "no shape operand and no new_shape option"));
        }
    }
    Ok(KernelOp::Reshape(ReshapeKernel))
}

impl OpKernel for ReshapeKernel {
    fn prepare(&mut self, _: Layout, _: &[&TensorDef], _: &TensorInfo) -> Result<usize, KernelError> {
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        ops::copy(&inputs[0], output)?;
        Ok(())
    }
}

// ── Transpose ──────────────────────────────────────────────────────

/// Axis permutation given by a constant operand. Operands: `[input, perm]`.
#[derive(Debug, Clone, Default)]
pub struct TransposeKernel {
    perm: Vec<usize>,
}

pub(crate) fn build_transpose(_node: &Node) -> Result<KernelOp, KernelError> {
    Ok(KernelOp::Transpose(TransposeKernel::default()))
}

impl OpKernel for TransposeKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        _output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let values = constant_values(OpKind::Transpose, inputs[1])?;
        self.perm = permutation(&values, inputs[0].info.shape.rank())?;
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        ops::transpose(&inputs[0], output, &self.perm)?;
        Ok(())
    }
}

// ── Strided slice ──────────────────────────────────────────────────

/// The five bitmasks of a strided slice. Bit `i` refers to entry `i` of
/// the begin/end/strides operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StridedSliceParams {
    /// Ignore `begin[i]` and start at the first (or last, for negative
    /// strides) element.
    pub begin_mask: u32,
    /// Ignore `end[i]` and run to the end of the axis.
    pub end_mask: u32,
    /// Entry `i` expands to every axis not addressed by another entry.
    pub ellipsis_mask: u32,
    /// Entry `i` inserts a unit axis into the output.
    pub new_axis_mask: u32,
    /// Entry `i` selects the single index `begin[i]` and drops the axis.
    pub shrink_axis_mask: u32,
}

impl StridedSliceParams {
    /// Unpacks the raw option table. Masks must be non-negative and at most
    /// one ellipsis may be present.
    pub fn from_options(o: &StridedSliceOptions) -> Result<Self, String> {
        let mask = |name: &str, v: i32| {
            u32::try_from(v).map_err(|_| format!("{name} must be non-negative, got {v}"))
        };
        let params = Self {
            begin_mask: mask("begin_mask", o.begin_mask)?,
            end_mask: mask("end_mask", o.end_mask)?,
            ellipsis_mask: mask("ellipsis_mask", o.ellipsis_mask)?,
            new_axis_mask: mask("new_axis_mask", o.new_axis_mask)?,
            shrink_axis_mask: mask("shrink_axis_mask", o.shrink_axis_mask)?,
        };
        if params.ellipsis_mask.count_ones() > 1 {
            return Err(format!(
                "ellipsis_mask {:#b} sets more than one entry",
                params.ellipsis_mask
            ));
        }
        Ok(params)
    }

    fn options(&self) -> StridedSliceOptions {
        StridedSliceOptions {
            begin_mask: self.begin_mask as i32,
            end_mask: self.end_mask as i32,
            ellipsis_mask: self.ellipsis_mask as i32,
            new_axis_mask: self.new_axis_mask as i32,
            shrink_axis_mask: self.shrink_axis_mask as i32,
        }
    }
}

/// Strided slice. Operands: `[input, begin, end, strides]`, the last
/// three constant.
#[derive(Debug, Clone)]
pub struct StridedSliceKernel {
    pub params: StridedSliceParams,
    axes: Vec<SliceAxis>,
}

pub(crate) fn build_strided_slice(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::StridedSlice(o) = &node.options else {
        return Err(malformed(node.kind, "expected strided slice options"));
    };
    let params = StridedSliceParams::from_options(o).map_err(|detail| malformed(node.kind, detail))?;
    Ok(KernelOp::StridedSlice(StridedSliceKernel {
        params,
        axes: Vec::new(),
    }))
}

impl OpKernel for StridedSliceKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        _output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let begin = constant_values(OpKind::StridedSlice, inputs[1])?;
        let end = constant_values(OpKind::StridedSlice, inputs[2])?;
        let strides = constant_values(OpKind::StridedSlice, inputs[3])?;
        let resolution = resolve_strided_slice(
            inputs[0].info.shape.dims(),
            &begin,
            &end,
            &strides,
            &self.params.options(),
        )?;
        self.axes = resolution.slice_axes().ok_or_else(|| KernelError::UnknownShape {
            tensor: inputs[0].name.clone(),
        })?;
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        ops::strided_slice(&inputs[0], output, &self.axes)?;
        Ok(())
    }
}

// ── Permute ────────────────────────────────────────────────────────

/// Layout conversion between channel-last and channel-first.
#[derive(Debug, Clone)]
pub struct PermuteKernel {
    pub from: Layout,
    pub to: Layout,
}

pub(crate) fn build_permute(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::Permute(o) = &node.options else {
        return Err(malformed(node.kind, "expected permute options"));
    };
    Ok(KernelOp::Permute(PermuteKernel { from: o.from, to: o.to }))
}

impl OpKernel for PermuteKernel {
    fn prepare(&mut self, _: Layout, _: &[&TensorDef], _: &TensorInfo) -> Result<usize, KernelError> {
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        ops::transpose(&inputs[0], output, &self.from.permutation_to(self.to))?;
        Ok(())
    }
}
