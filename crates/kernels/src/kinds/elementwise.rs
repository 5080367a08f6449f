// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise kernels: broadcasting arithmetic, activations, softmax
//! and mean reduction.

use model_ir::{infer::reduction_mask, Node, NodeOptions, OpKind, TensorDef};
use tensor_core::{
    ops::{
        self, ActivationTable, BinaryOp, Broadcast, FixedPointInput, QuantizedAddParams, QuantizedClamp,
        QuantizedMulParams,
    },
    DType, FusedActivation, Layout, TensorInfo, TensorView, TensorViewMut,
};

use super::{concrete, constant_values, malformed, unsupported, KernelOp, OpKernel};
use crate::KernelError;

// ── Add / Mul ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryQuant {
    None,
    Add(QuantizedAddParams),
    Mul(QuantizedMulParams),
}

/// Broadcasting `Add` or `Mul`.
#[derive(Debug, Clone)]
pub struct BinaryKernel {
    pub op: BinaryOp,
    pub activation: FusedActivation,
    broadcast: Option<Broadcast>,
    quant: BinaryQuant,
}

pub(crate) fn build_binary(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::Arithmetic(o) = &node.options else {
        return Err(malformed(node.kind, "expected arithmetic options"));
    };
    let op = match node.kind {
        OpKind::Add => BinaryOp::Add,
        OpKind::Mul => BinaryOp::Mul,
        other => return Err(malformed(other, "not an arithmetic operation")),
    };
    Ok(KernelOp::Binary(BinaryKernel {
        op,
        activation: o.fused_activation,
        broadcast: None,
        quant: BinaryQuant::None,
    }))
}

impl BinaryKernel {
    fn kind(&self) -> OpKind {
        match self.op {
            BinaryOp::Add => OpKind::Add,
            BinaryOp::Mul => OpKind::Mul,
        }
    }
}

impl OpKernel for BinaryKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        self.broadcast = Some(Broadcast::new(&concrete(inputs[0])?, &concrete(inputs[1])?)?);
        self.quant = if output.dtype.is_quantized() {
            let (lhs, rhs, out) = (
                inputs[0].info.scale_zero_point(),
                inputs[1].info.scale_zero_point(),
                output.scale_zero_point(),
            );
            match self.op {
                BinaryOp::Add => {
                    BinaryQuant::Add(QuantizedAddParams::new(lhs, rhs, out, output.dtype, self.activation))
                }
                BinaryOp::Mul => {
                    BinaryQuant::Mul(QuantizedMulParams::new(lhs, rhs, out, output.dtype, self.activation))
                }
            }
        } else {
            BinaryQuant::None
        };
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let (lhs, rhs) = (&inputs[0], &inputs[1]);
        let Some(broadcast) = &self.broadcast else {
            return Err(KernelError::NotConfigured(self.kind()));
        };
        match (lhs.dtype(), &self.quant) {
            (DType::F32, _) => ops::binary_f32(self.op, lhs, rhs, output, broadcast, self.activation)?,
            (DType::I32 | DType::I64, _) => ops::binary_int(self.op, lhs, rhs, output, broadcast)?,
            (_, BinaryQuant::Add(p)) => ops::add_quantized(lhs, rhs, output, broadcast, p)?,
            (_, BinaryQuant::Mul(p)) => ops::mul_quantized(lhs, rhs, output, broadcast, p)?,
            (dtype, BinaryQuant::None) => return Err(unsupported(self.kind(), dtype)),
        }
        Ok(())
    }
}

// ── Activations ────────────────────────────────────────────────────

/// Derived state of a smooth activation on quantized data.
#[derive(Debug, Clone, PartialEq)]
enum SmoothQuant {
    None,
    /// 8-bit: one output per representable input.
    Table(ActivationTable),
    /// 16-bit logistic and tanh: fixed-point table interpolation.
    FixedPoint(FixedPointInput),
}

/// `Relu`, `Relu6`, `Logistic`, `Tanh` or `Gelu`.
///
/// Quantized clamps requantize with a fixed-point multiplier. The smooth
/// functions use a lookup table built at configuration on 8-bit types and
/// fixed-point interpolation on 16-bit types.
#[derive(Debug, Clone)]
pub struct ActivationKernel {
    pub kind: OpKind,
    clamp: Option<QuantizedClamp>,
    smooth: SmoothQuant,
}

pub(crate) fn build_activation(node: &Node) -> Result<KernelOp, KernelError> {
    match node.kind {
        OpKind::Relu | OpKind::Relu6 | OpKind::Logistic | OpKind::Tanh | OpKind::Gelu => {
            Ok(KernelOp::Activation(ActivationKernel {
                kind: node.kind,
                clamp: None,
                smooth: SmoothQuant::None,
            }))
        }
        other => Err(malformed(other, "not an activation")),
    }
}

impl ActivationKernel {
    /// Real-valued clamp bounds of the rectifiers.
    fn bounds(&self) -> Option<(f32, f32)> {
        match self.kind {
            OpKind::Relu => Some((0.0, f32::INFINITY)),
            OpKind::Relu6 => Some((0.0, 6.0)),
            _ => None,
        }
    }

    fn function(&self) -> fn(f32) -> f32 {
        match self.kind {
            OpKind::Logistic => ops::logistic,
            OpKind::Tanh => f32::tanh,
            _ => ops::gelu,
        }
    }
}

impl OpKernel for ActivationKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let input_q = inputs[0].info.scale_zero_point();
        let output_q = output.scale_zero_point();
        self.clamp = None;
        self.smooth = SmoothQuant::None;
        if !output.dtype.is_quantized() {
            return Ok(0);
        }
        if let Some((lo, hi)) = self.bounds() {
            self.clamp = Some(QuantizedClamp::new(input_q, output_q, output.dtype, lo, hi));
            return Ok(0);
        }
        self.smooth = match output.dtype {
            DType::I16 => {
                if input_q.1 != 0 {
                    return Err(malformed(
                        self.kind,
                        format!("16-bit input must be symmetric, zero point is {}", input_q.1),
                    ));
                }
                SmoothQuant::FixedPoint(FixedPointInput::for_scale(input_q.0))
            }
            dtype => SmoothQuant::Table(ActivationTable::new(dtype, input_q, output_q, self.function())?),
        };
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let input = &inputs[0];
        match (input.dtype(), &self.clamp, &self.smooth) {
            (DType::F32, _, _) => match (self.kind, self.bounds()) {
                (_, Some((lo, hi))) => ops::clamp_f32(input, output, lo, hi)?,
                (OpKind::Logistic, None) => ops::logistic_f32(input, output)?,
                (OpKind::Tanh, None) => ops::tanh_f32(input, output)?,
                _ => ops::gelu_f32(input, output)?,
            },
            (_, Some(clamp), _) => ops::clamp_quantized(input, output, clamp)?,
            (_, None, SmoothQuant::Table(table)) => ops::lookup_quantized(input, output, table)?,
            (_, None, SmoothQuant::FixedPoint(params)) => match self.kind {
                OpKind::Logistic => ops::logistic_i16(input, output, params)?,
                _ => ops::tanh_i16(input, output, params)?,
            },
            (dtype, None, SmoothQuant::None) => return Err(unsupported(self.kind, dtype)),
        }
        Ok(())
    }
}

// ── Softmax ────────────────────────────────────────────────────────

/// Softmax over the last axis.
#[derive(Debug, Clone)]
pub struct SoftmaxKernel {
    pub beta: f32,
    input_q: (f32, i32),
    output_q: (f32, i32),
}

pub(crate) fn build_softmax(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::Softmax(o) = &node.options else {
        return Err(malformed(node.kind, "expected softmax options"));
    };
    if !o.beta.is_finite() || o.beta <= 0.0 {
        return Err(malformed(node.kind, format!("beta must be positive, got {}", o.beta)));
    }
    Ok(KernelOp::Softmax(SoftmaxKernel {
        beta: o.beta,
        input_q: (1.0, 0),
        output_q: (1.0, 0),
    }))
}

impl OpKernel for SoftmaxKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        self.input_q = inputs[0].info.scale_zero_point();
        self.output_q = output.scale_zero_point();
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let input = &inputs[0];
        match input.dtype() {
            DType::F32 => ops::softmax_f32(input, output, self.beta)?,
            DType::U8 | DType::I8 => {
                ops::softmax_quantized(input, output, self.beta, self.input_q, self.output_q)?
            }
            dtype => return Err(unsupported(OpKind::Softmax, dtype)),
        }
        Ok(())
    }
}

// ── Mean ───────────────────────────────────────────────────────────

/// Mean over the axes listed by a constant operand. Operands: `[input, axes]`.
#[derive(Debug, Clone)]
pub struct MeanKernel {
    pub keep_dims: bool,
    mask: Vec<bool>,
    input_q: (f32, i32),
    output_q: (f32, i32),
}

pub(crate) fn build_mean(node: &Node) -> Result<KernelOp, KernelError> {
    let NodeOptions::Reducer(o) = &node.options else {
        return Err(malformed(node.kind, "expected reducer options"));
    };
    Ok(KernelOp::Mean(MeanKernel {
        keep_dims: o.keep_dims,
        mask: Vec::new(),
        input_q: (1.0, 0),
        output_q: (1.0, 0),
    }))
}

impl OpKernel for MeanKernel {
    fn prepare(
        &mut self,
        _layout: Layout,
        inputs: &[&TensorDef],
        output: &TensorInfo,
    ) -> Result<usize, KernelError> {
        let axes = constant_values(OpKind::Mean, inputs[1])?;
        self.mask = reduction_mask(inputs[0].info.shape.rank(), &axes)?;
        self.input_q = inputs[0].info.scale_zero_point();
        self.output_q = output.scale_zero_point();
        Ok(0)
    }

    fn run(
        &self,
        _layout: Layout,
        inputs: &[TensorView<'_>],
        output: &mut TensorViewMut<'_>,
        _scratch: &mut [u8],
    ) -> Result<(), KernelError> {
        let input = &inputs[0];
        match input.dtype() {
            DType::F32 => ops::mean_f32(input, output, &self.mask)?,
            DType::U8 | DType::I8 | DType::I16 => {
                ops::mean_quantized(input, output, &self.mask, self.input_q, self.output_q)?
            }
            dtype => return Err(unsupported(OpKind::Mean, dtype)),
        }
        Ok(())
    }
}
