// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting binary arithmetic.

use super::{expect_dtype, expect_quantized, load_i32, store_i32};
use crate::{
    activation_range_quantized, multiply_by_quantized_multiplier, quantize_multiplier, DType,
    FusedActivation, QuantizedMultiplier, Shape, TensorError, TensorView, TensorViewMut, MAX_RANK,
};

/// The arithmetic applied element-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Mul,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Mul => "mul",
        }
    }
}

// ── Broadcast iteration ────────────────────────────────────────

/// Precomputed NumPy-style broadcast of two concrete shapes.
///
/// Dimensions are aligned from the right; a size-1 dimension is stretched
/// by giving it stride 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    rank: usize,
    out_dims: [usize; MAX_RANK],
    lhs_strides: [usize; MAX_RANK],
    rhs_strides: [usize; MAX_RANK],
}

fn aligned_strides(dims: &[usize], rank: usize, out: &[usize; MAX_RANK]) -> [usize; MAX_RANK] {
    let mut strides = [0usize; MAX_RANK];
    let pad = rank - dims.len();
    let mut running = 1usize;
    for i in (0..rank).rev() {
        let d = if i >= pad { dims[i - pad] } else { 1 };
        strides[i] = if d == 1 && out[i] != 1 { 0 } else { running };
        running *= d;
    }
    strides
}

impl Broadcast {
    pub fn new(lhs: &[usize], rhs: &[usize]) -> Result<Self, TensorError> {
        let rank = lhs.len().max(rhs.len());
        if rank > MAX_RANK {
            return Err(TensorError::RankTooLarge { rank, max: MAX_RANK });
        }
        let mut out_dims = [1usize; MAX_RANK];
        for (i, slot) in out_dims.iter_mut().enumerate().take(rank) {
            let l = (i + lhs.len()).checked_sub(rank).map_or(1, |j| lhs[j]);
            let r = (i + rhs.len()).checked_sub(rank).map_or(1, |j| rhs[j]);
            *slot = match (l, r) {
                (l, r) if l == r => l,
                (1, r) => r,
                (l, 1) => l,
                _ => {
                    return Err(TensorError::ShapeMismatch {
                        op: "broadcast",
                        lhs: Shape::from(lhs),
                        rhs: Shape::from(rhs),
                    })
                }
            };
        }
        Ok(Self {
            rank,
            out_dims,
            lhs_strides: aligned_strides(lhs, rank, &out_dims),
            rhs_strides: aligned_strides(rhs, rank, &out_dims),
        })
    }

    /// Extents of the broadcast result.
    pub fn output_dims(&self) -> &[usize] {
        &self.out_dims[..self.rank]
    }

    pub fn num_elements(&self) -> usize {
        self.output_dims().iter().product()
    }

    /// Calls `f(out, lhs, rhs)` for every output element in row-major order.
    pub(crate) fn for_each(&self, mut f: impl FnMut(usize, usize, usize)) {
        let n = self.num_elements();
        let mut idx = [0usize; MAX_RANK];
        let (mut l, mut r) = (0usize, 0usize);
        for o in 0..n {
            f(o, l, r);
            let mut axis = self.rank;
            while axis > 0 {
                axis -= 1;
                idx[axis] += 1;
                l += self.lhs_strides[axis];
                r += self.rhs_strides[axis];
                if idx[axis] < self.out_dims[axis] {
                    break;
                }
                l -= self.lhs_strides[axis] * self.out_dims[axis];
                r -= self.rhs_strides[axis] * self.out_dims[axis];
                idx[axis] = 0;
            }
        }
    }
}

// ── Float and integer paths ────────────────────────────────────

/// `output = activation(lhs op rhs)` with broadcasting.
pub fn binary_f32(
    op: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    broadcast: &Broadcast,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype(op.name(), lhs.dtype(), DType::F32)?;
    expect_dtype(op.name(), rhs.dtype(), DType::F32)?;
    broadcast.for_each(|o, l, r| {
        let (a, b) = (lhs.get::<f32>(l), rhs.get::<f32>(r));
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Mul => a * b,
        };
        output.set(o, activation.apply(v));
    });
    Ok(())
}

/// Wrapping integer arithmetic for `i32` / `i64` operands.
pub fn binary_int(
    op: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    broadcast: &Broadcast,
) -> Result<(), TensorError> {
    expect_dtype(op.name(), rhs.dtype(), lhs.dtype())?;
    match lhs.dtype() {
        DType::I32 => broadcast.for_each(|o, l, r| {
            let (a, b) = (lhs.get::<i32>(l), rhs.get::<i32>(r));
            let v = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Mul => a.wrapping_mul(b),
            };
            output.set(o, v);
        }),
        DType::I64 => broadcast.for_each(|o, l, r| {
            let (a, b) = (lhs.get::<i64>(l), rhs.get::<i64>(r));
            let v = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Mul => a.wrapping_mul(b),
            };
            output.set(o, v);
        }),
        other => {
            return Err(TensorError::UnsupportedDType {
                op: op.name(),
                dtype: other,
            })
        }
    }
    Ok(())
}

// ── Quantized add ──────────────────────────────────────────────

/// Fixed-point parameters for quantized addition.
///
/// Both operands are lifted by `left_shift` bits, rescaled to a common
/// scale of twice the larger input scale, summed, then rescaled into the
/// output domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedAddParams {
    pub lhs_offset: i32,
    pub rhs_offset: i32,
    pub output_offset: i32,
    pub left_shift: i32,
    pub lhs_multiplier: QuantizedMultiplier,
    pub rhs_multiplier: QuantizedMultiplier,
    pub output_multiplier: QuantizedMultiplier,
    pub act_min: i32,
    pub act_max: i32,
}

impl QuantizedAddParams {
    /// Derives the parameters from `(scale, zero_point)` of each operand.
    pub fn new(
        lhs: (f32, i32),
        rhs: (f32, i32),
        output: (f32, i32),
        dtype: DType,
        activation: FusedActivation,
    ) -> Self {
        let left_shift = if dtype == DType::I16 { 15 } else { 20 };
        let twice_max = 2.0 * lhs.0.max(rhs.0) as f64;
        let (act_min, act_max) = activation_range_quantized(activation, dtype, output.0, output.1);
        Self {
            lhs_offset: -lhs.1,
            rhs_offset: -rhs.1,
            output_offset: output.1,
            left_shift,
            lhs_multiplier: quantize_multiplier(lhs.0 as f64 / twice_max),
            rhs_multiplier: quantize_multiplier(rhs.0 as f64 / twice_max),
            output_multiplier: quantize_multiplier(
                twice_max / ((1i64 << left_shift) as f64 * output.0 as f64),
            ),
            act_min,
            act_max,
        }
    }

    #[inline]
    fn lift(&self, q: i32, offset: i32, m: QuantizedMultiplier) -> i32 {
        let shifted = ((q + offset) as i64) << self.left_shift;
        let shifted = shifted.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        multiply_by_quantized_multiplier(shifted, m)
    }
}

/// Quantized broadcasting addition.
pub fn add_quantized(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    broadcast: &Broadcast,
    params: &QuantizedAddParams,
) -> Result<(), TensorError> {
    expect_quantized("add", lhs.dtype())?;
    expect_dtype("add", rhs.dtype(), lhs.dtype())?;
    broadcast.for_each(|o, l, r| {
        let a = params.lift(load_i32(lhs, l), params.lhs_offset, params.lhs_multiplier);
        let b = params.lift(load_i32(rhs, r), params.rhs_offset, params.rhs_multiplier);
        let sum = a.saturating_add(b);
        let v = multiply_by_quantized_multiplier(sum, params.output_multiplier) + params.output_offset;
        store_i32(output, o, v.clamp(params.act_min, params.act_max));
    });
    Ok(())
}

// ── Quantized mul ──────────────────────────────────────────────

/// Fixed-point parameters for quantized multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedMulParams {
    pub lhs_offset: i32,
    pub rhs_offset: i32,
    pub output_offset: i32,
    pub multiplier: QuantizedMultiplier,
    pub act_min: i32,
    pub act_max: i32,
}

impl QuantizedMulParams {
    pub fn new(
        lhs: (f32, i32),
        rhs: (f32, i32),
        output: (f32, i32),
        dtype: DType,
        activation: FusedActivation,
    ) -> Self {
        let (act_min, act_max) = activation_range_quantized(activation, dtype, output.0, output.1);
        Self {
            lhs_offset: -lhs.1,
            rhs_offset: -rhs.1,
            output_offset: output.1,
            multiplier: quantize_multiplier(lhs.0 as f64 * rhs.0 as f64 / output.0 as f64),
            act_min,
            act_max,
        }
    }
}

/// Quantized broadcasting multiplication.
pub fn mul_quantized(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    broadcast: &Broadcast,
    params: &QuantizedMulParams,
) -> Result<(), TensorError> {
    expect_quantized("mul", lhs.dtype())?;
    expect_dtype("mul", rhs.dtype(), lhs.dtype())?;
    broadcast.for_each(|o, l, r| {
        let a = load_i32(lhs, l) + params.lhs_offset;
        let b = load_i32(rhs, r) + params.rhs_offset;
        let v = multiply_by_quantized_multiplier(a.saturating_mul(b), params.multiplier)
            + params.output_offset;
        store_i32(output, o, v.clamp(params.act_min, params.act_max));
    });
    Ok(())
}
