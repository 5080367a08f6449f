// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Mean reduction over a set of axes.

use super::{expect_dtype, expect_quantized, load_i32, store_i32};
use crate::{dequantize, quantize_value, DType, Shape, TensorError, TensorView, TensorViewMut, MAX_RANK};

/// Splits the input axes into kept (outer) and reduced (inner) groups.
struct ReducePlan {
    kept_dims: [usize; MAX_RANK],
    kept_strides: [usize; MAX_RANK],
    kept: usize,
    red_dims: [usize; MAX_RANK],
    red_strides: [usize; MAX_RANK],
    reduced: usize,
}

impl ReducePlan {
    fn new(dims: &[usize], reduce: &[bool]) -> Result<Self, TensorError> {
        if dims.len() > MAX_RANK {
            return Err(TensorError::RankTooLarge {
                rank: dims.len(),
                max: MAX_RANK,
            });
        }
        if reduce.len() != dims.len() {
            return Err(TensorError::ShapeMismatch {
                op: "mean",
                lhs: Shape::from(dims),
                rhs: Shape::vector(reduce.len()),
            });
        }
        let mut plan = Self {
            kept_dims: [1; MAX_RANK],
            kept_strides: [0; MAX_RANK],
            kept: 0,
            red_dims: [1; MAX_RANK],
            red_strides: [0; MAX_RANK],
            reduced: 0,
        };
        let mut stride = 1usize;
        let mut strides = [0usize; MAX_RANK];
        for i in (0..dims.len()).rev() {
            strides[i] = stride;
            stride *= dims[i];
        }
        for (i, &d) in dims.iter().enumerate() {
            if reduce[i] {
                plan.red_dims[plan.reduced] = d;
                plan.red_strides[plan.reduced] = strides[i];
                plan.reduced += 1;
            } else {
                plan.kept_dims[plan.kept] = d;
                plan.kept_strides[plan.kept] = strides[i];
                plan.kept += 1;
            }
        }
        Ok(plan)
    }

    fn outputs(&self) -> usize {
        self.kept_dims[..self.kept].iter().product()
    }

    fn window(&self) -> usize {
        self.red_dims[..self.reduced].iter().product()
    }

    /// Calls `f(out_index, input_offsets)` for every output element.
    fn for_each(&self, mut f: impl FnMut(usize, &mut dyn Iterator<Item = usize>)) {
        let mut outer = [0usize; MAX_RANK];
        let mut base = 0usize;
        for o in 0..self.outputs() {
            let mut inner = Odometer::new(&self.red_dims[..self.reduced], &self.red_strides, base);
            f(o, &mut inner);
            advance(&mut outer, &mut base, &self.kept_dims[..self.kept], &self.kept_strides);
        }
    }
}

fn advance(idx: &mut [usize; MAX_RANK], offset: &mut usize, dims: &[usize], strides: &[usize; MAX_RANK]) {
    let mut axis = dims.len();
    while axis > 0 {
        axis -= 1;
        idx[axis] += 1;
        *offset += strides[axis];
        if idx[axis] < dims[axis] {
            return;
        }
        *offset -= strides[axis] * dims[axis];
        idx[axis] = 0;
    }
}

/// Iterates the flat offsets of a sub-grid.
struct Odometer<'a> {
    dims: &'a [usize],
    strides: &'a [usize; MAX_RANK],
    idx: [usize; MAX_RANK],
    offset: usize,
    remaining: usize,
}

impl<'a> Odometer<'a> {
    fn new(dims: &'a [usize], strides: &'a [usize; MAX_RANK], base: usize) -> Self {
        Self {
            dims,
            strides,
            idx: [0; MAX_RANK],
            offset: base,
            remaining: dims.iter().product(),
        }
    }
}

impl Iterator for Odometer<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offset;
        advance(&mut self.idx, &mut self.offset, self.dims, self.strides);
        Some(current)
    }
}

fn check_output(input: &TensorView<'_>, output: &TensorViewMut<'_>, plan: &ReducePlan) -> Result<(), TensorError> {
    if output.num_elements() != plan.outputs() {
        return Err(TensorError::ShapeMismatch {
            op: "mean",
            lhs: Shape::from(input.dims()),
            rhs: Shape::from(output.dims()),
        });
    }
    Ok(())
}

/// Averages `input` over every axis flagged in `reduce`.
///
/// `output` may keep the reduced axes as size-1 dimensions or drop them;
/// only its element count is checked.
pub fn mean_f32(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    reduce: &[bool],
) -> Result<(), TensorError> {
    expect_dtype("mean", input.dtype(), DType::F32)?;
    expect_dtype("mean", output.dtype(), DType::F32)?;
    let plan = ReducePlan::new(input.dims(), reduce)?;
    check_output(input, output, &plan)?;
    let count = plan.window().max(1) as f32;
    plan.for_each(|o, taps| {
        let sum: f32 = taps.map(|i| input.get::<f32>(i)).sum();
        output.set(o, sum / count);
    });
    Ok(())
}

/// Quantized mean evaluated in real arithmetic.
pub fn mean_quantized(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    reduce: &[bool],
    input_q: (f32, i32),
    output_q: (f32, i32),
) -> Result<(), TensorError> {
    expect_quantized("mean", input.dtype())?;
    expect_quantized("mean", output.dtype())?;
    let plan = ReducePlan::new(input.dims(), reduce)?;
    check_output(input, output, &plan)?;
    let count = plan.window().max(1) as f32;
    let dtype = output.dtype();
    plan.for_each(|o, taps| {
        let sum: f32 = taps
            .map(|i| dequantize(load_i32(input, i), input_q.0, input_q.1))
            .sum();
        store_i32(output, o, quantize_value(sum / count, output_q.0, output_q.1, dtype));
    });
    Ok(())
}
