// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule for mean reduction over constant axes.

use tensor_core::{DType, Dim, Shape};

use super::{constant_ints, expect_dtype_in, invalid, operand, InferError, OutputRule};
use crate::{Node, NodeOptions, OpKind, TensorDef};

/// Marks the reduced axes of a rank-`rank` tensor. Negative axes count
/// from the back; repeated axes are allowed.
pub fn reduction_mask(rank: usize, axes: &[i64]) -> Result<Vec<bool>, InferError> {
    let mut mask = vec![false; rank];
    for &a in axes {
        let resolved = if a < 0 { a + rank as i64 } else { a };
        if resolved < 0 || resolved >= rank as i64 {
            return Err(invalid(format!("axis {a} out of range for rank {rank}")));
        }
        mask[resolved as usize] = true;
    }
    Ok(mask)
}

/// Operands: `[input, axes]`.
pub(super) fn mean(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let keep_dims = match &node.options {
        NodeOptions::Reducer(o) => o.keep_dims,
        _ => return Err(invalid("mean requires reducer options")),
    };
    let input = operand(inputs, 0, "input")?;
    expect_dtype_in(input, &[DType::F32, DType::U8, DType::I8, DType::I16], OpKind::Mean)?;
    let axes = constant_ints(operand(inputs, 1, "axes")?, "axes")?;
    let mask = reduction_mask(input.info.shape.rank(), &axes)?;

    let dims: Vec<Dim> = input
        .info
        .shape
        .dims()
        .iter()
        .zip(&mask)
        .filter_map(|(&d, &reduced)| match (reduced, keep_dims) {
            (false, _) => Some(d),
            (true, true) => Some(Dim::Known(1)),
            (true, false) => None,
        })
        .collect();
    Ok(OutputRule::inherit(Shape::from_dims(dims), &input.info))
}
