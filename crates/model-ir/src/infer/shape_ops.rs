// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rules for data-movement operations: reshape, transpose, strided slice
//! and layout permutation. None of them changes element type or
//! quantization.

use tensor_core::ops::SliceAxis;
use tensor_core::{Dim, Shape};

use super::{constant_ints, expect_rank, invalid, operand, InferError, OutputRule};
use crate::{Node, NodeOptions, StridedSliceOptions, TensorDef};

// ── Reshape ────────────────────────────────────────────────────────

/// Operands: `[input, shape?]`. Without a shape operand the target comes
/// from the `new_shape` option. One `-1` entry is inferred from the
/// element count.
pub(super) fn reshape(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let input = operand(inputs, 0, "input")?;
    let target = match (inputs.get(1), &node.options) {
        (Some(shape), _) => constant_ints(shape, "shape")?,
        (None, NodeOptions::Reshape(o)) => o
            .new_shape
            .clone()
            .ok_or_else(|| invalid("reshape needs a shape operand or new_shape option"))?,
        (None, _) => return Err(invalid("reshape needs a shape operand or new_shape option")),
    };
    let shape = resolve_reshape(&input.info.shape, &target)?;
    Ok(OutputRule::inherit(shape, &input.info))
}

fn resolve_reshape(input: &Shape, target: &[i64]) -> Result<Shape, InferError> {
    let mut wildcard = None;
    let mut known = 1usize;
    for (i, &d) in target.iter().enumerate() {
        match d {
            -1 if wildcard.is_none() => wildcard = Some(i),
            -1 => return Err(invalid(format!("reshape target {target:?} has several -1 entries"))),
            d if d < 0 => return Err(invalid(format!("reshape target {target:?} has negative extent"))),
            d => known *= d as usize,
        }
    }
    let total = input.num_elements();
    let mut dims: Vec<Dim> = target
        .iter()
        .map(|&d| if d < 0 { Dim::Unknown } else { Dim::Known(d as usize) })
        .collect();
    match (wildcard, total) {
        (Some(i), Some(n)) => {
            if known == 0 || n % known != 0 {
                return Err(invalid(format!(
                    "cannot reshape {input} ({n} elements) into {target:?}"
                )));
            }
            dims[i] = Dim::Known(n / known);
        }
        (None, Some(n)) if n != known => {
            return Err(invalid(format!(
                "cannot reshape {input} ({n} elements) into {target:?}"
            )));
        }
        _ => {}
    }
    Ok(Shape::from_dims(dims))
}

// ── Transpose ──────────────────────────────────────────────────────

/// Operands: `[input, perm]`; output axis `i` is input axis `perm[i]`.
pub(super) fn transpose(inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let input = operand(inputs, 0, "input")?;
    let perm = constant_ints(operand(inputs, 1, "perm")?, "perm")?;
    let perm = permutation(&perm, input.info.shape.rank())?;
    let dims = perm.iter().map(|&p| input.info.shape.dims()[p]).collect();
    Ok(OutputRule::inherit(Shape::from_dims(dims), &input.info))
}

/// Validates a permutation of `rank` axes.
pub fn permutation(values: &[i64], rank: usize) -> Result<Vec<usize>, InferError> {
    let mut seen = vec![false; rank];
    let mut perm = Vec::with_capacity(rank);
    for &v in values {
        let ok = v >= 0 && (v as usize) < rank && !seen[v as usize];
        if !ok {
            return Err(invalid(format!("{values:?} is not a permutation of {rank} axes")));
        }
        seen[v as usize] = true;
        perm.push(v as usize);
    }
    if perm.len() != rank {
        return Err(invalid(format!("{values:?} is not a permutation of {rank} axes")));
    }
    Ok(perm)
}

// ── Permute ────────────────────────────────────────────────────────

pub(super) fn permute(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let NodeOptions::Permute(o) = &node.options else {
        return Err(invalid("permute requires layout options"));
    };
    let input = operand(inputs, 0, "input")?;
    expect_rank(input, 4)?;
    let shape = o.from.permute_shape(&input.info.shape, o.to);
    Ok(OutputRule::inherit(shape, &input.info))
}

// ── Strided slice ──────────────────────────────────────────────────

/// Selection along one input axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAxis {
    /// First selected index (meaningful when `count > 0`).
    pub start: i64,
    pub step: i64,
    /// Number of selected indices; `None` while the extent is unknown.
    pub count: Option<usize>,
}

/// Per-input-axis selection plus the output extents after new-axis
/// insertion and shrinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceResolution {
    pub axes: Vec<ResolvedAxis>,
    pub output: Vec<Dim>,
}

impl SliceResolution {
    /// Kernel-ready axes, once every count is known.
    pub fn slice_axes(&self) -> Option<Vec<SliceAxis>> {
        self.axes
            .iter()
            .map(|a| {
                a.count.map(|count| SliceAxis {
                    start: if count == 0 { 0 } else { a.start as usize },
                    step: a.step as isize,
                    count,
                })
            })
            .collect()
    }
}

enum Entry {
    Ellipsis,
    NewAxis,
    Range { index: usize },
}

/// Resolves begin/end/strides and the five masks against `dims`.
///
/// Entry `i` of the operands addresses one input axis, unless bit `i` of
/// `ellipsis_mask` (expand to all remaining axes) or `new_axis_mask`
/// (insert a unit output axis) is set. Axes not addressed by any entry are
/// selected in full.
pub fn resolve_strided_slice(
    dims: &[Dim],
    begin: &[i64],
    end: &[i64],
    strides: &[i64],
    masks: &StridedSliceOptions,
) -> Result<SliceResolution, InferError> {
    let n = begin.len();
    if end.len() != n || strides.len() != n {
        return Err(invalid(format!(
            "begin/end/strides lengths differ: {} / {} / {}",
            n,
            end.len(),
            strides.len()
        )));
    }
    let bit = |mask: i32, i: usize| i < 32 && (mask >> i) & 1 == 1;
    if (0..n).filter(|&i| bit(masks.ellipsis_mask, i)).count() > 1 {
        return Err(invalid("at most one ellipsis is allowed"));
    }

    let entries: Vec<Entry> = (0..n)
        .map(|i| {
            if bit(masks.ellipsis_mask, i) {
                Entry::Ellipsis
            } else if bit(masks.new_axis_mask, i) {
                Entry::NewAxis
            } else {
                Entry::Range { index: i }
            }
        })
        .collect();
    let addressed = entries
        .iter()
        .filter(|e| matches!(e, Entry::Range { .. }))
        .count();
    let rank = dims.len();
    if addressed > rank {
        return Err(invalid(format!(
            "{addressed} sliced axes exceed input rank {rank}"
        )));
    }

    let full = |d: Dim| ResolvedAxis {
        start: 0,
        step: 1,
        count: d.known(),
    };
    let mut axes = Vec::with_capacity(rank);
    let mut output = Vec::with_capacity(rank + n);
    let mut axis = 0usize;
    for entry in entries {
        match entry {
            Entry::Ellipsis => {
                for _ in 0..rank - addressed {
                    axes.push(full(dims[axis]));
                    output.push(dims[axis]);
                    axis += 1;
                }
            }
            Entry::NewAxis => output.push(Dim::Known(1)),
            Entry::Range { index } => {
                let shrink = bit(masks.shrink_axis_mask, index);
                let resolved = resolve_axis(
                    dims[axis],
                    begin[index],
                    end[index],
                    strides[index],
                    bit(masks.begin_mask, index),
                    bit(masks.end_mask, index),
                    shrink,
                )?;
                if !shrink {
                    output.push(resolved.count.map_or(Dim::Unknown, Dim::Known));
                }
                axes.push(resolved);
                axis += 1;
            }
        }
    }
    while axis < rank {
        axes.push(full(dims[axis]));
        output.push(dims[axis]);
        axis += 1;
    }
    Ok(SliceResolution { axes, output })
}

fn resolve_axis(
    dim: Dim,
    begin: i64,
    end: i64,
    stride: i64,
    begin_masked: bool,
    end_masked: bool,
    shrink: bool,
) -> Result<ResolvedAxis, InferError> {
    if stride == 0 {
        return Err(invalid("strided slice stride must be non-zero"));
    }
    let Some(extent) = dim.known() else {
        let count = if shrink { Some(1) } else { None };
        return Ok(ResolvedAxis {
            start: begin.max(0),
            step: stride,
            count,
        });
    };
    let extent = extent as i64;

    if shrink {
        let index = if begin < 0 { begin + extent } else { begin };
        if index < 0 || index >= extent {
            return Err(invalid(format!(
                "shrink index {begin} out of range for extent {extent}"
            )));
        }
        return Ok(ResolvedAxis {
            start: index,
            step: 1,
            count: Some(1),
        });
    }

    let normalize = |v: i64| if v < 0 { v + extent } else { v };
    let (start, stop) = if stride > 0 {
        let start = if begin_masked { 0 } else { normalize(begin).clamp(0, extent) };
        let stop = if end_masked { extent } else { normalize(end).clamp(0, extent) };
        (start, stop)
    } else {
        let start = if begin_masked {
            extent - 1
        } else {
            normalize(begin).clamp(-1, extent - 1)
        };
        let stop = if end_masked { -1 } else { normalize(end).clamp(-1, extent - 1) };
        (start, stop)
    };
    let span = if stride > 0 { stop - start } else { start - stop };
    let step = stride.abs();
    let count = if span <= 0 { 0 } else { (span + step - 1) / step };
    Ok(ResolvedAxis {
        start,
        step: stride,
        count: Some(count as usize),
    })
}

/// Operands: `[input, begin, end, strides]`, all index operands constant.
pub(super) fn strided_slice(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let NodeOptions::StridedSlice(masks) = &node.options else {
        return Err(invalid("strided_slice requires mask options"));
    };
    let input = operand(inputs, 0, "input")?;
    let begin = constant_ints(operand(inputs, 1, "begin")?, "begin")?;
    let end = constant_ints(operand(inputs, 2, "end")?, "end")?;
    let strides = constant_ints(operand(inputs, 3, "strides")?, "strides")?;
    let resolved = resolve_strided_slice(input.info.shape.dims(), &begin, &end, &strides, masks)?;
    Ok(OutputRule::inherit(Shape::from_dims(resolved.output), &input.info))
}
