// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data movement: copies, axis permutations and strided slices.
//!
//! These kernels move whole elements as bytes and therefore work for every
//! element type.

use super::expect_same_count;
use crate::{Shape, TensorError, TensorView, TensorViewMut, MAX_RANK};

fn contiguous_strides(dims: &[usize]) -> [usize; MAX_RANK] {
    let mut strides = [0usize; MAX_RANK];
    let mut running = 1usize;
    for i in (0..dims.len()).rev() {
        strides[i] = running;
        running *= dims[i];
    }
    strides
}

/// Copies the bytes of `input` into `output` (reshape).
pub fn copy(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> Result<(), TensorError> {
    let src = input.as_bytes();
    let dst = output.as_bytes_mut();
    if src.len() != dst.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: dst.len(),
            actual: src.len(),
        });
    }
    dst.copy_from_slice(src);
    Ok(())
}

/// Permutes axes: output axis `i` is input axis `perm[i]`.
pub fn transpose(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    perm: &[usize],
) -> Result<(), TensorError> {
    let in_dims = input.dims();
    let rank = in_dims.len();
    if rank > MAX_RANK {
        return Err(TensorError::RankTooLarge { rank, max: MAX_RANK });
    }
    let mut seen = [false; MAX_RANK];
    let valid = perm.len() == rank
        && perm.iter().all(|&p| p < rank && !std::mem::replace(&mut seen[p], true));
    if !valid {
        return Err(TensorError::InvalidPermutation {
            perm: perm.to_vec(),
            rank,
        });
    }
    expect_same_count("transpose", in_dims, output.dims())?;

    let in_strides = contiguous_strides(in_dims);
    let mut out_dims = [1usize; MAX_RANK];
    let mut src_strides = [0usize; MAX_RANK];
    for (i, &p) in perm.iter().enumerate() {
        out_dims[i] = in_dims[p];
        src_strides[i] = in_strides[p];
    }
    let elem = input.dtype().size_bytes();
    let src = input.as_bytes();
    let dst = output.as_bytes_mut();
    let n = input.num_elements();
    let mut idx = [0usize; MAX_RANK];
    let mut offset = 0usize;
    for o in 0..n {
        dst[o * elem..(o + 1) * elem].copy_from_slice(&src[offset * elem..(offset + 1) * elem]);
        let mut axis = rank;
        while axis > 0 {
            axis -= 1;
            idx[axis] += 1;
            offset += src_strides[axis];
            if idx[axis] < out_dims[axis] {
                break;
            }
            offset -= src_strides[axis] * out_dims[axis];
            idx[axis] = 0;
        }
    }
    Ok(())
}

/// Resolved selection along one input axis: `count` elements starting at
/// `start`, advancing by `step` (which may be negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceAxis {
    pub start: usize,
    pub step: isize,
    pub count: usize,
}

/// Gathers the elements selected by `axes` (one entry per input axis) in
/// row-major order into `output`.
pub fn strided_slice(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    axes: &[SliceAxis],
) -> Result<(), TensorError> {
    let in_dims = input.dims();
    let rank = in_dims.len();
    if rank > MAX_RANK {
        return Err(TensorError::RankTooLarge { rank, max: MAX_RANK });
    }
    let selected: usize = axes.iter().map(|a| a.count).product();
    if axes.len() != rank || selected != output.num_elements() {
        return Err(TensorError::ShapeMismatch {
            op: "strided_slice",
            lhs: Shape::from(in_dims),
            rhs: Shape::from(output.dims()),
        });
    }
    for (axis, a) in axes.iter().enumerate() {
        let last = a.start as isize + a.step * (a.count as isize - 1);
        if a.count > 0 && (a.start >= in_dims[axis] || last < 0 || last as usize >= in_dims[axis]) {
            return Err(TensorError::ShapeMismatch {
                op: "strided_slice",
                lhs: Shape::from(in_dims),
                rhs: Shape::from(output.dims()),
            });
        }
    }
    if selected == 0 {
        return Ok(());
    }

    let strides = contiguous_strides(in_dims);
    let elem = input.dtype().size_bytes();
    let src = input.as_bytes();
    let dst = output.as_bytes_mut();
    let mut idx = [0usize; MAX_RANK];
    let start: isize = axes
        .iter()
        .zip(&strides)
        .map(|(a, &s)| (a.start * s) as isize)
        .sum();
    let mut offset = start;
    for o in 0..selected {
        let at = offset as usize;
        dst[o * elem..(o + 1) * elem].copy_from_slice(&src[at * elem..(at + 1) * elem]);
        let mut axis = rank;
        while axis > 0 {
            axis -= 1;
            let step = axes[axis].step * strides[axis] as isize;
            idx[axis] += 1;
            offset += step;
            if idx[axis] < axes[axis].count {
                break;
            }
            offset -= step * axes[axis].count as isize;
            idx[axis] = 0;
        }
    }
    Ok(())
}
