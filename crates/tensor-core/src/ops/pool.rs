// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Average and max pooling over 2-D windows.

use super::{expect_dtype, expect_quantized, expect_rank, load_i32, store_i32};
use crate::{DType, FusedActivation, Layout, TensorError, TensorView, TensorViewMut};

/// Which reduction a pooling window applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Average,
    Max,
}

/// Window size, stride and leading padding of a pooling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub filter_h: usize,
    pub filter_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

/// Clipped window `[start, end)` along one axis. Padding never counts as
/// an element of the window.
#[inline]
fn window(out: usize, stride: usize, pad: usize, filter: usize, extent: usize) -> (usize, usize) {
    let origin = (out * stride) as isize - pad as isize;
    let start = origin.max(0) as usize;
    let end = (origin + filter as isize).clamp(0, extent as isize) as usize;
    (start.min(end), end)
}

fn for_each_window<F>(input_dims: &[usize], output_dims: &[usize], layout: Layout, geo: &PoolGeometry, mut f: F)
where
    F: FnMut(usize, &mut dyn Iterator<Item = usize>),
{
    let ie = layout.extent(input_dims);
    let oe = layout.extent(output_dims);
    for b in 0..oe.batch {
        for oy in 0..oe.height {
            let (y0, y1) = window(oy, geo.stride_h, geo.pad_top, geo.filter_h, ie.height);
            for ox in 0..oe.width {
                let (x0, x1) = window(ox, geo.stride_w, geo.pad_left, geo.filter_w, ie.width);
                for c in 0..oe.depth {
                    let mut taps = (y0..y1)
                        .flat_map(move |y| (x0..x1).map(move |x| (y, x)))
                        .map(|(y, x)| layout.offset(&ie, b, y, x, c));
                    f(layout.offset(&oe, b, oy, ox, c), &mut taps);
                }
            }
        }
    }
}

/// Floating-point pooling. Averages divide by the number of in-bounds
/// elements of each window.
pub fn pool_f32(
    kind: PoolKind,
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &PoolGeometry,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype("pool", input.dtype(), DType::F32)?;
    expect_dtype("pool", output.dtype(), DType::F32)?;
    expect_rank("pool", input.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    for_each_window(input.dims(), &out_dims, layout, geo, |o, taps| {
        let v = match kind {
            PoolKind::Average => {
                let (sum, count) = taps.fold((0.0f32, 0usize), |(s, n), i| {
                    (s + input.get::<f32>(i), n + 1)
                });
                if count == 0 {
                    0.0
                } else {
                    sum / count as f32
                }
            }
            PoolKind::Max => taps
                .map(|i| input.get::<f32>(i))
                .fold(f32::NEG_INFINITY, f32::max),
        };
        output.set(o, activation.apply(v));
    });
    Ok(())
}

/// Quantized pooling. Input and output share quantization, so no rescale
/// is needed; the result is clamped to `[act_min, act_max]`.
pub fn pool_quantized(
    kind: PoolKind,
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &PoolGeometry,
    act_min: i32,
    act_max: i32,
) -> Result<(), TensorError> {
    expect_quantized("pool", input.dtype())?;
    expect_dtype("pool", output.dtype(), input.dtype())?;
    expect_rank("pool", input.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    for_each_window(input.dims(), &out_dims, layout, geo, |o, taps| {
        let v = match kind {
            PoolKind::Average => {
                let (acc, count) = taps.fold((0i32, 0i32), |(s, n), i| (s + load_i32(input, i), n + 1));
                if count == 0 {
                    0
                } else if acc >= 0 {
                    (acc + count / 2) / count
                } else {
                    (acc - count / 2) / count
                }
            }
            PoolKind::Max => taps.map(|i| load_i32(input, i)).max().unwrap_or(act_min),
        };
        store_i32(output, o, v.clamp(act_min, act_max));
    });
    Ok(())
}
