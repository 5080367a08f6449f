// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution family: regular, depthwise and transposed.
//!
//! Activations follow the caller's [`Layout`]. Filters are always stored
//! `[out_channels, kh, kw, in_channels]` for regular and transposed
//! convolution, and `[1, kh, kw, out_channels]` for depthwise convolution.

use std::ops::AddAssign;

use super::{
    expect_dtype, expect_quantized, expect_rank, load_i32, mac_i64, store_i32, store_rescaled_i64,
    QuantizedConvParams,
};
use crate::{
    multiply_by_quantized_multiplier, DType, FusedActivation, Layout, TensorError, TensorView,
    TensorViewMut,
};

/// Stride, dilation and leading padding of a 2-D window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

impl Default for ConvGeometry {
    fn default() -> Self {
        Self {
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            pad_top: 0,
            pad_left: 0,
        }
    }
}

impl ConvGeometry {
    /// Input coordinate touched by output `out` and filter tap `k`,
    /// or `None` when it falls into padding.
    #[inline]
    fn input_y(&self, out: usize, k: usize, height: usize) -> Option<usize> {
        tap(out, k, self.stride_h, self.dilation_h, self.pad_top, height)
    }

    #[inline]
    fn input_x(&self, out: usize, k: usize, width: usize) -> Option<usize> {
        tap(out, k, self.stride_w, self.dilation_w, self.pad_left, width)
    }
}

#[inline]
fn tap(out: usize, k: usize, stride: usize, dilation: usize, pad: usize, extent: usize) -> Option<usize> {
    let pos = (out * stride + k * dilation).checked_sub(pad)?;
    (pos < extent).then_some(pos)
}

// ── Regular convolution ────────────────────────────────────────

/// Visits every (output position, accumulated value) of a regular convolution.
fn conv2d_accumulate<T, A, F>(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    output_dims: &[usize],
    layout: Layout,
    geo: &ConvGeometry,
    mut mac: A,
    mut emit: F,
) where
    T: Copy + Default + AddAssign,
    A: FnMut(usize, usize, usize) -> T,
    F: FnMut(usize, usize, T),
{
    let ie = layout.extent(input.dims());
    let oe = layout.extent(output_dims);
    let fd = filter.dims();
    let (kh, kw, ic) = (fd[1], fd[2], fd[3]);
    for b in 0..oe.batch {
        for oy in 0..oe.height {
            for ox in 0..oe.width {
                for oc in 0..oe.depth {
                    let mut acc = T::default();
                    for ky in 0..kh {
                        let Some(iy) = geo.input_y(oy, ky, ie.height) else { continue };
                        for kx in 0..kw {
                            let Some(ix) = geo.input_x(ox, kx, ie.width) else { continue };
                            for c in 0..ic {
                                let in_idx = layout.offset(&ie, b, iy, ix, c);
                                let f_idx = ((oc * kh + ky) * kw + kx) * ic + c;
                                acc += mac(in_idx, f_idx, oc);
                            }
                        }
                    }
                    emit(layout.offset(&oe, b, oy, ox, oc), oc, acc);
                }
            }
        }
    }
}

/// Floating-point 2-D convolution with optional bias and fused activation.
pub fn conv2d_f32(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &ConvGeometry,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype("conv2d", input.dtype(), DType::F32)?;
    expect_dtype("conv2d", filter.dtype(), DType::F32)?;
    expect_rank("conv2d", input.dims(), 4)?;
    expect_rank("conv2d", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    conv2d_accumulate(
        input,
        filter,
        &out_dims,
        layout,
        geo,
        |i, f, _| input.get::<f32>(i) * filter.get::<f32>(f),
        |o, oc, acc| {
            let bias = bias.map_or(0.0, |b| b.get::<f32>(oc));
            output.set(o, activation.apply(acc + bias));
        },
    );
    Ok(())
}

/// Quantized 2-D convolution. Accumulates in 32-bit integers and rescales
/// per output channel; 16-bit activations accumulate in 64 bits with a
/// 64-bit bias.
pub fn conv2d_quantized(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &ConvGeometry,
    params: &QuantizedConvParams<'_>,
) -> Result<(), TensorError> {
    expect_quantized("conv2d", input.dtype())?;
    expect_quantized("conv2d", filter.dtype())?;
    expect_rank("conv2d", input.dims(), 4)?;
    expect_rank("conv2d", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    if input.dtype() == DType::I16 {
        conv2d_accumulate(
            input,
            filter,
            &out_dims,
            layout,
            geo,
            |i, f, oc| mac_i64(input, filter, params, i, f, oc),
            |o, oc, acc| store_rescaled_i64(output, bias, params, o, oc, acc),
        );
        return Ok(());
    }
    conv2d_accumulate(
        input,
        filter,
        &out_dims,
        layout,
        geo,
        |i, f, oc| {
            let x = load_i32(input, i) + params.input_offset;
            let w = load_i32(filter, f) + params.filter_offset(oc);
            x * w
        },
        |o, oc, acc| {
            let mut acc = acc + bias.map_or(0, |b| load_i32(b, oc));
            acc = multiply_by_quantized_multiplier(acc, params.multiplier(oc));
            acc += params.output_offset;
            store_i32(output, o, acc.clamp(params.act_min, params.act_max));
        },
    );
    Ok(())
}

// ── Depthwise convolution ──────────────────────────────────────

fn depthwise_accumulate<T, A, F>(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    output_dims: &[usize],
    layout: Layout,
    geo: &ConvGeometry,
    mut mac: A,
    mut emit: F,
) where
    T: Copy + Default + AddAssign,
    A: FnMut(usize, usize, usize) -> T,
    F: FnMut(usize, usize, T),
{
    let ie = layout.extent(input.dims());
    let oe = layout.extent(output_dims);
    let fd = filter.dims();
    let (kh, kw) = (fd[1], fd[2]);
    let multiplier = (oe.depth / ie.depth.max(1)).max(1);
    for b in 0..oe.batch {
        for oy in 0..oe.height {
            for ox in 0..oe.width {
                for oc in 0..oe.depth {
                    let ic = oc / multiplier;
                    let mut acc = T::default();
                    for ky in 0..kh {
                        let Some(iy) = geo.input_y(oy, ky, ie.height) else { continue };
                        for kx in 0..kw {
                            let Some(ix) = geo.input_x(ox, kx, ie.width) else { continue };
                            let in_idx = layout.offset(&ie, b, iy, ix, ic);
                            let f_idx = (ky * kw + kx) * oe.depth + oc;
                            acc += mac(in_idx, f_idx, oc);
                        }
                    }
                    emit(layout.offset(&oe, b, oy, ox, oc), oc, acc);
                }
            }
        }
    }
}

/// Floating-point depthwise convolution. Output channel `oc` reads input
/// channel `oc / depth_multiplier`.
pub fn depthwise_conv2d_f32(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &ConvGeometry,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype("depthwise_conv2d", input.dtype(), DType::F32)?;
    expect_dtype("depthwise_conv2d", filter.dtype(), DType::F32)?;
    expect_rank("depthwise_conv2d", input.dims(), 4)?;
    expect_rank("depthwise_conv2d", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    depthwise_accumulate(
        input,
        filter,
        &out_dims,
        layout,
        geo,
        |i, f, _| input.get::<f32>(i) * filter.get::<f32>(f),
        |o, oc, acc| {
            let bias = bias.map_or(0.0, |b| b.get::<f32>(oc));
            output.set(o, activation.apply(acc + bias));
        },
    );
    Ok(())
}

/// Quantized depthwise convolution with per-tensor or per-channel weights.
pub fn depthwise_conv2d_quantized(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &ConvGeometry,
    params: &QuantizedConvParams<'_>,
) -> Result<(), TensorError> {
    expect_quantized("depthwise_conv2d", input.dtype())?;
    expect_quantized("depthwise_conv2d", filter.dtype())?;
    expect_rank("depthwise_conv2d", input.dims(), 4)?;
    expect_rank("depthwise_conv2d", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    if input.dtype() == DType::I16 {
        depthwise_accumulate(
            input,
            filter,
            &out_dims,
            layout,
            geo,
            |i, f, oc| mac_i64(input, filter, params, i, f, oc),
            |o, oc, acc| store_rescaled_i64(output, bias, params, o, oc, acc),
        );
        return Ok(());
    }
    depthwise_accumulate(
        input,
        filter,
        &out_dims,
        layout,
        geo,
        |i, f, oc| {
            let x = load_i32(input, i) + params.input_offset;
            let w = load_i32(filter, f) + params.filter_offset(oc);
            x * w
        },
        |o, oc, acc| {
            let mut acc = acc + bias.map_or(0, |b| load_i32(b, oc));
            acc = multiply_by_quantized_multiplier(acc, params.multiplier(oc));
            acc += params.output_offset;
            store_i32(output, o, acc.clamp(params.act_min, params.act_max));
        },
    );
    Ok(())
}

// ── Transposed convolution ─────────────────────────────────────

/// Scatters every `input x filter` product into the output positions it
/// contributes to.
fn transpose_scatter<S>(
    input_dims: &[usize],
    filter_dims: &[usize],
    output_dims: &[usize],
    layout: Layout,
    geo: &ConvGeometry,
    mut scatter: S,
) where
    S: FnMut(usize, usize, usize),
{
    let ie = layout.extent(input_dims);
    let oe = layout.extent(output_dims);
    let (kh, kw, ic_count) = (filter_dims[1], filter_dims[2], filter_dims[3]);
    for b in 0..ie.batch {
        for iy in 0..ie.height {
            for ix in 0..ie.width {
                for ic in 0..ic_count.min(ie.depth) {
                    let in_idx = layout.offset(&ie, b, iy, ix, ic);
                    for ky in 0..kh {
                        let Some(oy) = (iy * geo.stride_h + ky).checked_sub(geo.pad_top) else {
                            continue;
                        };
                        if oy >= oe.height {
                            continue;
                        }
                        for kx in 0..kw {
                            let Some(ox) = (ix * geo.stride_w + kx).checked_sub(geo.pad_left) else {
                                continue;
                            };
                            if ox >= oe.width {
                                continue;
                            }
                            for oc in 0..oe.depth {
                                let f_idx = ((oc * kh + ky) * kw + kx) * ic_count + ic;
                                scatter(in_idx, f_idx, layout.offset(&oe, b, oy, ox, oc));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Floating-point transposed convolution (the gradient of a convolution
/// with respect to its input). `output` is overwritten.
pub fn transpose_conv_f32(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    layout: Layout,
    geo: &ConvGeometry,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype("transpose_conv", input.dtype(), DType::F32)?;
    expect_dtype("transpose_conv", filter.dtype(), DType::F32)?;
    expect_rank("transpose_conv", input.dims(), 4)?;
    expect_rank("transpose_conv", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    let n = output.num_elements();
    for i in 0..n {
        output.set(i, 0.0f32);
    }
    transpose_scatter(input.dims(), filter.dims(), &out_dims, layout, geo, |i, f, o| {
        let prev: f32 = output.get(o);
        output.set(o, prev + input.get::<f32>(i) * filter.get::<f32>(f));
    });
    let oe = layout.extent(&out_dims);
    for i in 0..n {
        let oc = channel_of(layout, &oe, i);
        let v: f32 = output.get(i);
        let bias = bias.map_or(0.0, |b| b.get::<f32>(oc));
        output.set(i, activation.apply(v + bias));
    }
    Ok(())
}

/// Quantized transposed convolution. `scratch` must hold one `i32`
/// accumulator per output element.
#[allow(clippy::too_many_arguments)]
pub fn transpose_conv_quantized(
    input: &TensorView<'_>,
    filter: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    scratch: &mut [u8],
    layout: Layout,
    geo: &ConvGeometry,
    params: &QuantizedConvParams<'_>,
) -> Result<(), TensorError> {
    expect_quantized("transpose_conv", input.dtype())?;
    expect_quantized("transpose_conv", filter.dtype())?;
    expect_rank("transpose_conv", input.dims(), 4)?;
    expect_rank("transpose_conv", filter.dims(), 4)?;
    let out_dims = output.dims().to_vec();
    let n = output.num_elements();
    let mut acc = TensorViewMut::new(&out_dims, DType::I32, scratch)?;
    for i in 0..n {
        acc.set(i, 0i32);
    }
    let oe = layout.extent(&out_dims);
    transpose_scatter(input.dims(), filter.dims(), &out_dims, layout, geo, |i, f, o| {
        let oc = channel_of(layout, &oe, o);
        let x = load_i32(input, i) + params.input_offset;
        let w = load_i32(filter, f) + params.filter_offset(oc);
        let prev: i32 = acc.get(o);
        acc.set(o, prev.wrapping_add(x * w));
    });
    for i in 0..n {
        let oc = channel_of(layout, &oe, i);
        let mut v: i32 = acc.get(i);
        v += bias.map_or(0, |b| load_i32(b, oc));
        v = multiply_by_quantized_multiplier(v, params.multiplier(oc)) + params.output_offset;
        store_i32(output, i, v.clamp(params.act_min, params.act_max));
    }
    Ok(())
}

#[inline]
fn channel_of(layout: Layout, e: &crate::Extent4, flat: usize) -> usize {
    match layout {
        Layout::Nhwc => flat % e.depth.max(1),
        Layout::Nchw => (flat / (e.height * e.width).max(1)) % e.depth.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{quantize_multiplier, Tensor};

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_conv2d_valid_3x3_sum() {
        // All-ones 4x4 input, one 3x3 all-ones filter -> every output is 9.
        let input = Tensor::from_f32(vec![1, 4, 4, 1], &[1.0; 16]).unwrap();
        let filter = Tensor::from_f32(vec![1, 3, 3, 1], &[1.0; 9]).unwrap();
        let mut out = Tensor::zeros(vec![1, 2, 2, 1], DType::F32);
        conv2d_f32(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            FusedActivation::None,
        )
        .unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![9.0; 4]);
    }

    #[test]
    fn test_conv2d_same_padding_with_bias_and_relu() {
        // 3x3 input, 3x3 filter, pad 1 on each side.
        let input =
            Tensor::from_f32(vec![1, 3, 3, 1], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])
                .unwrap();
        let filter = Tensor::from_f32(vec![1, 3, 3, 1], &[1.0; 9]).unwrap();
        let bias = Tensor::from_f32(vec![1], &[-20.0]).unwrap();
        let mut out = Tensor::zeros(vec![1, 3, 3, 1], DType::F32);
        let geo = ConvGeometry {
            pad_top: 1,
            pad_left: 1,
            ..Default::default()
        };
        conv2d_f32(
            &input.view(),
            &filter.view(),
            Some(&bias.view()),
            &mut out.view_mut(),
            Layout::Nhwc,
            &geo,
            FusedActivation::Relu,
        )
        .unwrap();
        // Raw sums: corners 12,16,24,28; edges 21,27,33,39; centre 45.
        assert_eq!(
            out.to_vec::<f32>(),
            vec![0.0, 1.0, 0.0, 7.0, 25.0, 13.0, 4.0, 19.0, 8.0]
        );
    }

    #[test]
    fn test_conv2d_layouts_agree() {
        let values: Vec<f32> = (0..2 * 5 * 5).map(|v| v as f32 * 0.1).collect();
        let nhwc = Tensor::from_f32(vec![1, 5, 5, 2], &values).unwrap();
        // Reorder to NCHW.
        let mut nchw_values = vec![0.0; values.len()];
        for y in 0..5 {
            for x in 0..5 {
                for c in 0..2 {
                    nchw_values[(c * 5 + y) * 5 + x] = values[(y * 5 + x) * 2 + c];
                }
            }
        }
        let nchw = Tensor::from_f32(vec![1, 2, 5, 5], &nchw_values).unwrap();
        let filter_values: Vec<f32> = (0..3 * 2 * 2 * 2).map(|v| (v % 5) as f32 - 2.0).collect();
        let filter = Tensor::from_f32(vec![3, 2, 2, 2], &filter_values).unwrap();
        let geo = ConvGeometry {
            stride_h: 2,
            stride_w: 2,
            ..Default::default()
        };
        let mut a = Tensor::zeros(vec![1, 2, 2, 3], DType::F32);
        let mut b = Tensor::zeros(vec![1, 3, 2, 2], DType::F32);
        let none = FusedActivation::None;
        conv2d_f32(&nhwc.view(), &filter.view(), None, &mut a.view_mut(), Layout::Nhwc, &geo, none)
            .unwrap();
        conv2d_f32(&nchw.view(), &filter.view(), None, &mut b.view_mut(), Layout::Nchw, &geo, none)
            .unwrap();
        let a = a.to_vec::<f32>();
        let b = b.to_vec::<f32>();
        for y in 0..2 {
            for x in 0..2 {
                for c in 0..3 {
                    let lhs = a[(y * 2 + x) * 3 + c];
                    let rhs = b[(c * 2 + y) * 2 + x];
                    assert!((lhs - rhs).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_depthwise_multiplier_two() {
        // One input channel, depth multiplier 2, 1x1 filter scales by 2 and 3.
        let input = Tensor::from_f32(vec![1, 1, 2, 1], &[1.0, 4.0]).unwrap();
        let filter = Tensor::from_f32(vec![1, 1, 1, 2], &[2.0, 3.0]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1, 2, 2], DType::F32);
        depthwise_conv2d_f32(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            FusedActivation::None,
        )
        .unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![2.0, 3.0, 8.0, 12.0]);
    }

    #[test]
    fn test_depthwise_quantized_matches_float() {
        // u8 input with scale 0.5 zp 128, filter scale 0.25 zp 128, output scale 0.5 zp 128.
        let input = Tensor::from_slice(vec![1, 2, 2, 1], &[130u8, 132, 126, 128]).unwrap();
        let filter = Tensor::from_slice(vec![1, 2, 2, 1], &[132u8, 132, 132, 132]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1, 1, 1], DType::U8);
        let multipliers = [quantize_multiplier(0.5 * 0.25 / 0.5)];
        let params = QuantizedConvParams {
            input_offset: -128,
            filter_offsets: &[-128],
            output_offset: 128,
            multipliers: &multipliers,
            act_min: 0,
            act_max: 255,
        };
        depthwise_conv2d_quantized(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            &params,
        )
        .unwrap();
        // Real: inputs 1, 2, -1, 0; weights 1 each -> 2.0 -> q = 128 + 4.
        assert_eq!(out.to_vec::<u8>(), vec![132]);
    }

    #[test]
    fn test_conv2d_i16_accumulates_wide() {
        // 3x3x64 window of 32767 * 127 sums past i32::MAX before rescaling.
        let input = Tensor::from_slice(vec![1, 3, 3, 64], &[32767i16; 576]).unwrap();
        let filter = Tensor::from_slice(vec![2, 3, 3, 64], &[127i8; 1152]).unwrap();
        let bias = Tensor::from_slice(vec![2], &[0i64, 100_000_000]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1, 1, 2], DType::I16);
        let multipliers = [quantize_multiplier(1e-5)];
        let params = QuantizedConvParams {
            input_offset: 0,
            filter_offsets: &[0],
            output_offset: 0,
            multipliers: &multipliers,
            act_min: i16::MIN as i32,
            act_max: i16::MAX as i32,
        };
        conv2d_quantized(
            &input.view(),
            &filter.view(),
            Some(&bias.view()),
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            &params,
        )
        .unwrap();
        assert_eq!(out.to_vec::<i16>(), vec![23970, 24970]);
    }

    #[test]
    fn test_depthwise_i16_accumulates_wide() {
        let input = Tensor::from_slice(vec![1, 2, 2, 1], &[-32768i16, -32768, -32768, -32768]).unwrap();
        let filter = Tensor::from_slice(vec![1, 2, 2, 1], &[-128i8, -128, -128, -128]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1, 1, 1], DType::I16);
        let multipliers = [quantize_multiplier(1.0 / 1024.0)];
        let params = QuantizedConvParams {
            input_offset: 0,
            filter_offsets: &[0],
            output_offset: 0,
            multipliers: &multipliers,
            act_min: i16::MIN as i32,
            act_max: i16::MAX as i32,
        };
        depthwise_conv2d_quantized(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            &params,
        )
        .unwrap();
        // 4 * 2^22 / 2^10 = 2^14.
        assert_eq!(out.to_vec::<i16>(), vec![16384]);
    }

    #[test]
    fn test_transpose_conv_stride_two() {
        // 2x2 input, 2x2 ones filter, stride 2 -> each input fills a 2x2 block.
        let input = Tensor::from_f32(vec![1, 2, 2, 1], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let filter = Tensor::from_f32(vec![1, 2, 2, 1], &[1.0; 4]).unwrap();
        let mut out = Tensor::zeros(vec![1, 4, 4, 1], DType::F32);
        let geo = ConvGeometry {
            stride_h: 2,
            stride_w: 2,
            ..Default::default()
        };
        transpose_conv_f32(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &geo,
            FusedActivation::None,
        )
        .unwrap();
        assert!(approx_eq(
            &out.to_vec::<f32>(),
            &[
                1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 3.0, 3.0, 4.0, 4.0
            ],
            1e-6
        ));
    }

    #[test]
    fn test_transpose_conv_quantized_overlap() {
        // 1x2 input, 1x3 filter, stride 1: outputs overlap in the middle.
        let input = Tensor::from_slice(vec![1, 1, 2, 1], &[2u8, 3]).unwrap();
        let filter = Tensor::from_slice(vec![1, 1, 3, 1], &[1u8, 1, 1]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1, 4, 1], DType::U8);
        let mut scratch = vec![0u8; 4 * 4];
        let multipliers = [quantize_multiplier(1.0)];
        let params = QuantizedConvParams {
            input_offset: 0,
            filter_offsets: &[0],
            output_offset: 0,
            multipliers: &multipliers,
            act_min: 0,
            act_max: 255,
        };
        transpose_conv_quantized(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            &mut scratch,
            Layout::Nhwc,
            &ConvGeometry::default(),
            &params,
        )
        .unwrap();
        assert_eq!(out.to_vec::<u8>(), vec![2, 5, 5, 3]);
    }

    #[test]
    fn test_conv2d_rejects_int_on_float_path() {
        let input = Tensor::zeros(vec![1, 2, 2, 1], DType::U8);
        let filter = Tensor::zeros(vec![1, 1, 1, 1], DType::F32);
        let mut out = Tensor::zeros(vec![1, 2, 2, 1], DType::F32);
        let err = conv2d_f32(
            &input.view(),
            &filter.view(),
            None,
            &mut out.view_mut(),
            Layout::Nhwc,
            &ConvGeometry::default(),
            FusedActivation::None,
        );
        assert!(matches!(err, Err(TensorError::UnsupportedDType { .. })));
    }
}
