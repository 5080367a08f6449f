// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fully connected (dense) layer.

use super::{
    expect_dtype, expect_quantized, load_i32, mac_i64, store_i32, store_rescaled_i64,
    QuantizedConvParams,
};
use crate::{
    multiply_by_quantized_multiplier, DType, FusedActivation, Shape, TensorError, TensorView,
    TensorViewMut,
};

/// Resolves `(batches, depth, units)` for an input flattened to
/// `[batches, depth]` and weights `[units, depth]`.
fn geometry(input: &TensorView<'_>, weights: &TensorView<'_>) -> Result<(usize, usize, usize), TensorError> {
    let wd = weights.dims();
    if wd.len() != 2 || wd[1] == 0 || input.num_elements() % wd[1] != 0 {
        return Err(TensorError::ShapeMismatch {
            op: "fully_connected",
            lhs: Shape::from(input.dims()),
            rhs: Shape::from(wd),
        });
    }
    Ok((input.num_elements() / wd[1], wd[1], wd[0]))
}

/// Computes `output = activation(input · weightsᵀ + bias)`.
///
/// The input is viewed as `[batches, depth]` where `depth` is the inner
/// extent of `weights`. Uses a row-by-row dot product so both operands are
/// read sequentially.
pub fn fully_connected_f32(
    input: &TensorView<'_>,
    weights: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    activation: FusedActivation,
) -> Result<(), TensorError> {
    expect_dtype("fully_connected", input.dtype(), DType::F32)?;
    expect_dtype("fully_connected", weights.dtype(), DType::F32)?;
    let (batches, depth, units) = geometry(input, weights)?;
    for b in 0..batches {
        for u in 0..units {
            let mut acc = 0.0f32;
            for k in 0..depth {
                acc += input.get::<f32>(b * depth + k) * weights.get::<f32>(u * depth + k);
            }
            let bias = bias.map_or(0.0, |t| t.get::<f32>(u));
            output.set(b * units + u, activation.apply(acc + bias));
        }
    }
    Ok(())
}

/// Quantized fully connected layer. Per-axis weights rescale each output
/// unit with its own multiplier. 16-bit inputs accumulate in 64 bits.
pub fn fully_connected_quantized(
    input: &TensorView<'_>,
    weights: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    output: &mut TensorViewMut<'_>,
    params: &QuantizedConvParams<'_>,
) -> Result<(), TensorError> {
    expect_quantized("fully_connected", input.dtype())?;
    expect_quantized("fully_connected", weights.dtype())?;
    let (batches, depth, units) = geometry(input, weights)?;
    if input.dtype() == DType::I16 {
        for b in 0..batches {
            for u in 0..units {
                let acc: i64 = (0..depth)
                    .map(|k| mac_i64(input, weights, params, b * depth + k, u * depth + k, u))
                    .sum();
                store_rescaled_i64(output, bias, params, b * units + u, u, acc);
            }
        }
        return Ok(());
    }
    for b in 0..batches {
        for u in 0..units {
            let filter_offset = params.filter_offset(u);
            let mut acc = 0i32;
            for k in 0..depth {
                let x = load_i32(input, b * depth + k) + params.input_offset;
                let w = load_i32(weights, u * depth + k) + filter_offset;
                acc += x * w;
            }
            acc += bias.map_or(0, |t| load_i32(t, u));
            acc = multiply_by_quantized_multiplier(acc, params.multiplier(u)) + params.output_offset;
            store_i32(output, b * units + u, acc.clamp(params.act_min, params.act_max));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{quantize_multiplier, Tensor};

    #[test]
    fn test_fully_connected_2x3_times_2x3t() {
        // x = [[1, 2, 3], [4, 5, 6]], W = [[1, 0, 1], [0, 1, 0]]
        let x = Tensor::from_f32(vec![2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let w = Tensor::from_f32(vec![2, 3], &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        let bias = Tensor::from_f32(vec![2], &[0.5, -0.5]).unwrap();
        let mut out = Tensor::zeros(vec![2, 2], DType::F32);
        fully_connected_f32(&x.view(), &w.view(), Some(&bias.view()), &mut out.view_mut(), FusedActivation::None)
            .unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![4.5, 1.5, 10.5, 4.5]);
    }

    #[test]
    fn test_fully_connected_flattens_input() {
        let x = Tensor::from_f32(vec![1, 2, 2], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        let w = Tensor::from_f32(vec![1, 4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1], DType::F32);
        fully_connected_f32(&x.view(), &w.view(), None, &mut out.view_mut(), FusedActivation::Relu6)
            .unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![6.0]);
    }

    #[test]
    fn test_fully_connected_depth_mismatch() {
        let x = Tensor::zeros(vec![1, 5], DType::F32);
        let w = Tensor::zeros(vec![2, 3], DType::F32);
        let mut out = Tensor::zeros(vec![1, 2], DType::F32);
        let err = fully_connected_f32(&x.view(), &w.view(), None, &mut out.view_mut(), FusedActivation::None);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_fully_connected_int8_per_channel() {
        let x = Tensor::from_slice(vec![1, 2], &[10i8, 20]).unwrap();
        let w = Tensor::from_slice(vec![2, 2], &[1i8, 1, 2, 2]).unwrap();
        let mut out = Tensor::zeros(vec![1, 2], DType::I8);
        let multipliers = [quantize_multiplier(0.5), quantize_multiplier(0.25)];
        let params = QuantizedConvParams {
            input_offset: 0,
            filter_offsets: &[0, 0],
            output_offset: 0,
            multipliers: &multipliers,
            act_min: -128,
            act_max: 127,
        };
        fully_connected_quantized(&x.view(), &w.view(), None, &mut out.view_mut(), &params).unwrap();
        // unit 0: 30 * 0.5 = 15; unit 1: 60 * 0.25 = 15
        assert_eq!(out.to_vec::<i8>(), vec![15, 15]);
    }

    #[test]
    fn test_fully_connected_i16_with_i64_bias() {
        let x = Tensor::from_slice(vec![1, 1024], &[32767i16; 1024]).unwrap();
        let w = Tensor::from_slice(vec![1, 1024], &[127i8; 1024]).unwrap();
        let bias = Tensor::from_slice(vec![1], &[26_214_400i64]).unwrap();
        let mut out = Tensor::zeros(vec![1, 1], DType::I16);
        let multipliers = [quantize_multiplier(1.0 / 262_144.0)];
        let params = QuantizedConvParams {
            input_offset: 0,
            filter_offsets: &[0],
            output_offset: 0,
            multipliers: &multipliers,
            act_min: i16::MIN as i32,
            act_max: i16::MAX as i32,
        };
        fully_connected_quantized(&x.view(), &w.view(), Some(&bias.view()), &mut out.view_mut(), &params)
            .unwrap();
        // (1024 * 32767 * 127 + 100 * 2^18) / 2^18
        assert_eq!(out.to_vec::<i16>(), vec![16356]);
    }
}
