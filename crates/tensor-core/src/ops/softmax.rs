// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax along the innermost axis.

use super::{expect_dtype, expect_quantized, expect_same_count, load_i32, store_i32};
use crate::{dequantize, quantize_value, DType, TensorError, TensorView, TensorViewMut};

fn rows(dims: &[usize]) -> (usize, usize) {
    match dims.last() {
        None => (1, 1),
        Some(&0) => (0, 0),
        Some(&last) => (dims.iter().product::<usize>() / last, last),
    }
}

/// Computes `output[i] = exp(beta * (x[i] - max)) / sum(exp(beta * (x - max)))`
/// for every row of the last dimension.
///
/// Subtracting the row maximum before exponentiation keeps large inputs
/// from overflowing.
pub fn softmax_f32(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    beta: f32,
) -> Result<(), TensorError> {
    expect_dtype("softmax", input.dtype(), DType::F32)?;
    expect_dtype("softmax", output.dtype(), DType::F32)?;
    expect_same_count("softmax", input.dims(), output.dims())?;
    let (num_rows, depth) = rows(input.dims());
    for row in 0..num_rows {
        let base = row * depth;
        let max_val = (base..base + depth)
            .map(|i| input.get::<f32>(i))
            .fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for i in base..base + depth {
            let e = (beta * (input.get::<f32>(i) - max_val)).exp();
            output.set(i, e);
            sum += e;
        }
        if sum > 0.0 {
            let inv_sum = 1.0 / sum;
            for i in base..base + depth {
                let v: f32 = output.get(i);
                output.set(i, v * inv_sum);
            }
        }
    }
    Ok(())
}

/// Quantized softmax evaluated in real arithmetic row by row.
pub fn softmax_quantized(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    beta: f32,
    input_q: (f32, i32),
    output_q: (f32, i32),
) -> Result<(), TensorError> {
    expect_quantized("softmax", input.dtype())?;
    expect_quantized("softmax", output.dtype())?;
    expect_same_count("softmax", input.dims(), output.dims())?;
    let dtype = output.dtype();
    let real = |i: usize| dequantize(load_i32(input, i), input_q.0, input_q.1);
    let (num_rows, depth) = rows(input.dims());
    for row in 0..num_rows {
        let base = row * depth;
        let max_val = (base..base + depth).map(real).fold(f32::NEG_INFINITY, f32::max);
        let sum: f32 = (base..base + depth)
            .map(|i| (beta * (real(i) - max_val)).exp())
            .sum();
        for i in base..base + depth {
            let p = (beta * (real(i) - max_val)).exp() / sum;
            store_i32(output, i, quantize_value(p, output_q.0, output_q.1, dtype));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_softmax_uniform() {
        let input = Tensor::from_f32(vec![4], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        let mut output = Tensor::zeros(vec![4], DType::F32);
        softmax_f32(&input.view(), &mut output.view_mut(), 1.0).unwrap();
        assert!(approx_eq(&output.to_vec::<f32>(), &[0.25; 4], 1e-5));
    }

    #[test]
    fn test_softmax_2d_rows() {
        let input = Tensor::from_f32(vec![2, 3], &[1.0, 2.0, 3.0, 1.0, 1.0, 1.0]).unwrap();
        let mut output = Tensor::zeros(vec![2, 3], DType::F32);
        softmax_f32(&input.view(), &mut output.view_mut(), 1.0).unwrap();
        let r = output.to_vec::<f32>();
        let sum0: f32 = r[0..3].iter().sum();
        assert!((sum0 - 1.0).abs() < 1e-5);
        assert!(r[0] < r[1] && r[1] < r[2]);
        assert!(approx_eq(&r[3..6], &[1.0 / 3.0; 3], 1e-5));
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let input = Tensor::from_f32(vec![3], &[1000.0, 1001.0, 1002.0]).unwrap();
        let mut output = Tensor::zeros(vec![3], DType::F32);
        softmax_f32(&input.view(), &mut output.view_mut(), 1.0).unwrap();
        let r = output.to_vec::<f32>();
        assert!((r.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(r.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_softmax_beta_zero_is_uniform() {
        let input = Tensor::from_f32(vec![2], &[-5.0, 5.0]).unwrap();
        let mut output = Tensor::zeros(vec![2], DType::F32);
        softmax_f32(&input.view(), &mut output.view_mut(), 0.0).unwrap();
        assert!(approx_eq(&output.to_vec::<f32>(), &[0.5, 0.5], 1e-6));
    }

    #[test]
    fn test_softmax_quantized() {
        let input = Tensor::from_slice(vec![2], &[0u8, 0]).unwrap();
        let mut output = Tensor::zeros(vec![2], DType::U8);
        softmax_quantized(&input.view(), &mut output.view_mut(), 1.0, (0.1, 0), (1.0 / 256.0, 0))
            .unwrap();
        assert_eq!(output.to_vec::<u8>(), vec![128, 128]);
    }
}
