// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise activations: clamps, logistic, tanh and GELU.

use super::{expect_dtype, expect_quantized, expect_same_count, load_i32, store_i32};
use crate::{
    dequantize, multiply_by_quantized_multiplier, quantize_multiplier, quantize_value, DType,
    QuantizedMultiplier, TensorError, TensorView, TensorViewMut,
};

/// Coefficient `sqrt(2/π)`.
const SQRT_2_OVER_PI: f32 = 0.7978845608;

/// Cubic coefficient in the tanh approximation.
const GELU_COEFF: f32 = 0.044715;

fn unary_f32(
    op: &'static str,
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    f: impl Fn(f32) -> f32,
) -> Result<(), TensorError> {
    expect_dtype(op, input.dtype(), DType::F32)?;
    expect_dtype(op, output.dtype(), DType::F32)?;
    expect_same_count(op, input.dims(), output.dims())?;
    for i in 0..input.num_elements() {
        output.set(i, f(input.get::<f32>(i)));
    }
    Ok(())
}

/// Clamps every element into `[lo, hi]` (ReLU, ReLU6).
pub fn clamp_f32(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    lo: f32,
    hi: f32,
) -> Result<(), TensorError> {
    unary_f32("clamp", input, output, |x| x.clamp(lo, hi))
}

/// `1 / (1 + e^-x)`.
pub fn logistic_f32(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> Result<(), TensorError> {
    unary_f32("logistic", input, output, logistic)
}

pub fn tanh_f32(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> Result<(), TensorError> {
    unary_f32("tanh", input, output, f32::tanh)
}

/// Applies GELU element-wise using the tanh approximation:
///
/// `GELU(x) ≈ 0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x³)))`
pub fn gelu_f32(input: &TensorView<'_>, output: &mut TensorViewMut<'_>) -> Result<(), TensorError> {
    unary_f32("gelu", input, output, gelu)
}

/// GELU of a single value.
#[inline(always)]
pub fn gelu(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

// ── Quantized ──────────────────────────────────────────────────

/// Requantize-then-clamp parameters for quantized ReLU / ReLU6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedClamp {
    pub input_zero_point: i32,
    pub output_zero_point: i32,
    pub multiplier: QuantizedMultiplier,
    pub act_min: i32,
    pub act_max: i32,
}

impl QuantizedClamp {
    /// Builds the parameters for a clamp to the real range `[lo, hi]`.
    pub fn new(input: (f32, i32), output: (f32, i32), dtype: DType, lo: f32, hi: f32) -> Self {
        let (qmin, qmax) = dtype.integer_range().unwrap_or((i32::MIN, i32::MAX));
        let bound = |v: f32| {
            if v.is_finite() {
                quantize_value(v, output.0, output.1, dtype)
            } else if v > 0.0 {
                qmax
            } else {
                qmin
            }
        };
        Self {
            input_zero_point: input.1,
            output_zero_point: output.1,
            multiplier: quantize_multiplier(input.0 as f64 / output.0 as f64),
            act_min: bound(lo).max(qmin),
            act_max: bound(hi).min(qmax),
        }
    }
}

/// Quantized clamp with rescaling from the input to the output domain.
pub fn clamp_quantized(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    params: &QuantizedClamp,
) -> Result<(), TensorError> {
    expect_quantized("clamp", input.dtype())?;
    expect_dtype("clamp", output.dtype(), input.dtype())?;
    expect_same_count("clamp", input.dims(), output.dims())?;
    for i in 0..input.num_elements() {
        let centred = load_i32(input, i) - params.input_zero_point;
        let v = multiply_by_quantized_multiplier(centred, params.multiplier) + params.output_zero_point;
        store_i32(output, i, v.clamp(params.act_min, params.act_max));
    }
    Ok(())
}

/// Outputs of a smooth activation for every representable 8-bit input,
/// computed once from the input and output quantization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationTable {
    dtype: DType,
    values: Vec<i32>,
}

impl ActivationTable {
    /// Tabulates `f` for `dtype` (u8 or i8) between the given
    /// `(scale, zero_point)` domains.
    pub fn new(
        dtype: DType,
        input_q: (f32, i32),
        output_q: (f32, i32),
        f: impl Fn(f32) -> f32,
    ) -> Result<Self, TensorError> {
        let (lo, hi) = match dtype {
            DType::U8 | DType::I8 => dtype.integer_range().unwrap_or((0, 255)),
            _ => return Err(TensorError::UnsupportedDType { op: "activation_table", dtype }),
        };
        let values = (lo..=hi)
            .map(|q| quantize_value(f(dequantize(q, input_q.0, input_q.1)), output_q.0, output_q.1, dtype))
            .collect();
        Ok(Self { dtype, values })
    }

    #[inline]
    fn get(&self, q: i32) -> i32 {
        let index = if self.dtype == DType::I8 { q + 128 } else { q };
        self.values.get(index as usize).copied().unwrap_or_default()
    }
}

/// Maps every element through a precomputed [`ActivationTable`].
pub fn lookup_quantized(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    table: &ActivationTable,
) -> Result<(), TensorError> {
    expect_dtype("lookup", input.dtype(), table.dtype)?;
    expect_dtype("lookup", output.dtype(), table.dtype)?;
    expect_same_count("lookup", input.dims(), output.dims())?;
    for i in 0..input.num_elements() {
        store_i32(output, i, table.get(load_i32(input, i)));
    }
    Ok(())
}

// ── 16-bit logistic and tanh ───────────────────────────────────

/// `sigmoid(i / 24)` in unsigned 0.16 fixed point, saturated at 65535.
/// `tanh(x) = 2 * sigmoid(2x) - 1` lets tanh share the table.
const SIGMOID_TABLE: [u16; 256] = [
    32768, 33451, 34133, 34813, 35492, 36169, 36843, 37513, 38179, 38841, 39498, 40149,
    40793, 41432, 42063, 42687, 43303, 43911, 44511, 45101, 45682, 46254, 46816, 47369,
    47911, 48442, 48964, 49474, 49974, 50463, 50941, 51408, 51865, 52310, 52744, 53168,
    53581, 53982, 54374, 54754, 55124, 55484, 55834, 56173, 56502, 56822, 57132, 57433,
    57724, 58006, 58279, 58544, 58800, 59048, 59287, 59519, 59743, 59959, 60168, 60370,
    60565, 60753, 60934, 61109, 61278, 61441, 61598, 61750, 61896, 62036, 62172, 62302,
    62428, 62549, 62666, 62778, 62886, 62990, 63090, 63186, 63279, 63368, 63453, 63536,
    63615, 63691, 63764, 63835, 63903, 63968, 64030, 64090, 64148, 64203, 64257, 64308,
    64357, 64405, 64450, 64494, 64535, 64576, 64614, 64651, 64687, 64721, 64754, 64786,
    64816, 64845, 64873, 64900, 64925, 64950, 64974, 64997, 65018, 65039, 65060, 65079,
    65097, 65115, 65132, 65149, 65164, 65179, 65194, 65208, 65221, 65234, 65246, 65258,
    65269, 65280, 65291, 65300, 65310, 65319, 65328, 65337, 65345, 65352, 65360, 65367,
    65374, 65381, 65387, 65393, 65399, 65404, 65410, 65415, 65420, 65425, 65429, 65433,
    65438, 65442, 65445, 65449, 65453, 65456, 65459, 65462, 65465, 65468, 65471, 65474,
    65476, 65479, 65481, 65483, 65485, 65488, 65489, 65491, 65493, 65495, 65497, 65498,
    65500, 65501, 65503, 65504, 65505, 65507, 65508, 65509, 65510, 65511, 65512, 65513,
    65514, 65515, 65516, 65517, 65517, 65518, 65519, 65520, 65520, 65521, 65522, 65522,
    65523, 65523, 65524, 65524, 65525, 65525, 65526, 65526, 65526, 65527, 65527, 65528,
    65528, 65528, 65529, 65529, 65529, 65529, 65530, 65530, 65530, 65530, 65531, 65531,
    65531, 65531, 65531, 65532, 65532, 65532, 65532, 65532, 65532, 65533, 65533, 65533,
    65533, 65533, 65533, 65533, 65533, 65534, 65534, 65534, 65534, 65534, 65534, 65534,
    65534, 65534, 65534, 65534,
];

/// Integer bits of the rescaled 16-bit input.
const INPUT_INTEGER_BITS: i32 = 3;

/// Rescaling of a symmetric 16-bit input onto the table's `1 / (3 * 4096)`
/// step.
///
/// A zero `multiplier` marks a power-of-two input scale of `2^-12` or
/// `2^-11`, where the rescale is an exact multiply by `3 << left_shift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedPointInput {
    pub multiplier: i32,
    pub left_shift: i32,
}

impl FixedPointInput {
    pub fn for_scale(scale: f32) -> Self {
        let log2 = (scale as f64).log2();
        let rounded = log2.round();
        let left_shift = (15 - INPUT_INTEGER_BITS) + rounded as i32;
        if (log2 - rounded).abs() < 1e-3 && (left_shift == 0 || left_shift == 1) {
            return Self {
                multiplier: 0,
                left_shift,
            };
        }
        let mut multiplier = scale as f64 * 4096.0 * 3.0;
        let mut left_shift = 0;
        while multiplier <= 32767.0 / 2.0 && left_shift <= 30 {
            left_shift += 1;
            multiplier *= 2.0;
        }
        Self {
            multiplier: multiplier.min(i32::MAX as f64) as i32,
            left_shift,
        }
    }

    /// Input value in table steps, rounded.
    #[inline]
    fn rescale(&self, x: i16) -> i64 {
        let (multiplier, shift) = if self.multiplier == 0 {
            (3i64 << self.left_shift, 0)
        } else {
            (self.multiplier as i64, self.left_shift)
        };
        let round = if shift > 0 { 1i64 << (shift - 1) } else { 0 };
        ((x as i64 * multiplier + round) >> shift).clamp(i32::MIN as i64, i32::MAX as i64)
    }
}

fn unary_i16(
    op: &'static str,
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    f: impl Fn(i16) -> i16,
) -> Result<(), TensorError> {
    expect_dtype(op, input.dtype(), DType::I16)?;
    expect_dtype(op, output.dtype(), DType::I16)?;
    expect_same_count(op, input.dims(), output.dims())?;
    for i in 0..input.num_elements() {
        output.set(i, f(input.get::<i16>(i)));
    }
    Ok(())
}

/// Interpolates the table at `abs >> frac_bits`, scaled by `2^frac_bits`.
/// Returns `None` past the last entry.
#[inline]
fn interpolate(abs: i64, frac_bits: u32) -> Option<i64> {
    let index = (abs >> frac_bits) as usize;
    if index >= 255 {
        return None;
    }
    let lo = SIGMOID_TABLE[index] as i64;
    let hi = SIGMOID_TABLE[index + 1] as i64;
    let frac = abs & ((1 << frac_bits) - 1);
    Some((lo << frac_bits) + frac * (hi - lo))
}

/// Logistic of one symmetric 16-bit value; output scale `2^-15`.
#[inline]
fn logistic_q15(x: i16, params: &FixedPointInput) -> i16 {
    let v = params.rescale(x);
    let sigmoid = interpolate(v.abs(), 9).unwrap_or(0x7FFF << 10);
    let result = if v >= 0 {
        sigmoid + (1 << 9)
    } else {
        (1 << 25) - sigmoid + (1 << 9) - 1
    };
    (result >> 10) as i16
}

/// Tanh of one symmetric 16-bit value; output scale `2^-15`.
#[inline]
fn tanh_q15(x: i16, params: &FixedPointInput) -> i16 {
    let v = params.rescale(x);
    let sigmoid = interpolate(v.abs(), 8).unwrap_or(0xFFFF << 8);
    let result = if v >= 0 {
        sigmoid - (1 << 23) + (1 << 7)
    } else {
        -sigmoid + (1 << 23) + (1 << 7) - 1
    };
    (result >> 8) as i16
}

/// Fixed-point logistic of a symmetric 16-bit tensor.
pub fn logistic_i16(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    params: &FixedPointInput,
) -> Result<(), TensorError> {
    unary_i16("logistic", input, output, |x| logistic_q15(x, params))
}

/// Fixed-point tanh of a symmetric 16-bit tensor.
pub fn tanh_i16(
    input: &TensorView<'_>,
    output: &mut TensorViewMut<'_>,
    params: &FixedPointInput,
) -> Result<(), TensorError> {
    unary_i16("tanh", input, output, |x| tanh_q15(x, params))
}

/// Logistic of a single value.
#[inline(always)]
pub fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tensor;

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_relu6_clamp() {
        let input = Tensor::from_f32(vec![4], &[-1.0, 0.5, 6.0, 9.0]).unwrap();
        let mut out = Tensor::zeros(vec![4], DType::F32);
        clamp_f32(&input.view(), &mut out.view_mut(), 0.0, 6.0).unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![0.0, 0.5, 6.0, 6.0]);
    }

    #[test]
    fn test_logistic_and_tanh() {
        let input = Tensor::from_f32(vec![3], &[0.0, 2.0, -2.0]).unwrap();
        let mut out = Tensor::zeros(vec![3], DType::F32);
        logistic_f32(&input.view(), &mut out.view_mut()).unwrap();
        assert!(approx_eq(&out.to_vec::<f32>(), &[0.5, 0.880797, 0.119203], 1e-5));
        tanh_f32(&input.view(), &mut out.view_mut()).unwrap();
        assert!(approx_eq(&out.to_vec::<f32>(), &[0.0, 0.964028, -0.964028], 1e-5));
    }

    #[test]
    fn test_gelu_zero() {
        let input = Tensor::from_f32(vec![1], &[0.0]).unwrap();
        let mut out = Tensor::zeros(vec![1], DType::F32);
        gelu_f32(&input.view(), &mut out.view_mut()).unwrap();
        assert!((out.to_vec::<f32>()[0]).abs() < 1e-7);
    }

    #[test]
    fn test_gelu_positive() {
        // GELU(1.0) ≈ 0.8412 (tanh approximation)
        let input = Tensor::from_f32(vec![1], &[1.0]).unwrap();
        let mut out = Tensor::zeros(vec![1], DType::F32);
        gelu_f32(&input.view(), &mut out.view_mut()).unwrap();
        assert!((out.to_vec::<f32>()[0] - 0.8412).abs() < 1e-3);
    }

    #[test]
    fn test_gelu_large_negative() {
        let input = Tensor::from_f32(vec![1], &[-10.0]).unwrap();
        let mut out = Tensor::zeros(vec![1], DType::F32);
        gelu_f32(&input.view(), &mut out.view_mut()).unwrap();
        assert!(out.to_vec::<f32>()[0].abs() < 1e-5);
    }

    #[test]
    fn test_quantized_relu_requantizes() {
        // Input scale 0.5 zp 128; output scale 0.25 zp 0.
        let input = Tensor::from_slice(vec![3], &[120u8, 128, 132]).unwrap();
        let mut out = Tensor::zeros(vec![3], DType::U8);
        let params = QuantizedClamp::new((0.5, 128), (0.25, 0), DType::U8, 0.0, f32::INFINITY);
        clamp_quantized(&input.view(), &mut out.view_mut(), &params).unwrap();
        // Reals -4, 0, 2 -> relu -> 0, 0, 2 -> q 0, 0, 8
        assert_eq!(out.to_vec::<u8>(), vec![0, 0, 8]);
    }

    #[test]
    fn test_table_logistic_u8() {
        let input = Tensor::from_slice(vec![2], &[128u8, 255]).unwrap();
        let mut out = Tensor::zeros(vec![2], DType::U8);
        let table = ActivationTable::new(DType::U8, (0.1, 128), (1.0 / 256.0, 0), logistic).unwrap();
        lookup_quantized(&input.view(), &mut out.view_mut(), &table).unwrap();
        let out = out.to_vec::<u8>();
        assert_eq!(out[0], 128);
        assert!(out[1] > 250);
    }

    #[test]
    fn test_table_tanh_i8_is_odd() {
        let input = Tensor::from_slice(vec![3], &[-20i8, 0, 20]).unwrap();
        let mut out = Tensor::zeros(vec![3], DType::I8);
        let table = ActivationTable::new(DType::I8, (0.05, 0), (1.0 / 128.0, 0), f32::tanh).unwrap();
        lookup_quantized(&input.view(), &mut out.view_mut(), &table).unwrap();
        // tanh(±1.0) * 128 = ±97.5
        assert_eq!(out.to_vec::<i8>(), vec![-97, 0, 97]);
        assert!(ActivationTable::new(DType::I16, (1.0, 0), (1.0, 0), f32::tanh).is_err());
    }

    #[test]
    fn test_fixed_point_input_scales() {
        assert_eq!(
            FixedPointInput::for_scale(1.0 / 4096.0),
            FixedPointInput { multiplier: 0, left_shift: 0 }
        );
        assert_eq!(
            FixedPointInput::for_scale(0.001),
            FixedPointInput { multiplier: 25165, left_shift: 11 }
        );
    }

    #[test]
    fn test_logistic_i16_power_of_two_scale() {
        let params = FixedPointInput::for_scale(1.0 / 4096.0);
        let input = Tensor::from_slice(vec![5], &[0i16, 4096, -4096, 32767, -32768]).unwrap();
        let mut out = Tensor::zeros(vec![5], DType::I16);
        logistic_i16(&input.view(), &mut out.view_mut(), &params).unwrap();
        // Real sigmoid * 2^15: 16384, 23955.4, 8812.6, 32756.8, 11.2
        assert_eq!(out.to_vec::<i16>(), vec![16384, 23956, 8812, 32757, 11]);
    }

    #[test]
    fn test_tanh_i16_power_of_two_scale() {
        let params = FixedPointInput::for_scale(1.0 / 4096.0);
        let input = Tensor::from_slice(vec![5], &[0i16, 4096, -4096, 32767, -32768]).unwrap();
        let mut out = Tensor::zeros(vec![5], DType::I16);
        tanh_i16(&input.view(), &mut out.view_mut(), &params).unwrap();
        assert_eq!(out.to_vec::<i16>(), vec![0, 24956, -24956, 32767, -32767]);
    }

    #[test]
    fn test_logistic_and_tanh_i16_general_scale() {
        let params = FixedPointInput::for_scale(0.001);
        let input = Tensor::from_slice(vec![4], &[0i16, 1000, -1000, 5000]).unwrap();
        let mut out = Tensor::zeros(vec![4], DType::I16);
        logistic_i16(&input.view(), &mut out.view_mut(), &params).unwrap();
        assert_eq!(out.to_vec::<i16>(), vec![16384, 23956, 8812, 32548]);
        tanh_i16(&input.view(), &mut out.view_mut(), &params).unwrap();
        assert_eq!(out.to_vec::<i16>(), vec![0, 24956, -24956, 32765]);
    }
}
