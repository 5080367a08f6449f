// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Affine quantization parameters and fixed-point arithmetic helpers.
//!
//! A quantized value `q` represents the real number `scale * (q - zero_point)`.
//! Rescaling between quantized domains uses a 32-bit fixed-point multiplier
//! `m` in `[2^30, 2^31)` and a power-of-two shift, so that
//! `real ≈ m * 2^-31 * 2^-shift`.

use crate::{DType, FusedActivation, Shape, TensorError};

/// Affine quantization parameters of a tensor.
///
/// A single scale/zero-point pair quantizes the whole tensor. Several pairs
/// quantize per slice along `quantized_dimension` (per-axis weights).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quantization {
    pub scales: Vec<f32>,
    pub zero_points: Vec<i64>,
    #[serde(default)]
    pub quantized_dimension: usize,
}

impl Quantization {
    /// Per-tensor parameters.
    pub fn per_tensor(scale: f32, zero_point: i64) -> Self {
        Self {
            scales: vec![scale],
            zero_points: vec![zero_point],
            quantized_dimension: 0,
        }
    }

    /// Per-axis parameters along `axis`.
    pub fn per_axis(scales: Vec<f32>, zero_points: Vec<i64>, axis: usize) -> Self {
        Self {
            scales,
            zero_points,
            quantized_dimension: axis,
        }
    }

    pub fn is_per_axis(&self) -> bool {
        self.scales.len() > 1
    }

    /// First (or only) scale.
    pub fn scale(&self) -> f32 {
        self.scales.first().copied().unwrap_or(1.0)
    }

    /// First (or only) zero point.
    pub fn zero_point(&self) -> i32 {
        self.zero_points.first().copied().unwrap_or(0) as i32
    }

    /// Scale of slice `i`, falling back to the per-tensor scale.
    pub fn scale_at(&self, i: usize) -> f32 {
        self.scales.get(i).copied().unwrap_or_else(|| self.scale())
    }

    /// Zero point of slice `i`, falling back to the per-tensor zero point.
    pub fn zero_point_at(&self, i: usize) -> i32 {
        self.zero_points
            .get(i)
            .map(|&z| z as i32)
            .unwrap_or_else(|| self.zero_point())
    }

    /// Checks internal consistency and agreement with `shape`.
    pub fn validate(&self, shape: &Shape) -> Result<(), TensorError> {
        if self.scales.is_empty() {
            return Err(TensorError::InvalidQuantization("no scales".into()));
        }
        if self.zero_points.len() != self.scales.len() {
            return Err(TensorError::InvalidQuantization(format!(
                "{} scales but {} zero points",
                self.scales.len(),
                self.zero_points.len()
            )));
        }
        if let Some(bad) = self.scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(TensorError::InvalidQuantization(format!(
                "scale {bad} is not a positive finite number"
            )));
        }
        if self.is_per_axis() {
            let Some(dim) = shape.dim(self.quantized_dimension) else {
                return Err(TensorError::InvalidQuantization(format!(
                    "quantized dimension {} out of range for {shape}",
                    self.quantized_dimension
                )));
            };
            if let Some(n) = dim.known() {
                if n != self.scales.len() {
                    return Err(TensorError::InvalidQuantization(format!(
                        "{} scales for axis of extent {n}",
                        self.scales.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A real multiplier decomposed into a Q31 fixed-point value and a shift.
///
/// `shift` is a right shift; a negative value means a left shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i32,
}

impl QuantizedMultiplier {
    /// Reconstructs the real value this multiplier approximates.
    pub fn to_f64(self) -> f64 {
        self.multiplier as f64 / (1u64 << 31) as f64 * 2f64.powi(-self.shift)
    }
}

/// Splits `x` into a fraction in `[0.5, 1)` and a power-of-two exponent.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let (x, bias) = if x.abs() < f64::MIN_POSITIVE {
        (x * 2f64.powi(54), -54)
    } else {
        (x, 0)
    };
    let bits = x.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    let fraction = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (fraction, exp_bits - 1022 + bias)
}

/// Decomposes a real multiplier into a Q31 multiplier and a shift.
///
/// For any positive input the multiplier lies in `[2^30, 2^31)`. Values too
/// small to represent collapse to zero; values too large saturate.
pub fn quantize_multiplier(real: f64) -> QuantizedMultiplier {
    if real == 0.0 {
        return QuantizedMultiplier::default();
    }
    let (q, mut exp) = frexp(real);
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        exp += 1;
    }
    if exp < -31 {
        exp = 0;
        q_fixed = 0;
    }
    if exp > 30 {
        exp = 30;
        q_fixed = i32::MAX as i64;
    }
    QuantizedMultiplier {
        multiplier: q_fixed as i32,
        shift: -exp,
    }
}

/// High 32 bits of `2 * a * b` with rounding, saturating the single
/// overflow case `a == b == i32::MIN`.
#[inline]
pub(crate) fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Arithmetic right shift by `exponent` rounding half away from zero.
#[inline]
pub(crate) fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    if exponent <= 0 {
        return x;
    }
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// Computes `x * real` where `real` was decomposed by [`quantize_multiplier`].
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, m: QuantizedMultiplier) -> i32 {
    let left_shift = (-m.shift).max(0);
    let right_shift = m.shift.max(0);
    let shifted = ((x as i64) << left_shift).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    rounding_divide_by_pot(
        saturating_rounding_doubling_high_mul(shifted, m.multiplier),
        right_shift,
    )
}

/// Computes `x * real` for a 64-bit accumulator, as used by 16-bit
/// activations with 8-bit weights.
///
/// The multiplier is first rounded to 16 fractional bits, so the result can
/// differ by one from [`multiply_by_quantized_multiplier`] on the same
/// value. Results outside the `i32` range saturate.
#[inline]
pub fn multiply_by_quantized_multiplier_i64(x: i64, m: QuantizedMultiplier) -> i32 {
    let reduced = if m.multiplier < 0x7FFF_0000 {
        ((m.multiplier as i64) + (1 << 15)) >> 16
    } else {
        0x7FFF
    };
    let total_shift = 15 + m.shift;
    let product = x as i128 * reduced as i128;
    let scaled = if total_shift > 0 {
        (product + (1i128 << (total_shift - 1))) >> total_shift
    } else {
        product.saturating_mul(1i128 << (-total_shift).min(64))
    };
    scaled.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

/// Quantizes a real value into the integer range of `dtype`.
pub fn quantize_value(v: f32, scale: f32, zero_point: i32, dtype: DType) -> i32 {
    let (lo, hi) = dtype.integer_range().unwrap_or((i32::MIN, i32::MAX));
    let q = zero_point as f64 + (v as f64 / scale as f64).round();
    q.clamp(lo as f64, hi as f64) as i32
}

/// Maps a quantized value back to its real number.
#[inline]
pub fn dequantize(q: i32, scale: f32, zero_point: i32) -> f32 {
    scale * (q - zero_point) as f32
}

/// Clamp bounds in the quantized domain of an output for `activation`.
pub fn activation_range_quantized(
    activation: FusedActivation,
    dtype: DType,
    scale: f32,
    zero_point: i32,
) -> (i32, i32) {
    let (qmin, qmax) = dtype.integer_range().unwrap_or((i32::MIN, i32::MAX));
    let q = |v: f32| zero_point + (v / scale).round() as i32;
    match activation {
        FusedActivation::Relu => (qmin.max(q(0.0)), qmax),
        FusedActivation::Relu6 => (qmin.max(q(0.0)), qmax.min(q(6.0))),
        FusedActivation::ReluN1To1 => (qmin.max(q(-1.0)), qmax.min(q(1.0))),
        _ => (qmin, qmax),
    }
}
