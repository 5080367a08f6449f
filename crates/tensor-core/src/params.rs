// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Padding and fused-activation parameters shared by windowed operations.

/// Spatial padding scheme of a windowed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// Output extent is `ceil(input / stride)`; the input is padded as needed.
    Same,
    /// No padding; only windows entirely inside the input are produced.
    Valid,
    /// Not yet specified. Nodes carrying this value are rejected.
    #[default]
    Undefined,
}

/// Activation applied to the result of an arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusedActivation {
    #[default]
    None,
    Relu,
    ReluN1To1,
    Relu6,
    Tanh,
    /// Not yet specified. Nodes carrying this value are rejected.
    Undefined,
}

impl FusedActivation {
    /// Clamp range for a real-valued output.
    ///
    /// `Tanh` is not a clamp and returns the unbounded range; callers apply it
    /// element-wise after the clamp.
    pub fn float_range(self) -> (f32, f32) {
        match self {
            FusedActivation::Relu => (0.0, f32::MAX),
            FusedActivation::ReluN1To1 => (-1.0, 1.0),
            FusedActivation::Relu6 => (0.0, 6.0),
            _ => (f32::MIN, f32::MAX),
        }
    }

    /// Applies the activation to one real value.
    #[inline]
    pub fn apply(self, v: f32) -> f32 {
        match self {
            FusedActivation::Tanh => v.tanh(),
            other => {
                let (lo, hi) = other.float_range();
                v.clamp(lo, hi)
            }
        }
    }
}

/// Computes the output extent of a windowed operation along one axis.
///
/// The effective filter extent is `(filter - 1) * dilation + 1`.
/// - `Same`: `ceil(image / stride)`
/// - `Valid`: `floor((image - effective) / stride) + 1`
///
/// Returns `None` when the stride or dilation is zero, when the padding is
/// `Undefined`, or when a valid window does not fit in the image.
pub fn compute_output_size(
    padding: Padding,
    image: usize,
    filter: usize,
    stride: usize,
    dilation: usize,
) -> Option<usize> {
    if stride == 0 || dilation == 0 || filter == 0 {
        return None;
    }
    let effective = (filter - 1) * dilation + 1;
    match padding {
        Padding::Same => Some((image + stride - 1) / stride),
        Padding::Valid => {
            if image < effective {
                None
            } else {
                Some((image - effective) / stride + 1)
            }
        }
        Padding::Undefined => None,
    }
}

/// Leading padding of one axis plus the odd remainder that goes on the
/// trailing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingValues {
    pub before: usize,
    pub offset: usize,
}

/// Computes the padding needed for `out` windows over `image`.
///
/// The total is split evenly; when it is odd the extra element is added
/// after the data.
pub fn compute_padding_with_offset(
    stride: usize,
    dilation: usize,
    image: usize,
    filter: usize,
    out: usize,
) -> PaddingValues {
    if out == 0 {
        return PaddingValues::default();
    }
    let effective = (filter.max(1) - 1) * dilation + 1;
    let total = ((out - 1) * stride + effective).saturating_sub(image);
    PaddingValues {
        before: total / 2,
        offset: total % 2,
    }
}
