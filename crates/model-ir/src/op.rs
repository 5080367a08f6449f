// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operation kinds and their serialized option tables.

use std::fmt;

use tensor_core::{FusedActivation, Layout, Padding};

/// The closed set of operations the engine executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Conv2D,
    DepthwiseConv2D,
    TransposeConv,
    AveragePool2D,
    MaxPool2D,
    FullyConnected,
    Add,
    Mul,
    Relu,
    Relu6,
    Logistic,
    Tanh,
    Gelu,
    Softmax,
    Reshape,
    Transpose,
    StridedSlice,
    Mean,
    /// Layout conversion between channel-last and channel-first.
    Permute,
}

impl OpKind {
    pub const ALL: [OpKind; 19] = [
        OpKind::Conv2D,
        OpKind::DepthwiseConv2D,
        OpKind::TransposeConv,
        OpKind::AveragePool2D,
        OpKind::MaxPool2D,
        OpKind::FullyConnected,
        OpKind::Add,
        OpKind::Mul,
        OpKind::Relu,
        OpKind::Relu6,
        OpKind::Logistic,
        OpKind::Tanh,
        OpKind::Gelu,
        OpKind::Softmax,
        OpKind::Reshape,
        OpKind::Transpose,
        OpKind::StridedSlice,
        OpKind::Mean,
        OpKind::Permute,
    ];

    /// Manifest name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Conv2D => "conv2d",
            OpKind::DepthwiseConv2D => "depthwise_conv2d",
            OpKind::TransposeConv => "transpose_conv",
            OpKind::AveragePool2D => "average_pool2d",
            OpKind::MaxPool2D => "max_pool2d",
            OpKind::FullyConnected => "fully_connected",
            OpKind::Add => "add",
            OpKind::Mul => "mul",
            OpKind::Relu => "relu",
            OpKind::Relu6 => "relu6",
            OpKind::Logistic => "logistic",
            OpKind::Tanh => "tanh",
            OpKind::Gelu => "gelu",
            OpKind::Softmax => "softmax",
            OpKind::Reshape => "reshape",
            OpKind::Transpose => "transpose",
            OpKind::StridedSlice => "strided_slice",
            OpKind::Mean => "mean",
            OpKind::Permute => "permute",
        }
    }

    /// Parses a manifest op name (case-insensitive, `-` accepted for `_`).
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }

    /// Windowed operations whose spatial axes follow the executing layout.
    pub fn is_spatial(self) -> bool {
        matches!(
            self,
            OpKind::Conv2D
                | OpKind::DepthwiseConv2D
                | OpKind::TransposeConv
                | OpKind::AveragePool2D
                | OpKind::MaxPool2D
        )
    }

    /// Element-wise operations whose result does not depend on the layout
    /// as long as every operand shares it.
    pub fn is_elementwise(self) -> bool {
        matches!(
            self,
            OpKind::Add
                | OpKind::Mul
                | OpKind::Relu
                | OpKind::Relu6
                | OpKind::Logistic
                | OpKind::Tanh
                | OpKind::Gelu
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Option tables ──────────────────────────────────────────────

fn one() -> usize {
    1
}

fn default_beta() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Conv2DOptions {
    #[serde(default)]
    pub padding: Padding,
    #[serde(default = "one")]
    pub stride_h: usize,
    #[serde(default = "one")]
    pub stride_w: usize,
    #[serde(default = "one")]
    pub dilation_h: usize,
    #[serde(default = "one")]
    pub dilation_w: usize,
    #[serde(default)]
    pub fused_activation: FusedActivation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DepthwiseConv2DOptions {
    #[serde(default)]
    pub padding: Padding,
    #[serde(default = "one")]
    pub stride_h: usize,
    #[serde(default = "one")]
    pub stride_w: usize,
    #[serde(default = "one")]
    pub dilation_h: usize,
    #[serde(default = "one")]
    pub dilation_w: usize,
    #[serde(default = "one")]
    pub depth_multiplier: usize,
    #[serde(default)]
    pub fused_activation: FusedActivation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransposeConvOptions {
    #[serde(default)]
    pub padding: Padding,
    #[serde(default = "one")]
    pub stride_h: usize,
    #[serde(default = "one")]
    pub stride_w: usize,
    #[serde(default)]
    pub fused_activation: FusedActivation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pool2DOptions {
    #[serde(default)]
    pub padding: Padding,
    #[serde(default = "one")]
    pub stride_h: usize,
    #[serde(default = "one")]
    pub stride_w: usize,
    #[serde(default = "one")]
    pub filter_h: usize,
    #[serde(default = "one")]
    pub filter_w: usize,
    #[serde(default)]
    pub fused_activation: FusedActivation,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FullyConnectedOptions {
    #[serde(default)]
    pub fused_activation: FusedActivation,
    #[serde(default)]
    pub keep_num_dims: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArithmeticOptions {
    #[serde(default)]
    pub fused_activation: FusedActivation,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoftmaxOptions {
    #[serde(default = "default_beta")]
    pub beta: f32,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReshapeOptions {
    #[serde(default)]
    pub new_shape: Option<Vec<i64>>,
}

/// Bitmask fields controlling strided-slice range resolution. Bit `i`
/// refers to entry `i` of the begin/end/strides operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StridedSliceOptions {
    #[serde(default)]
    pub begin_mask: i32,
    #[serde(default)]
    pub end_mask: i32,
    #[serde(default)]
    pub ellipsis_mask: i32,
    #[serde(default)]
    pub new_axis_mask: i32,
    #[serde(default)]
    pub shrink_axis_mask: i32,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReducerOptions {
    #[serde(default)]
    pub keep_dims: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PermuteOptions {
    pub from: Layout,
    pub to: Layout,
}

/// Raw kind-specific parameters of a node, as read from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOptions {
    None,
    Conv2D(Conv2DOptions),
    DepthwiseConv2D(DepthwiseConv2DOptions),
    TransposeConv(TransposeConvOptions),
    Pool2D(Pool2DOptions),
    FullyConnected(FullyConnectedOptions),
    Arithmetic(ArithmeticOptions),
    Softmax(SoftmaxOptions),
    Reshape(ReshapeOptions),
    StridedSlice(StridedSliceOptions),
    Reducer(ReducerOptions),
    Permute(PermuteOptions),
}

impl NodeOptions {
    /// Parses the option table of `kind` from JSON. A missing table
    /// (`null`) yields the defaults, which for windowed ops leave the
    /// padding `Undefined`.
    pub fn from_json(kind: OpKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        Ok(match kind {
            OpKind::Conv2D => NodeOptions::Conv2D(serde_json::from_value(value)?),
            OpKind::DepthwiseConv2D => NodeOptions::DepthwiseConv2D(serde_json::from_value(value)?),
            OpKind::TransposeConv => NodeOptions::TransposeConv(serde_json::from_value(value)?),
            OpKind::AveragePool2D | OpKind::MaxPool2D => {
                NodeOptions::Pool2D(serde_json::from_value(value)?)
            }
            OpKind::FullyConnected => NodeOptions::FullyConnected(serde_json::from_value(value)?),
            OpKind::Add | OpKind::Mul => NodeOptions::Arithmetic(serde_json::from_value(value)?),
            OpKind::Softmax => NodeOptions::Softmax(serde_json::from_value(value)?),
            OpKind::Reshape => NodeOptions::Reshape(serde_json::from_value(value)?),
            OpKind::StridedSlice => NodeOptions::StridedSlice(serde_json::from_value(value)?),
            OpKind::Mean => NodeOptions::Reducer(serde_json::from_value(value)?),
            OpKind::Permute => NodeOptions::Permute(serde_json::from_value(value)?),
            OpKind::Relu
            | OpKind::Relu6
            | OpKind::Logistic
            | OpKind::Tanh
            | OpKind::Gelu
            | OpKind::Transpose => NodeOptions::None,
        })
    }

    /// `true` when this option table is the one `kind` expects.
    pub fn matches(&self, kind: OpKind) -> bool {
        matches!(
            (kind, self),
            (OpKind::Conv2D, NodeOptions::Conv2D(_))
                | (OpKind::DepthwiseConv2D, NodeOptions::DepthwiseConv2D(_))
                | (OpKind::TransposeConv, NodeOptions::TransposeConv(_))
                | (OpKind::AveragePool2D | OpKind::MaxPool2D, NodeOptions::Pool2D(_))
                | (OpKind::FullyConnected, NodeOptions::FullyConnected(_))
                | (OpKind::Add | OpKind::Mul, NodeOptions::Arithmetic(_))
                | (OpKind::Softmax, NodeOptions::Softmax(_))
                | (OpKind::Reshape, NodeOptions::Reshape(_))
                | (OpKind::StridedSlice, NodeOptions::StridedSlice(_))
                | (OpKind::Mean, NodeOptions::Reducer(_))
                | (OpKind::Permute, NodeOptions::Permute(_))
                | (
                    OpKind::Relu
                        | OpKind::Relu6
                        | OpKind::Logistic
                        | OpKind::Tanh
                        | OpKind::Gelu
                        | OpKind::Transpose,
                    NodeOptions::None
                )
        )
    }

    /// Padding of windowed operations.
    pub fn padding(&self) -> Option<Padding> {
        match self {
            NodeOptions::Conv2D(o) => Some(o.padding),
            NodeOptions::DepthwiseConv2D(o) => Some(o.padding),
            NodeOptions::TransposeConv(o) => Some(o.padding),
            NodeOptions::Pool2D(o) => Some(o.padding),
            _ => None,
        }
    }

    /// Fused activation of operations that carry one.
    pub fn fused_activation(&self) -> Option<FusedActivation> {
        match self {
            NodeOptions::Conv2D(o) => Some(o.fused_activation),
            NodeOptions::DepthwiseConv2D(o) => Some(o.fused_activation),
            NodeOptions::TransposeConv(o) => Some(o.fused_activation),
            NodeOptions::Pool2D(o) => Some(o.fused_activation),
            NodeOptions::FullyConnected(o) => Some(o.fused_activation),
            NodeOptions::Arithmetic(o) => Some(o.fused_activation),
            _ => None,
        }
    }

    /// Rejects option tables with unset required enums or zero strides.
    pub fn check(&self) -> Result<(), String> {
        if self.padding() == Some(Padding::Undefined) {
            return Err("padding is undefined".into());
        }
        if self.fused_activation() == Some(FusedActivation::Undefined) {
            return Err("fused activation is undefined".into());
        }
        let strides = match self {
            NodeOptions::Conv2D(o) => [o.stride_h, o.stride_w, o.dilation_h, o.dilation_w],
            NodeOptions::DepthwiseConv2D(o) => [o.stride_h, o.stride_w, o.dilation_h, o.dilation_w],
            NodeOptions::TransposeConv(o) => [o.stride_h, o.stride_w, 1, 1],
            NodeOptions::Pool2D(o) => [o.stride_h, o.stride_w, o.filter_h, o.filter_w],
            _ => [1; 4],
        };
        if strides.contains(&0) {
            return Err("strides, dilations and filter sizes must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for kind in OpKind::ALL {
            assert_eq!(OpKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OpKind::parse("Depthwise-Conv2D"), Some(OpKind::DepthwiseConv2D));
        assert_eq!(OpKind::parse("lstm"), None);
    }

    #[test]
    fn test_missing_padding_is_undefined() {
        let opts = NodeOptions::from_json(OpKind::Conv2D, serde_json::json!({"stride_h": 2})).unwrap();
        assert_eq!(opts.padding(), Some(Padding::Undefined));
        assert!(opts.check().is_err());
    }

    #[test]
    fn test_options_defaults() {
        let opts = NodeOptions::from_json(OpKind::Softmax, serde_json::Value::Null).unwrap();
        assert_eq!(opts, NodeOptions::Softmax(SoftmaxOptions { beta: 1.0 }));
        let opts = NodeOptions::from_json(OpKind::Add, serde_json::Value::Null).unwrap();
        assert!(opts.matches(OpKind::Add));
        assert!(!opts.matches(OpKind::Conv2D));
        assert!(opts.check().is_ok());
    }

    #[test]
    fn test_strided_slice_masks() {
        let opts = NodeOptions::from_json(
            OpKind::StridedSlice,
            serde_json::json!({"begin_mask": 5, "shrink_axis_mask": 2}),
        )
        .unwrap();
        let NodeOptions::StridedSlice(s) = opts else {
            panic!("wrong options variant");
        };
        assert_eq!(s.begin_mask, 5);
        assert_eq!(s.shrink_axis_mask, 2);
        assert_eq!(s.end_mask, 0);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let opts = NodeOptions::from_json(
            OpKind::MaxPool2D,
            serde_json::json!({"padding": "valid", "stride_h": 0}),
        )
        .unwrap();
        assert!(opts.check().is_err());
    }
}
