// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rule for average and max pooling.

use tensor_core::{DType, Layout};

use super::conv::window_extent;
use super::{expect_dtype_in, invalid, operand, spatial_dims, spatial_shape, InferError, OutputRule};
use crate::{Node, NodeOptions, TensorDef};

pub(super) fn pool2d(node: &Node, inputs: &[&TensorDef], layout: Layout) -> Result<OutputRule, InferError> {
    let NodeOptions::Pool2D(o) = &node.options else {
        return Err(invalid(format!("{} requires pooling options", node.kind)));
    };
    let input = operand(inputs, 0, "input")?;
    expect_dtype_in(input, &[DType::F32, DType::U8, DType::I8, DType::I16], node.kind)?;
    let [b, h, w, c] = spatial_dims(input, layout)?;
    let oh = window_extent(o.padding, h, o.filter_h, o.stride_h, 1)?;
    let ow = window_extent(o.padding, w, o.filter_w, o.stride_w, 1)?;
    Ok(OutputRule::inherit(spatial_shape(layout, b, oh, ow, c), &input.info))
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::infer_node;
    use super::*;
    use crate::{OpKind, Pool2DOptions, TensorId};
    use tensor_core::{FusedActivation, Padding, Quantization, Shape};

    fn pool(kind: OpKind, padding: Padding, stride: usize, filter: usize) -> Node {
        Node::new(
            "pool",
            kind,
            vec![TensorId(0)],
            vec![TensorId(1)],
            NodeOptions::Pool2D(Pool2DOptions {
                padding,
                stride_h: stride,
                stride_w: stride,
                filter_h: filter,
                filter_w: filter,
                fused_activation: FusedActivation::None,
            }),
        )
    }

    #[test]
    fn test_same_and_valid_extents() {
        let input = activation("x", &[1, 28, 28, 8], DType::F32);
        let same = infer_node(
            &pool(OpKind::MaxPool2D, Padding::Same, 1, 3),
            &[&input],
            Layout::Nhwc,
            &[&out(DType::F32)],
        )
        .unwrap();
        assert_eq!(same[0].shape, Shape::new(vec![1, 28, 28, 8]));
        let valid = infer_node(
            &pool(OpKind::MaxPool2D, Padding::Valid, 1, 3),
            &[&input],
            Layout::Nhwc,
            &[&out(DType::F32)],
        )
        .unwrap();
        assert_eq!(valid[0].shape, Shape::new(vec![1, 26, 26, 8]));
    }

    #[test]
    fn test_quantization_passes_through() {
        let mut input = activation("x", &[1, 4, 4, 2], DType::I8);
        input.info.quantization = Some(Quantization::per_tensor(0.25, -3));
        let infos = infer_node(
            &pool(OpKind::AveragePool2D, Padding::Valid, 2, 2),
            &[&input],
            Layout::Nhwc,
            &[&out(DType::I8)],
        )
        .unwrap();
        assert_eq!(infos[0].shape, Shape::new(vec![1, 2, 2, 2]));
        assert_eq!(infos[0].scale_zero_point(), (0.25, -3));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let input = activation("x", &[1, 2, 2, 1], DType::F32);
        let err = infer_node(
            &pool(OpKind::AveragePool2D, Padding::Valid, 1, 3),
            &[&input],
            Layout::Nhwc,
            &[&out(DType::F32)],
        )
        .unwrap_err();
        assert!(!err.is_recoverable());
    }
}
