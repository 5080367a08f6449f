// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rules for broadcasting arithmetic, activations and softmax.

use tensor_core::{DType, Dim, Quantization, Shape};

use super::{expect_dtype_in, invalid, operand, InferError, OutputRule, QuantRule};
use crate::{Node, OpKind, TensorDef};

/// Numpy-style broadcast of two shapes, aligned on the trailing axis.
///
/// An unknown extent paired with a known extent greater than one resolves
/// to the known extent; paired with one or another unknown it stays
/// unknown.
pub fn broadcast_shapes(lhs: &Shape, rhs: &Shape) -> Result<Shape, InferError> {
    let rank = lhs.rank().max(rhs.rank());
    let pick = |s: &Shape, i: usize| -> Dim {
        let offset = rank - s.rank();
        if i < offset {
            Dim::Known(1)
        } else {
            s.dims()[i - offset]
        }
    };
    let mut dims = Vec::with_capacity(rank);
    for i in 0..rank {
        let d = match (pick(lhs, i), pick(rhs, i)) {
            (Dim::Known(a), Dim::Known(b)) if a == b => Dim::Known(a),
            (Dim::Known(1), other) | (other, Dim::Known(1)) => other,
            (Dim::Known(a), Dim::Known(b)) => {
                return Err(invalid(format!("cannot broadcast {lhs} with {rhs} (axis {i}: {a} vs {b})")))
            }
            (Dim::Unknown, Dim::Known(n)) | (Dim::Known(n), Dim::Unknown) => Dim::Known(n),
            (Dim::Unknown, Dim::Unknown) => Dim::Unknown,
        };
        dims.push(d);
    }
    Ok(Shape::from_dims(dims))
}

pub(super) fn arithmetic(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let lhs = operand(inputs, 0, "lhs")?;
    let rhs = operand(inputs, 1, "rhs")?;
    expect_dtype_in(
        lhs,
        &[DType::F32, DType::U8, DType::I8, DType::I16, DType::I32, DType::I64],
        node.kind,
    )?;
    if lhs.info.dtype != rhs.info.dtype {
        return Err(invalid(format!(
            "'{}' operands differ in type: {} vs {}",
            node.kind, lhs.info.dtype, rhs.info.dtype
        )));
    }
    let shape = broadcast_shapes(&lhs.info.shape, &rhs.info.shape)?;
    Ok(OutputRule::rescaled(shape, lhs.info.dtype))
}

/// Output range of logistic and tanh on quantized types.
fn fixed_activation_range(kind: OpKind, dtype: DType) -> Option<Quantization> {
    let (scale, zero_point) = match (kind, dtype) {
        (OpKind::Logistic, DType::U8) => (1.0 / 256.0, 0),
        (OpKind::Logistic, DType::I8) => (1.0 / 256.0, -128),
        (OpKind::Tanh, DType::U8) => (1.0 / 128.0, 128),
        (OpKind::Tanh, DType::I8) => (1.0 / 128.0, 0),
        (OpKind::Logistic | OpKind::Tanh, DType::I16) => (1.0 / 32768.0, 0),
        _ => return None,
    };
    Some(Quantization::per_tensor(scale, zero_point))
}

pub(super) fn activation(node: &Node, inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let input = operand(inputs, 0, "input")?;
    let allowed: &[DType] = match node.kind {
        OpKind::Gelu => &[DType::F32, DType::U8, DType::I8],
        _ => &[DType::F32, DType::U8, DType::I8, DType::I16],
    };
    expect_dtype_in(input, allowed, node.kind)?;
    if input.info.dtype.is_quantized() && input.info.quantization.is_none() {
        return Err(invalid(format!(
            "quantized input '{}' has no quantization parameters",
            input.name
        )));
    }
    let mut rule = OutputRule::inherit(input.info.shape.clone(), &input.info);
    if let Some(q) = fixed_activation_range(node.kind, input.info.dtype) {
        rule.quant = QuantRule::Fixed(q);
    }
    Ok(rule)
}

pub(super) fn softmax(inputs: &[&TensorDef]) -> Result<OutputRule, InferError> {
    let input = operand(inputs, 0, "input")?;
    expect_dtype_in(input, &[DType::F32, DType::U8, DType::I8], OpKind::Softmax)?;
    if input.info.shape.rank() == 0 {
        return Err(invalid("softmax needs at least one axis"));
    }
    let quant = match input.info.dtype {
        DType::U8 => QuantRule::Fixed(Quantization::per_tensor(1.0 / 256.0, 0)),
        DType::I8 => QuantRule::Fixed(Quantization::per_tensor(1.0 / 256.0, -128)),
        _ => QuantRule::Inherit(None),
    };
    Ok(OutputRule {
        shape: input.info.shape.clone(),
        dtype: input.info.dtype,
        quant,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::super::test_util::activation;
    use super::super::infer_node;
    use super::*;
    use crate::{ArithmeticOptions, NodeOptions, TensorId};
    use tensor_core::Layout;

    #[test]
    fn test_broadcast_rules() {
        let s = |d: &[usize]| Shape::new(d.to_vec());
        assert_eq!(broadcast_shapes(&s(&[2, 3]), &s(&[3])).unwrap(), s(&[2, 3]));
        assert_eq!(broadcast_shapes(&s(&[4, 1, 5]), &s(&[3, 1])).unwrap(), s(&[4, 3, 5]));
        assert!(broadcast_shapes(&s(&[2, 3]), &s(&[4])).is_err());

        let partial = Shape::from_dims(vec![Dim::Unknown, Dim::Known(8)]);
        let b = broadcast_shapes(&partial, &s(&[1])).unwrap();
        assert_eq!(b.to_string(), "[?, 8]");
    }

    #[test]
    fn test_add_requires_matching_types() {
        let node = Node::new(
            "add",
            OpKind::Add,
            vec![TensorId(0), TensorId(1)],
            vec![TensorId(2)],
            NodeOptions::Arithmetic(ArithmeticOptions::default()),
        );
        let a = activation("a", &[1, 4], DType::F32);
        let b = activation("b", &[1, 4], DType::I32);
        assert!(infer_node(&node, &[&a, &b], Layout::Nhwc, &[&out(DType::F32)]).is_err());
        let b = activation("b", &[4], DType::F32);
        let infos = infer_node(&node, &[&a, &b], Layout::Nhwc, &[&out(DType::F32)]).unwrap();
        assert_eq!(infos[0].shape, Shape::new(vec![1, 4]));
    }

    #[test]
    fn test_logistic_fixed_output_range() {
        let node = Node::new(
            "sig",
            OpKind::Logistic,
            vec![TensorId(0)],
            vec![TensorId(1)],
            NodeOptions::None,
        );
        let mut input = activation("x", &[1, 8], DType::I8);
        input.info.quantization = Some(Quantization::per_tensor(0.1, 4));
        let infos = infer_node(&node, &[&input], Layout::Nhwc, &[&out(DType::I8)]).unwrap();
        assert_eq!(infos[0].scale_zero_point(), (1.0 / 256.0, -128));

        let mut declared = out(DType::I8);
        declared.info.quantization = Some(Quantization::per_tensor(0.1, 4));
        assert!(infer_node(&node, &[&input], Layout::Nhwc, &[&declared]).is_err());
    }

    #[test]
    fn test_relu_inherits_quantization() {
        let node = Node::new("relu", OpKind::Relu, vec![TensorId(0)], vec![TensorId(1)], NodeOptions::None);
        let mut input = activation("x", &[2, 2], DType::U8);
        input.info.quantization = Some(Quantization::per_tensor(0.5, 10));
        let infos = infer_node(&node, &[&input], Layout::Nhwc, &[&out(DType::U8)]).unwrap();
        assert_eq!(infos[0].scale_zero_point(), (0.5, 10));
    }
}
