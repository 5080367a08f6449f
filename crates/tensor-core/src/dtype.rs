// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

/// Enumerates the element types a tensor can hold.
///
/// The engine uses `DType` to size arena slots and to select the numeric
/// path (floating point vs. affine fixed point) inside each kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 8-bit unsigned integer (asymmetric quantized activations and weights).
    U8,
    /// 8-bit signed integer (quantized activations, per-axis weights).
    I8,
    /// 16-bit signed integer (symmetric 16-bit fixed point).
    I16,
    /// 32-bit signed integer (biases, shape operands, indices).
    I32,
    /// 64-bit signed integer (shape operands).
    I64,
    /// Boolean stored as one byte.
    Bool,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::U8 => 1,
            DType::I8 => 1,
            DType::I16 => 2,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::Bool => 1,
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::Bool => "bool",
        }
    }

    /// Parses a dtype from a manifest string (`"float32"`, `"uint8"`, `"i8"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" | "float" => Some(DType::F32),
            "u8" | "uint8" => Some(DType::U8),
            "i8" | "int8" => Some(DType::I8),
            "i16" | "int16" => Some(DType::I16),
            "i32" | "int32" => Some(DType::I32),
            "i64" | "int64" => Some(DType::I64),
            "bool" | "boolean" => Some(DType::Bool),
            _ => None,
        }
    }

    /// Returns `true` for the integer types that carry affine quantization.
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::U8 | DType::I8 | DType::I16)
    }

    /// Returns the representable `[min, max]` range of an integer type.
    ///
    /// Returns `None` for `F32` and `Bool`.
    pub fn integer_range(self) -> Option<(i32, i32)> {
        match self {
            DType::U8 => Some((u8::MIN as i32, u8::MAX as i32)),
            DType::I8 => Some((i8::MIN as i32, i8::MAX as i32)),
            DType::I16 => Some((i16::MIN as i32, i16::MAX as i32)),
            DType::I32 => Some((i32::MIN, i32::MAX)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(DType::parse("float32"), Some(DType::F32));
        assert_eq!(DType::parse("UINT8"), Some(DType::U8));
        assert_eq!(DType::parse("int16"), Some(DType::I16));
        assert_eq!(DType::parse("complex64"), None);
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(DType::U8.integer_range(), Some((0, 255)));
        assert_eq!(DType::I8.integer_range(), Some((-128, 127)));
        assert_eq!(DType::F32.integer_range(), None);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DType::I16).unwrap();
        assert_eq!(json, "\"i16\"");
    }
}
