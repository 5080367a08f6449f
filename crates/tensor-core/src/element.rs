// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed element access over unaligned little-endian byte buffers.

use crate::DType;

/// A scalar type that can live in a tensor buffer.
pub trait Element: Copy + Default + PartialOrd + Send + Sync + 'static {
    const DTYPE: DType;

    /// Reads element `i` from `bytes`.
    fn load(bytes: &[u8], i: usize) -> Self;

    /// Writes `self` as element `i` of `bytes`.
    fn store(self, bytes: &mut [u8], i: usize);
}

/// Integer element types that carry affine quantization.
pub trait QuantizedElement: Element {
    fn to_i32(self) -> i32;
    fn from_i32_saturating(v: i32) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn load(bytes: &[u8], i: usize) -> Self {
                const N: usize = std::mem::size_of::<$t>();
                let mut raw = [0u8; N];
                raw.copy_from_slice(&bytes[i * N..(i + 1) * N]);
                <$t>::from_le_bytes(raw)
            }

            #[inline]
            fn store(self, bytes: &mut [u8], i: usize) {
                const N: usize = std::mem::size_of::<$t>();
                bytes[i * N..(i + 1) * N].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(f32, DType::F32);
impl_element!(u8, DType::U8);
impl_element!(i8, DType::I8);
impl_element!(i16, DType::I16);
impl_element!(i32, DType::I32);
impl_element!(i64, DType::I64);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn load(bytes: &[u8], i: usize) -> Self {
        bytes[i] != 0
    }

    #[inline]
    fn store(self, bytes: &mut [u8], i: usize) {
        bytes[i] = u8::from(self);
    }
}

macro_rules! impl_quantized {
    ($t:ty) => {
        impl QuantizedElement for $t {
            #[inline]
            fn to_i32(self) -> i32 {
                self as i32
            }

            #[inline]
            fn from_i32_saturating(v: i32) -> Self {
                v.clamp(<$t>::MIN as i32, <$t>::MAX as i32) as $t
            }
        }
    };
}

impl_quantized!(u8);
impl_quantized!(i8);
impl_quantized!(i16);
