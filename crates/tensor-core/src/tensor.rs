// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned tensors, borrowed views and shared constant storage.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::{DType, Element, Quantization, TensorError};

fn expected_bytes(dims: &[usize], dtype: DType) -> usize {
    dims.iter().product::<usize>() * dtype.size_bytes()
}

/// An owned, concretely-shaped tensor stored as little-endian bytes.
///
/// `Tensor` carries model inputs into the engine and results back out.
/// Inside the engine, operand storage lives in the arena and is accessed
/// through [`TensorView`] / [`TensorViewMut`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    dtype: DType,
    quantization: Option<Quantization>,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, DType};
    /// let t = Tensor::zeros(vec![2, 3], DType::F32);
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn zeros(dims: Vec<usize>, dtype: DType) -> Self {
        let size = expected_bytes(&dims, dtype);
        Self {
            dims,
            dtype,
            quantization: None,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw little-endian bytes.
    pub fn from_bytes(dims: Vec<usize>, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = expected_bytes(&dims, dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            dims,
            dtype,
            quantization: None,
            data,
        })
    }

    /// Creates a tensor from typed values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Tensor;
    /// let t = Tensor::from_slice(vec![3], &[1u8, 2, 3]).unwrap();
    /// assert_eq!(t.to_vec::<u8>(), vec![1, 2, 3]);
    /// ```
    pub fn from_slice<T: Element>(dims: Vec<usize>, values: &[T]) -> Result<Self, TensorError> {
        let count: usize = dims.iter().product();
        if values.len() != count {
            return Err(TensorError::BufferSizeMismatch {
                expected: count * T::DTYPE.size_bytes(),
                actual: values.len() * T::DTYPE.size_bytes(),
            });
        }
        let mut data = vec![0u8; count * T::DTYPE.size_bytes()];
        for (i, v) in values.iter().enumerate() {
            v.store(&mut data, i);
        }
        Ok(Self {
            dims,
            dtype: T::DTYPE,
            quantization: None,
            data,
        })
    }

    /// Creates an `f32` tensor.
    pub fn from_f32(dims: Vec<usize>, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_slice(dims, values)
    }

    /// Attaches quantization parameters.
    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = Some(quantization);
        self
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn quantization(&self) -> Option<&Quantization> {
        self.quantization.as_ref()
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Decodes every element as `T`.
    ///
    /// # Panics
    /// Panics if `T` does not match the tensor's dtype.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.view().to_vec()
    }

    /// Decodes every element as a real number, dequantizing integer types.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let (scale, zp) = self
            .quantization
            .as_ref()
            .map(|q| (q.scale(), q.zero_point()))
            .unwrap_or((1.0, 0));
        let view = self.view();
        (0..self.num_elements())
            .map(|i| match self.dtype {
                DType::F32 => view.get::<f32>(i),
                DType::U8 => scale * (view.get::<u8>(i) as i32 - zp) as f32,
                DType::I8 => scale * (view.get::<i8>(i) as i32 - zp) as f32,
                DType::I16 => scale * (view.get::<i16>(i) as i32 - zp) as f32,
                DType::I32 => view.get::<i32>(i) as f32,
                DType::I64 => view.get::<i64>(i) as f32,
                DType::Bool => f32::from(u8::from(view.get::<bool>(i))),
            })
            .collect()
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            dims: &self.dims,
            dtype: self.dtype,
            data: &self.data,
        }
    }

    /// Returns a mutable view over this tensor's data.
    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorViewMut {
            dims: &self.dims,
            dtype: self.dtype,
            data: &mut self.data,
        }
    }
}

// ── Views ──────────────────────────────────────────────────────

/// An immutable, non-owning view into tensor bytes.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    dims: &'a [usize],
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Wraps `data`, checking that it holds exactly `dims` elements of `dtype`.
    pub fn new(dims: &'a [usize], dtype: DType, data: &'a [u8]) -> Result<Self, TensorError> {
        let expected = expected_bytes(dims, dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, dtype, data })
    }

    pub fn dims(&self) -> &'a [usize] {
        self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Reads element `i`.
    #[inline]
    pub fn get<T: Element>(&self, i: usize) -> T {
        debug_assert_eq!(T::DTYPE, self.dtype);
        T::load(self.data, i)
    }

    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        assert_eq!(T::DTYPE, self.dtype, "to_vec on {} tensor", self.dtype);
        (0..self.num_elements()).map(|i| self.get(i)).collect()
    }
}

/// A mutable, non-owning view into tensor bytes.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    dims: &'a [usize],
    dtype: DType,
    data: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    /// Wraps `data`, checking that it holds exactly `dims` elements of `dtype`.
    pub fn new(dims: &'a [usize], dtype: DType, data: &'a mut [u8]) -> Result<Self, TensorError> {
        let expected = expected_bytes(dims, dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, dtype, data })
    }

    pub fn dims(&self) -> &[usize] {
        self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &*self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    #[inline]
    pub fn get<T: Element>(&self, i: usize) -> T {
        debug_assert_eq!(T::DTYPE, self.dtype);
        T::load(&*self.data, i)
    }

    /// Writes element `i`.
    #[inline]
    pub fn set<T: Element>(&mut self, i: usize, v: T) {
        debug_assert_eq!(T::DTYPE, self.dtype);
        v.store(&mut *self.data, i);
    }

    /// Reborrows as an immutable view.
    pub fn as_view(&self) -> TensorView<'_> {
        TensorView {
            dims: self.dims,
            dtype: self.dtype,
            data: &*self.data,
        }
    }
}

// ── Constant storage ───────────────────────────────────────────

/// Immutable bytes of a constant tensor.
///
/// Constants either own their bytes or borrow a range of a shared backing
/// store (typically a memory-mapped weight file). Cloning is cheap.
#[derive(Clone)]
pub struct ConstantData {
    backing: Arc<dyn AsRef<[u8]> + Send + Sync>,
    range: Range<usize>,
}

impl ConstantData {
    /// Owns `bytes` directly.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            backing: Arc::new(bytes),
            range: 0..len,
        }
    }

    /// Encodes typed values.
    pub fn from_values<T: Element>(values: &[T]) -> Self {
        let mut bytes = vec![0u8; values.len() * T::DTYPE.size_bytes()];
        for (i, v) in values.iter().enumerate() {
            v.store(&mut bytes, i);
        }
        Self::from_vec(bytes)
    }

    /// Borrows `range` of a shared backing store.
    pub fn shared(
        backing: Arc<dyn AsRef<[u8]> + Send + Sync>,
        range: Range<usize>,
    ) -> Result<Self, TensorError> {
        let total = AsRef::<[u8]>::as_ref(&*backing).len();
        if range.start > range.end || range.end > total {
            return Err(TensorError::BufferSizeMismatch {
                expected: range.end,
                actual: total,
            });
        }
        Ok(Self { backing, range })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &AsRef::<[u8]>::as_ref(&*self.backing)[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Reads element `i` as `T`.
    pub fn read<T: Element>(&self, i: usize) -> T {
        T::load(self.as_bytes(), i)
    }

    /// Decodes an integer operand of type `dtype` into `i64` values.
    ///
    /// Used for shape-like operands (target shapes, permutations, slice
    /// bounds, reduction axes).
    pub fn to_i64_vec(&self, dtype: DType) -> Result<Vec<i64>, TensorError> {
        let n = self.len() / dtype.size_bytes();
        let bytes = self.as_bytes();
        let values = match dtype {
            DType::I32 => (0..n).map(|i| i32::load(bytes, i) as i64).collect(),
            DType::I64 => (0..n).map(|i| i64::load(bytes, i)).collect(),
            DType::U8 => (0..n).map(|i| u8::load(bytes, i) as i64).collect(),
            DType::I8 => (0..n).map(|i| i8::load(bytes, i) as i64).collect(),
            DType::I16 => (0..n).map(|i| i16::load(bytes, i) as i64).collect(),
            other => {
                return Err(TensorError::UnsupportedDType {
                    op: "integer operand",
                    dtype: other,
                })
            }
        };
        Ok(values)
    }
}

impl fmt::Debug for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantData")
            .field("len", &self.len())
            .finish()
    }
}

impl PartialEq for ConstantData {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(vec![3, 4], DType::F32);
        assert_eq!(t.num_elements(), 12);
        assert_eq!(t.size_bytes(), 48);
        assert!(t.to_vec::<f32>().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_slice_size_mismatch() {
        assert!(Tensor::from_f32(vec![2, 3], &[1.0, 2.0]).is_err());
        assert!(Tensor::from_bytes(vec![2], DType::I16, vec![0; 3]).is_err());
    }

    #[test]
    fn test_dequantized_readback() {
        let t = Tensor::from_slice(vec![3], &[128u8, 130, 126])
            .unwrap()
            .with_quantization(Quantization::per_tensor(0.5, 128));
        assert_eq!(t.to_f32_vec(), vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_view_mut_writes_through() {
        let mut t = Tensor::zeros(vec![2], DType::I32);
        t.view_mut().set(1, -7i32);
        assert_eq!(t.to_vec::<i32>(), vec![0, -7]);
    }

    #[test]
    fn test_shared_constant_range() {
        let backing: Arc<dyn AsRef<[u8]> + Send + Sync> = Arc::new(vec![0u8, 1, 2, 3, 4, 5, 6, 7]);
        let c = ConstantData::shared(backing.clone(), 4..8).unwrap();
        assert_eq!(c.as_bytes(), &[4, 5, 6, 7]);
        assert!(ConstantData::shared(backing, 4..9).is_err());
    }

    #[test]
    fn test_to_i64_vec() {
        let c = ConstantData::from_values(&[1i32, -1, 4]);
        assert_eq!(c.to_i64_vec(DType::I32).unwrap(), vec![1, -1, 4]);
        assert!(c.to_i64_vec(DType::F32).is_err());
    }
}
