// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors with partially-known dimensions.

use std::fmt;

/// Highest rank the reference kernels index without allocating.
pub const MAX_RANK: usize = 8;

/// A single dimension of a [`Shape`].
///
/// A dimension is `Unknown` when it cannot be determined before execution
/// (typically the batch dimension of a model input).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Known(usize),
    Unknown,
}

impl Dim {
    /// Returns the concrete extent, if known.
    pub fn known(self) -> Option<usize> {
        match self {
            Dim::Known(n) => Some(n),
            Dim::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Dim::Known(_))
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Known(n)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Known(n) => write!(f, "{n}"),
            Dim::Unknown => write!(f, "?"),
        }
    }
}

/// Describes the dimensionality of a tensor.
///
/// Each dimension is either a known extent or unknown. Shapes serialize as
/// integer arrays where `-1` marks an unknown dimension, matching the model
/// manifest format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct Shape {
    dims: Vec<Dim>,
}

impl Shape {
    /// Creates a fully-known shape from the given extents.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), Some(24));
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self {
            dims: dims.into_iter().map(Dim::Known).collect(),
        }
    }

    /// Creates a shape from possibly-unknown dimensions.
    pub fn from_dims(dims: Vec<Dim>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    /// Returns dimension `index`, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<Dim> {
        self.dims.get(index).copied()
    }

    /// Returns `true` when every dimension is known.
    pub fn is_fully_known(&self) -> bool {
        self.dims.iter().all(|d| d.is_known())
    }

    /// Returns the total number of elements, or `None` if any dimension is unknown.
    ///
    /// For a scalar shape (rank 0), returns `Some(1)`.
    pub fn num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, d| d.known().map(|n| acc * n))
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`].
    pub fn size_bytes(&self, dtype: super::DType) -> Option<usize> {
        self.num_elements().map(|n| n * dtype.size_bytes())
    }

    /// Returns the concrete extents if every dimension is known.
    pub fn to_concrete(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(|d| d.known()).collect()
    }

    /// Returns a copy with dimension `index` replaced.
    pub fn with_dim(&self, index: usize, dim: Dim) -> Self {
        let mut dims = self.dims.clone();
        if let Some(slot) = dims.get_mut(index) {
            *slot = dim;
        }
        Self { dims }
    }

    /// Returns `true` if `concrete` is a valid instantiation of this shape:
    /// same rank, and every known dimension matches.
    pub fn accepts(&self, concrete: &[usize]) -> bool {
        self.dims.len() == concrete.len()
            && self
                .dims
                .iter()
                .zip(concrete)
                .all(|(d, &c)| d.known().map_or(true, |n| n == c))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl TryFrom<Vec<i64>> for Shape {
    type Error = String;

    fn try_from(raw: Vec<i64>) -> Result<Self, Self::Error> {
        let dims = raw
            .into_iter()
            .map(|d| match d {
                -1 => Ok(Dim::Unknown),
                n if n >= 0 => Ok(Dim::Known(n as usize)),
                n => Err(format!("invalid dimension {n}")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { dims })
    }
}

impl From<Shape> for Vec<i64> {
    fn from(shape: Shape) -> Self {
        shape
            .dims
            .iter()
            .map(|d| match d {
                Dim::Known(n) => *n as i64,
                Dim::Unknown => -1,
            })
            .collect()
    }
}
