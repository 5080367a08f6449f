// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory orderings of rank-4 activation tensors.

use crate::{Dim, Shape};

/// Element ordering of a 4-D tensor in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Channel-last: `[batch, height, width, channel]`.
    #[default]
    Nhwc,
    /// Channel-first: `[batch, channel, height, width]`.
    Nchw,
}

/// Logical extents of a 4-D activation, independent of layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent4 {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub depth: usize,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Nhwc => "nhwc",
            Layout::Nchw => "nchw",
        }
    }

    /// Axis index of the height dimension.
    pub fn height_axis(self) -> usize {
        match self {
            Layout::Nhwc => 1,
            Layout::Nchw => 2,
        }
    }

    /// Axis index of the width dimension.
    pub fn width_axis(self) -> usize {
        match self {
            Layout::Nhwc => 2,
            Layout::Nchw => 3,
        }
    }

    /// Axis index of the channel dimension.
    pub fn channel_axis(self) -> usize {
        match self {
            Layout::Nhwc => 3,
            Layout::Nchw => 1,
        }
    }

    /// Permutation that converts a tensor in `self` ordering into `target`
    /// ordering, in the transpose convention `out[i] = in[perm[i]]`.
    pub fn permutation_to(self, target: Layout) -> [usize; 4] {
        match (self, target) {
            (Layout::Nhwc, Layout::Nchw) => [0, 3, 1, 2],
            (Layout::Nchw, Layout::Nhwc) => [0, 2, 3, 1],
            _ => [0, 1, 2, 3],
        }
    }

    /// Reorders a rank-4 shape from `self` into `target`. Other ranks are
    /// returned unchanged.
    pub fn permute_shape(self, shape: &Shape, target: Layout) -> Shape {
        if shape.rank() != 4 {
            return shape.clone();
        }
        let perm = self.permutation_to(target);
        let dims: Vec<Dim> = perm.iter().map(|&p| shape.dims()[p]).collect();
        Shape::from_dims(dims)
    }

    /// Reads the logical extents from concrete rank-4 dims.
    pub fn extent(self, dims: &[usize]) -> Extent4 {
        Extent4 {
            batch: dims[0],
            height: dims[self.height_axis()],
            width: dims[self.width_axis()],
            depth: dims[self.channel_axis()],
        }
    }

    /// Builds concrete dims in this ordering from logical extents.
    pub fn dims_of(self, e: Extent4) -> [usize; 4] {
        match self {
            Layout::Nhwc => [e.batch, e.height, e.width, e.depth],
            Layout::Nchw => [e.batch, e.depth, e.height, e.width],
        }
    }

    /// Flat element offset of `(b, y, x, c)` in a tensor of extents `e`.
    #[inline]
    pub fn offset(self, e: &Extent4, b: usize, y: usize, x: usize, c: usize) -> usize {
        match self {
            Layout::Nhwc => ((b * e.height + y) * e.width + x) * e.depth + c,
            Layout::Nchw => ((b * e.depth + c) * e.height + y) * e.width + x,
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
