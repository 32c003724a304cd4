// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shapes.
//!
//! Dimensions are listed innermost first: `dims()[0]` is the contiguous
//! row length, so a `[64, 8]` f32 shape is 8 rows of 64 floats.

use crate::DType;
use std::fmt;

/// Maximum number of dimensions a tensor can have.
pub const MAX_DIMS: usize = 4;

/// Describes the extent of a tensor in up to [`MAX_DIMS`] dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct Shape {
    ne: [usize; MAX_DIMS],
    rank: usize,
}

impl Shape {
    /// Creates a shape from its dimensions, innermost first.
    ///
    /// Dimensions beyond [`MAX_DIMS`] are folded into the outermost one.
    ///
    /// # Examples
    /// ```
    /// use compute_graph::Shape;
    /// let s = Shape::new(&[64, 8]);
    /// assert_eq!(s.rank(), 2);
    /// assert_eq!(s.num_elements(), 512);
    /// ```
    pub fn new(dims: &[usize]) -> Self {
        let mut ne = [1; MAX_DIMS];
        for (i, &d) in dims.iter().enumerate() {
            if i < MAX_DIMS {
                ne[i] = d;
            } else {
                ne[MAX_DIMS - 1] *= d;
            }
        }
        Self {
            ne,
            rank: dims.len().min(MAX_DIMS),
        }
    }

    /// A 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self::new(&[len])
    }

    /// A 2-D shape of `rows` rows, each `row_len` elements long.
    pub fn matrix(row_len: usize, rows: usize) -> Self {
        Self::new(&[row_len, rows])
    }

    /// Number of dimensions as given at construction.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The dimensions, innermost first.
    pub fn dims(&self) -> &[usize] {
        &self.ne[..self.rank]
    }

    /// All four extents, padded with 1.
    pub fn ne(&self) -> [usize; MAX_DIMS] {
        self.ne
    }

    /// Total number of elements. A rank-0 shape holds one element.
    pub fn num_elements(&self) -> usize {
        self.ne.iter().product()
    }

    /// Number of rows (product of every dimension but the innermost).
    pub fn num_rows(&self) -> usize {
        self.ne[1..].iter().product()
    }

    /// Bytes needed to store a contiguous tensor of this shape.
    pub fn size_bytes(&self, dtype: DType) -> usize {
        dtype.row_size(self.ne[0]) * self.num_rows()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(&dims)
    }
}

impl From<Shape> for Vec<usize> {
    fn from(shape: Shape) -> Self {
        shape.dims().to_vec()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
