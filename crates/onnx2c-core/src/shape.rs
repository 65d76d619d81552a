// Copyright (c) ONNX Project Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tensor shapes.
//!
//! Unlike a general-purpose ONNX IR, this compiler never carries a symbolic
//! dimension past the loader boundary: every `dim_param` is resolved to a
//! concrete extent (an explicit `dim_value`, a user-supplied `dim_defines`
//! binding, or a default of 1 with a warning — see `loader::resolve_dim`)
//! before a `Shape` is ever constructed. A `Shape` is therefore just an
//! ordered list of concrete, non-negative extents: the "no dynamic shapes at
//! inference time" Non-goal holds by construction, not by a runtime check.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from concrete dimensions.
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Self {
        Shape {
            dims: dims.into_iter().collect(),
        }
    }

    /// Creates an empty shape (scalar).
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Returns the dimensions of the shape.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of dimensions) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    /// Returns true if this is a scalar (rank 0).
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total element count (1 for a scalar).
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.dims
    }

    /// Resolves a (possibly negative, ONNX-style) axis index into `0..rank`.
    pub fn resolve_axis(&self, axis: i64) -> Option<usize> {
        let rank = self.rank() as i64;
        let a = if axis < 0 { axis + rank } else { axis };
        if a < 0 || a >= rank {
            None
        } else {
            Some(a as usize)
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl FromIterator<usize> for Shape {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Shape::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let shape = Shape::new(vec![1, 2, 3]);
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.dims(), &[1, 2, 3]);

        let scalar = Shape::scalar();
        assert!(scalar.is_scalar());
        assert_eq!(scalar.rank(), 0);
    }

    #[test]
    fn test_shape_size() {
        let shape = Shape::new(vec![2, 3, 4]);
        assert_eq!(shape.size(), 24);

        let scalar = Shape::scalar();
        assert_eq!(scalar.size(), 1);
    }

    #[test]
    fn test_resolve_axis_handles_negative() {
        let shape = Shape::new(vec![1, 2, 3]);
        assert_eq!(shape.resolve_axis(-1), Some(2));
        assert_eq!(shape.resolve_axis(0), Some(0));
        assert_eq!(shape.resolve_axis(-4), None);
        assert_eq!(shape.resolve_axis(3), None);
    }
}
