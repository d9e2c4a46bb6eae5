use crate::compat::*;
use smallvec::SmallVec;

/// Shape represents the dimensions of a tensor.
///
/// A type-safe wrapper around dimension vectors with utilities for
/// shape manipulation and validation.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    dims: SmallVec<[usize; 8]>,
}

impl Shape {
    /// Creates a new shape from a slice of dimensions.
    #[inline]
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Creates a scalar shape (0 dimensions).
    #[inline]
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Returns the dimensions as a slice.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Converts the shape to a Vec<usize>.
    #[inline]
    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.to_vec()
    }

    /// Returns the last dimension, or None if the shape is scalar.
    #[inline]
    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Returns the number of dimensions (rank).
    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Returns the size of a specific dimension.
    #[inline]
    pub fn dim_size(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Returns the total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns true if this is a scalar (0 dimensions).
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Returns the shape obtained by reducing over `axes`, keeping the
    /// reduced dimensions with size 1.
    pub fn reduce_dims(&self, axes: &[usize]) -> Shape {
        let mut dims = self.dims.clone();
        for &axis in axes {
            if let Some(dim) = dims.get_mut(axis) {
                *dim = 1;
            }
        }
        Self { dims }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self {
            dims: SmallVec::from_vec(dims),
        }
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(&dims)
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
