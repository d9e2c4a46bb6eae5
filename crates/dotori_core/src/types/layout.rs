use crate::{
    compat::*,
    error::{DotoriError, DotoriResult},
    types::Shape,
};

#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    offset: usize,
}

impl Layout {
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Self { shape, strides, offset }
    }

    pub fn from_shape(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let strides = Self::compute_strides(shape.dims());
        Self {
            shape,
            strides,
            offset: 0,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    pub fn is_contiguous(&self) -> bool {
        if self.ndim() == 0 {
            return true;
        }

        let mut expected_stride = 1;
        for i in (0..self.ndim()).rev() {
            if self.strides[i] != expected_stride {
                return false;
            }
            expected_stride *= self.shape.dims()[i];
        }

        true
    }

    pub(crate) fn compute_strides(dims: &[usize]) -> Vec<usize> {
        if dims.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }
        strides
    }

    pub fn broadcast_to(&self, target: &Shape) -> DotoriResult<Self> {
        let dims = self.shape.dims();
        let target_dims = target.dims();

        if dims.len() > target_dims.len() {
            return Err(DotoriError::IncompatibleShapes {
                lhs: self.shape.clone(),
                rhs: target.clone(),
                op: "broadcast",
            });
        }

        let rank_diff = target_dims.len() - dims.len();
        let mut new_strides = vec![0; target_dims.len()];

        for i in 0..target_dims.len() {
            let src_dim = if i < rank_diff { 1 } else { dims[i - rank_diff] };
            let tgt_dim = target_dims[i];

            if src_dim == tgt_dim {
                new_strides[i] = if i < rank_diff { 0 } else { self.strides[i - rank_diff] };
            } else if src_dim == 1 {
                new_strides[i] = 0;
            } else {
                return Err(DotoriError::IncompatibleShapes {
                    lhs: self.shape.clone(),
                    rhs: target.clone(),
                    op: "broadcast",
                });
            }
        }

        Ok(Self {
            shape: target.clone(),
            strides: new_strides,
            offset: self.offset,
        })
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout[shape={:?}, strides={:?}, offset={}]",
            self.shape, self.strides, self.offset
        )
    }
}
