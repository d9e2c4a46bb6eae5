use crate::{
    be::storage::BackendStorage,
    compat::*,
    error::{DotoriError, DotoriResult},
    types::{DType, Device, Layout, Shape},
};

/// A device-resident n-dimensional array.
///
/// A tensor is a layout over shared storage. Clones and views share the
/// same storage, so an in-place update performed through one view is
/// observed by every other view of that storage.
pub struct Tensor {
    storage: Arc<RwLock<BackendStorage>>,
    layout: Layout,
}

impl Clone for Tensor {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            layout: self.layout.clone(),
        }
    }
}

impl AsRef<Tensor> for Tensor {
    fn as_ref(&self) -> &Tensor {
        self
    }
}

pub(crate) fn from_storage(storage: BackendStorage, layout: Layout) -> Tensor {
    Tensor {
        storage: Arc::new(RwLock::new(storage)),
        layout,
    }
}

impl Tensor {
    pub(crate) fn share_with_layout(&self, layout: Layout) -> Tensor {
        Tensor {
            storage: Arc::clone(&self.storage),
            layout,
        }
    }

    pub(crate) fn with_storage<R>(&self, f: impl FnOnce(&BackendStorage) -> DotoriResult<R>) -> DotoriResult<R> {
        #[cfg(feature = "std")]
        {
            let storage = self.storage.read()?;
            f(&storage)
        }
        #[cfg(not(feature = "std"))]
        {
            let storage = self.storage.read();
            f(&storage)
        }
    }

    pub(crate) fn with_storage_mut<R>(
        &self,
        f: impl FnOnce(&mut BackendStorage) -> DotoriResult<R>,
    ) -> DotoriResult<R> {
        #[cfg(feature = "std")]
        {
            let mut storage = self.storage.write()?;
            f(&mut storage)
        }
        #[cfg(not(feature = "std"))]
        {
            let mut storage = self.storage.write();
            f(&mut storage)
        }
    }

    /// True if both tensors are views of the same storage.
    pub fn shares_storage_with(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> Shape {
        self.layout.shape().clone()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn offset(&self) -> usize {
        self.layout.offset()
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    pub fn dtype(&self) -> DType {
        self.with_storage(|storage| Ok(storage.dtype())).unwrap_or(DType::F32)
    }

    pub fn device(&self) -> Device {
        self.with_storage(|storage| Ok(storage.device())).unwrap_or(Device::CPU)
    }

    pub fn get_nbytes(&self) -> usize {
        self.size() * self.dtype().get_size_in_bytes()
    }

    /// Non-owning view with a new shape.
    ///
    /// Shares storage when the tensor is contiguous; otherwise the
    /// elements are materialized first.
    pub fn reshape(&self, shape: impl Into<Shape>) -> DotoriResult<Tensor> {
        let shape = shape.into();
        if shape.size() != self.size() {
            return Err(DotoriError::SizeMismatch {
                expected: self.size(),
                got: shape.size(),
            });
        }

        if !self.is_contiguous() {
            let contiguous = self.contiguous()?;
            return contiguous.reshape(shape);
        }

        Ok(self.share_with_layout(Layout::from_shape(shape)))
    }

    /// Non-owning broadcast view (stride-0 on expanded dimensions).
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> DotoriResult<Tensor> {
        let layout = self.layout.broadcast_to(&shape.into())?;
        Ok(self.share_with_layout(layout))
    }

    /// Owning copy converted to `dtype`, or the same tensor when the
    /// dtype already matches.
    pub fn to_dtype(&self, dtype: DType) -> DotoriResult<Tensor> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        if !self.is_contiguous() {
            let contiguous = self.contiguous()?;
            return contiguous.to_dtype(dtype);
        }

        let storage = self.with_storage(|storage| storage.to_dtype(dtype))?;
        Ok(from_storage(storage, Layout::from_shape(self.shape())))
    }

    /// Packed copy, or the same tensor when it is already contiguous.
    pub fn contiguous(&self) -> DotoriResult<Tensor> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }

        let storage = self.with_storage(|storage| storage.copy_strided(&self.layout))?;
        Ok(from_storage(storage, Layout::from_shape(self.shape())))
    }

    /// In-place element copy from `src` into this tensor's storage.
    ///
    /// Both tensors must be contiguous, with matching dtype and element
    /// count. This is the device-to-device copy used to write reconciled
    /// statistics back into caller-owned buffers.
    pub fn copy_from_(&self, src: &Tensor) -> DotoriResult<()> {
        if self.shares_storage_with(src) {
            return Ok(());
        }

        src.with_storage(|src_storage| self.with_storage_mut(|dst_storage| dst_storage.copy_from(src_storage)))
    }

    /// Reads the tensor's elements as f64, in row-major order.
    pub fn to_f64_vec(&self) -> DotoriResult<Vec<f64>> {
        self.with_storage(|storage| storage.to_cpu_storage()?.to_f64_vec(&self.layout))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor[shape={:?}, dtype={:?}, device={:?}]",
            self.layout.shape(),
            self.dtype(),
            self.device()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_dtype_shares_storage_when_dtype_matches() {
        let t = Tensor::ones([3], DType::F32, Device::CPU).unwrap();
        let same = t.to_dtype(DType::F32).unwrap();
        assert!(same.shares_storage_with(&t));

        let widened = t.to_dtype(DType::F64).unwrap();
        assert!(!widened.shares_storage_with(&t));
        assert_eq!(widened.dtype(), DType::F64);
    }

    #[test]
    fn contiguous_is_a_no_op_on_packed_tensors() {
        let t = Tensor::ones([2, 3], DType::F32, Device::CPU).unwrap();
        assert!(t.contiguous().unwrap().shares_storage_with(&t));

        let broadcast = Tensor::ones([1], DType::F32, Device::CPU)
            .unwrap()
            .broadcast_to([4])
            .unwrap();
        assert!(!broadcast.is_contiguous());
        let packed = broadcast.contiguous().unwrap();
        assert!(packed.is_contiguous());
        assert_eq!(packed.to_f64_vec().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn in_place_copy_is_visible_through_other_views() {
        let dst = Tensor::zeros([4], DType::F32, Device::CPU).unwrap();
        let alias = dst.clone();
        let src = Tensor::ones([4], DType::F32, Device::CPU).unwrap();

        dst.copy_from_(&src).unwrap();
        assert_eq!(alias.to_f64_vec().unwrap(), vec![1.0; 4]);
    }
}
