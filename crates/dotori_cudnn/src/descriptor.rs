use crate::error::{check, Result};
use cudarc::cudnn::sys;

/// RAII wrapper around a rank-4 `cudnnTensorDescriptor_t`.
pub struct TensorDescriptor {
    desc: sys::cudnnTensorDescriptor_t,
}

unsafe impl Send for TensorDescriptor {}
unsafe impl Sync for TensorDescriptor {}

impl TensorDescriptor {
    fn create() -> Result<Self> {
        let mut desc: sys::cudnnTensorDescriptor_t = std::ptr::null_mut();
        unsafe {
            check(sys::cudnnCreateTensorDescriptor(&mut desc), "cudnnCreateTensorDescriptor")?;
        }
        Ok(Self { desc })
    }

    /// Packed NCHW descriptor.
    pub fn new_4d(data_type: sys::cudnnDataType_t, n: i32, c: i32, h: i32, w: i32) -> Result<Self> {
        let desc = Self::create()?;
        unsafe {
            check(
                sys::cudnnSetTensor4dDescriptor(
                    desc.desc,
                    sys::cudnnTensorFormat_t::CUDNN_TENSOR_NCHW,
                    data_type,
                    n,
                    c,
                    h,
                    w,
                ),
                "cudnnSetTensor4dDescriptor",
            )?;
        }
        Ok(desc)
    }

    /// Descriptor for batch-normalization parameters, derived by cuDNN
    /// from the input descriptor and mode. The derived descriptor also
    /// fixes the parameter dtype; query it with [`TensorDescriptor::data_type`].
    pub fn derive_bn(x_desc: &TensorDescriptor, mode: sys::cudnnBatchNormMode_t) -> Result<Self> {
        let desc = Self::create()?;
        unsafe {
            check(
                sys::cudnnDeriveBNTensorDescriptor(desc.desc, x_desc.desc, mode),
                "cudnnDeriveBNTensorDescriptor",
            )?;
        }
        Ok(desc)
    }

    /// Element type the descriptor carries.
    pub fn data_type(&self) -> Result<sys::cudnnDataType_t> {
        let mut data_type = sys::cudnnDataType_t::CUDNN_DATA_FLOAT;
        let (mut n, mut c, mut h, mut w) = (0i32, 0i32, 0i32, 0i32);
        let (mut n_stride, mut c_stride, mut h_stride, mut w_stride) = (0i32, 0i32, 0i32, 0i32);
        unsafe {
            check(
                sys::cudnnGetTensor4dDescriptor(
                    self.desc,
                    &mut data_type,
                    &mut n,
                    &mut c,
                    &mut h,
                    &mut w,
                    &mut n_stride,
                    &mut c_stride,
                    &mut h_stride,
                    &mut w_stride,
                ),
                "cudnnGetTensor4dDescriptor",
            )?;
        }
        Ok(data_type)
    }

    pub fn raw(&self) -> sys::cudnnTensorDescriptor_t {
        self.desc
    }
}

impl Drop for TensorDescriptor {
    fn drop(&mut self) {
        if !self.desc.is_null() {
            unsafe {
                sys::cudnnDestroyTensorDescriptor(self.desc);
            }
        }
    }
}
