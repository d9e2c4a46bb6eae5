use crate::{
    be_cpu::storage::CpuStorage,
    error::DotoriResult,
    types::{DType, Device, Layout},
};

/// Interface every device storage has to provide.
pub trait BackendStorageT: Sized {
    fn dtype(&self) -> DType;

    fn device(&self) -> Device;

    fn get_nbytes(&self) -> usize;

    fn to_cpu_storage(&self) -> DotoriResult<CpuStorage>;

    /// Owning copy converted to `dtype`.
    fn to_dtype(&self, dtype: DType) -> DotoriResult<Self>;

    /// Packed copy of the elements selected by `layout`.
    fn copy_strided(&self, layout: &Layout) -> DotoriResult<Self>;

    /// In-place element copy from `src` (same dtype, same element count).
    fn copy_from(&mut self, src: &Self) -> DotoriResult<()>;
}

pub enum BackendStorage {
    CPU(CpuStorage),
    #[cfg(feature = "cuda")]
    CUDA(crate::be_cuda::storage::CudaStorage),
}

impl BackendStorage {
    pub fn dtype(&self) -> DType {
        match self {
            Self::CPU(storage) => storage.dtype(),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => storage.dtype(),
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Self::CPU(storage) => storage.device(),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => storage.device(),
        }
    }

    pub fn get_nbytes(&self) -> usize {
        match self {
            Self::CPU(storage) => storage.get_nbytes(),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => storage.get_nbytes(),
        }
    }

    pub fn to_cpu_storage(&self) -> DotoriResult<CpuStorage> {
        match self {
            Self::CPU(storage) => storage.to_cpu_storage(),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => storage.to_cpu_storage(),
        }
    }

    pub fn to_dtype(&self, dtype: DType) -> DotoriResult<Self> {
        match self {
            Self::CPU(storage) => Ok(Self::CPU(storage.to_dtype(dtype)?)),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => Ok(Self::CUDA(storage.to_dtype(dtype)?)),
        }
    }

    pub fn copy_strided(&self, layout: &Layout) -> DotoriResult<Self> {
        match self {
            Self::CPU(storage) => Ok(Self::CPU(storage.copy_strided(layout)?)),
            #[cfg(feature = "cuda")]
            Self::CUDA(storage) => Ok(Self::CUDA(storage.copy_strided(layout)?)),
        }
    }

    pub fn copy_from(&mut self, src: &Self) -> DotoriResult<()> {
        match (self, src) {
            (Self::CPU(dst), Self::CPU(src)) => dst.copy_from(src),
            #[cfg(feature = "cuda")]
            (Self::CUDA(dst), Self::CUDA(src)) => dst.copy_from(src),
            #[cfg(feature = "cuda")]
            (dst, src) => Err(crate::error::DotoriError::DeviceMismatch {
                expected: dst.device(),
                got: src.device(),
            }),
        }
    }
}
