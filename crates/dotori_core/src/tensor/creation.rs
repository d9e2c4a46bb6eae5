use super::core::{from_storage, Tensor};
use crate::{
    be::storage::BackendStorage,
    be_cpu::storage::{CpuStorage, WithDType},
    compat::*,
    error::{DotoriError, DotoriResult},
    types::{DType, Device, Layout, Shape},
};

fn storage_on_device(cpu_storage: CpuStorage, device: Device) -> DotoriResult<BackendStorage> {
    match device {
        Device::CPU => Ok(BackendStorage::CPU(cpu_storage)),
        #[cfg(feature = "cuda")]
        Device::CUDA(device_id) => Ok(BackendStorage::CUDA(
            crate::be_cuda::storage::CudaStorage::from_cpu_storage(&cpu_storage, device_id)?,
        )),
    }
}

impl Tensor {
    /// Tensor from a flat vector of elements, laid out contiguously.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: impl Into<Shape>, device: Device) -> DotoriResult<Self> {
        let shape = shape.into();
        if shape.size() != data.len() {
            return Err(DotoriError::SizeMismatch {
                expected: shape.size(),
                got: data.len(),
            });
        }

        let storage = storage_on_device(CpuStorage::from_vec(data), device)?;
        Ok(from_storage(storage, Layout::from_shape(shape)))
    }

    /// Tensor with every element set to `value` converted into `dtype`.
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64, device: Device) -> DotoriResult<Self> {
        let shape = shape.into();
        let storage = storage_on_device(CpuStorage::filled(dtype, shape.size(), value), device)?;
        Ok(from_storage(storage, Layout::from_shape(shape)))
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: Device) -> DotoriResult<Self> {
        Self::full(shape, dtype, 0.0, device)
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: Device) -> DotoriResult<Self> {
        Self::full(shape, dtype, 1.0, device)
    }

    /// Zero-filled tensor with the same shape, dtype and device as `self`.
    pub fn zeros_like(&self) -> DotoriResult<Self> {
        Self::zeros(self.shape(), self.dtype(), self.device())
    }
}
