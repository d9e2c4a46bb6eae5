use crate::{
    be::storage::BackendStorageT,
    be_cpu::storage::CpuStorage,
    be_cuda::device::CudaDevice,
    compat::*,
    error::{DotoriError, DotoriResult},
    types::{DType, Device, Layout},
};
use dotori_cudnn::cudarc::driver::{CudaSlice, CudaStream, DevicePtr};
use half::{bf16, f16};

pub struct CudaStorage {
    pub(crate) device_id: usize,
    pub(crate) device: Arc<CudaDevice>,
    pub(crate) data: CudaStorageData,
}

/// Only the float dtypes the normalization backend understands have a
/// CUDA representation.
pub enum CudaStorageData {
    BF16(CudaSlice<bf16>),
    F16(CudaSlice<f16>),
    F32(CudaSlice<f32>),
    F64(CudaSlice<f64>),
}

impl CudaStorage {
    pub fn new(device_id: usize, device: Arc<CudaDevice>, data: CudaStorageData) -> Self {
        Self {
            device_id,
            device,
            data,
        }
    }

    pub fn from_cpu_storage(cpu_storage: &CpuStorage, device_id: usize) -> DotoriResult<Self> {
        let device = CudaDevice::get(device_id)?;
        let data = match cpu_storage {
            CpuStorage::BF16(data) => CudaStorageData::BF16(device.new_buffer_with_data(data)?),
            CpuStorage::F16(data) => CudaStorageData::F16(device.new_buffer_with_data(data)?),
            CpuStorage::F32(data) => CudaStorageData::F32(device.new_buffer_with_data(data)?),
            CpuStorage::F64(data) => CudaStorageData::F64(device.new_buffer_with_data(data)?),
            _ => {
                return Err(DotoriError::UnsupportedDTypeForDevice {
                    dtype: cpu_storage.dtype(),
                    device: Device::CUDA(device_id),
                })
            },
        };
        Ok(Self::new(device_id, device, data))
    }

    pub fn len(&self) -> usize {
        match &self.data {
            CudaStorageData::BF16(data) => data.len(),
            CudaStorageData::F16(data) => data.len(),
            CudaStorageData::F32(data) => data.len(),
            CudaStorageData::F64(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Raw device pointer for kernel calls, with its use recorded on
    /// `stream`.
    pub(crate) fn device_ptr(&self, stream: &CudaStream) -> u64 {
        match &self.data {
            CudaStorageData::BF16(data) => data.device_ptr(stream).0,
            CudaStorageData::F16(data) => data.device_ptr(stream).0,
            CudaStorageData::F32(data) => data.device_ptr(stream).0,
            CudaStorageData::F64(data) => data.device_ptr(stream).0,
        }
    }
}

impl BackendStorageT for CudaStorage {
    fn dtype(&self) -> DType {
        match &self.data {
            CudaStorageData::BF16(_) => DType::BF16,
            CudaStorageData::F16(_) => DType::F16,
            CudaStorageData::F32(_) => DType::F32,
            CudaStorageData::F64(_) => DType::F64,
        }
    }

    fn device(&self) -> Device {
        Device::CUDA(self.device_id)
    }

    fn get_nbytes(&self) -> usize {
        self.len() * self.dtype().get_size_in_bytes()
    }

    fn to_cpu_storage(&self) -> DotoriResult<CpuStorage> {
        let stream = self.device.context().default_stream();

        macro_rules! dtoh {
            ($data:expr, $variant:ident, $zero:expr) => {{
                let mut host = vec![$zero; $data.len()];
                stream
                    .memcpy_dtoh($data, &mut host)
                    .map_err(|e| DotoriError::BackendError(format!("CUDA memcpy_dtoh failed: {:?}", e)))?;
                Ok(CpuStorage::$variant(host))
            }};
        }

        match &self.data {
            CudaStorageData::BF16(data) => dtoh!(data, BF16, bf16::from_f32(0.0)),
            CudaStorageData::F16(data) => dtoh!(data, F16, f16::from_f32(0.0)),
            CudaStorageData::F32(data) => dtoh!(data, F32, 0f32),
            CudaStorageData::F64(data) => dtoh!(data, F64, 0f64),
        }
    }

    // Casts run through the host. They only happen on parameter-sized
    // buffers during dtype reconciliation.
    fn to_dtype(&self, dtype: DType) -> DotoriResult<Self> {
        if self.dtype() == dtype {
            return self.to_cpu_storage().and_then(|cpu| Self::from_cpu_storage(&cpu, self.device_id));
        }
        let cpu_storage = self.to_cpu_storage()?.to_dtype(dtype)?;
        Self::from_cpu_storage(&cpu_storage, self.device_id)
    }

    fn copy_strided(&self, layout: &Layout) -> DotoriResult<Self> {
        let cpu_storage = self.to_cpu_storage()?.copy_strided(layout)?;
        Self::from_cpu_storage(&cpu_storage, self.device_id)
    }

    fn copy_from(&mut self, src: &Self) -> DotoriResult<()> {
        if self.len() != src.len() {
            return Err(DotoriError::SizeMismatch {
                expected: self.len(),
                got: src.len(),
            });
        }

        let expected = self.dtype();
        let got = src.dtype();
        let stream = self.device.context().default_stream();

        macro_rules! dtod {
            ($dst:expr, $src:expr) => {
                stream
                    .memcpy_dtod($src, $dst)
                    .map_err(|e| DotoriError::BackendError(format!("CUDA memcpy_dtod failed: {:?}", e)))
            };
        }

        match (&mut self.data, &src.data) {
            (CudaStorageData::BF16(dst), CudaStorageData::BF16(src)) => dtod!(dst, src),
            (CudaStorageData::F16(dst), CudaStorageData::F16(src)) => dtod!(dst, src),
            (CudaStorageData::F32(dst), CudaStorageData::F32(src)) => dtod!(dst, src),
            (CudaStorageData::F64(dst), CudaStorageData::F64(src)) => dtod!(dst, src),
            _ => Err(DotoriError::DTypeMismatch { expected, got }),
        }
    }
}
