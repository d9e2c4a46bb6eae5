use crate::{
    be_cuda::norm::CudnnNormalization,
    compat::*,
    error::{DotoriError, DotoriResult},
    op::batch_norm::BatchNormForward,
};
use dotori_cudnn::{
    cudarc::driver::{CudaContext, CudaSlice, DeviceRepr},
    handle::CudnnHandle,
};

#[derive(Clone)]
pub struct CudaDevice {
    pub(crate) cuda_device_id: usize,
    pub(crate) context: Arc<CudaContext>,
    pub(crate) cudnn: Arc<CudnnHandle>,
}

// Global device pool: maps CUDA device ID -> CudaDevice
static CUDA_DEVICES: LazyLock<RwLock<HashMap<usize, Arc<CudaDevice>>>> = LazyLock::new(|| RwLock::new(HashMap::new()));

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CudaDevice({})", self.cuda_device_id)
    }
}

impl CudaDevice {
    /// Get or create a CUDA device for the given device ID
    pub fn get(cuda_device_id: usize) -> DotoriResult<Arc<CudaDevice>> {
        // Try to get existing device first (read lock)
        {
            let devices = CUDA_DEVICES.read()?;
            if let Some(device) = devices.get(&cuda_device_id) {
                return Ok(device.clone());
            }
        }

        // Need to create new device (write lock)
        let mut devices = CUDA_DEVICES.write()?;

        // Double-check in case another thread created it
        if let Some(device) = devices.get(&cuda_device_id) {
            return Ok(device.clone());
        }

        let context = CudaContext::new(cuda_device_id).map_err(|e| {
            DotoriError::BackendError(format!(
                "Failed to create CUDA context for device {}: {:?}",
                cuda_device_id, e
            ))
        })?;
        let cudnn = CudnnHandle::new(&context.default_stream())?;

        let device = Arc::new(CudaDevice {
            cuda_device_id,
            context,
            cudnn: Arc::new(cudnn),
        });

        devices.insert(cuda_device_id, device.clone());
        Ok(device)
    }

    /// Returns a reference to the default CUDA device (device 0)
    pub fn global() -> DotoriResult<Arc<CudaDevice>> {
        Self::get(0)
    }

    pub fn device_id(&self) -> usize {
        self.cuda_device_id
    }

    pub fn synchronize(&self) -> DotoriResult<()> {
        self.context
            .synchronize()
            .map_err(|e| DotoriError::BackendError(format!("CUDA synchronize failed: {:?}", e)))?;
        Ok(())
    }

    pub fn context(&self) -> &Arc<CudaContext> {
        &self.context
    }

    /// The cuDNN execution handle owned by this device.
    pub fn cudnn(&self) -> &Arc<CudnnHandle> {
        &self.cudnn
    }

    pub fn new_buffer<T>(&self, element_count: usize) -> DotoriResult<CudaSlice<T>>
    where
        T: DeviceRepr,
    {
        let stream = self.context.default_stream();
        unsafe {
            stream
                .alloc(element_count)
                .map_err(|e| DotoriError::BackendError(format!("CUDA alloc failed: {:?}", e)))
        }
    }

    pub fn new_buffer_with_data<T>(&self, data: &[T]) -> DotoriResult<CudaSlice<T>>
    where
        T: DeviceRepr + Clone,
    {
        let stream = self.context.default_stream();
        stream
            .memcpy_stod(data)
            .map_err(|e| DotoriError::BackendError(format!("CUDA memcpy_stod failed: {:?}", e)))
    }

    /// Creates a forward-invocation object driving cuDNN on this device.
    ///
    /// Each object owns its per-call statistic cache, so concurrent
    /// forward calls need separate objects.
    pub fn batch_norm_forward(self: &Arc<Self>) -> BatchNormForward<CudnnNormalization> {
        BatchNormForward::new(CudnnNormalization::new(Arc::clone(self)))
    }
}
