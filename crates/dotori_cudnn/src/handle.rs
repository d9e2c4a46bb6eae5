use crate::error::{check, Result};
use cudarc::cudnn::sys;
use cudarc::driver::CudaStream;
use std::sync::Arc;

/// RAII wrapper around a `cudnnHandle_t`, bound to one device stream.
///
/// The handle is owned by the device object and handed to kernel calls
/// explicitly; all work issued through it is ordered on the bound stream.
pub struct CudnnHandle {
    handle: sys::cudnnHandle_t,
}

// The handle is only driven through the device object that owns it, one
// call at a time on its bound stream.
unsafe impl Send for CudnnHandle {}
unsafe impl Sync for CudnnHandle {}

impl CudnnHandle {
    /// Creates a handle whose work is ordered on `stream`.
    pub fn new(stream: &Arc<CudaStream>) -> Result<Self> {
        let mut handle: sys::cudnnHandle_t = std::ptr::null_mut();
        unsafe {
            check(sys::cudnnCreate(&mut handle), "cudnnCreate")?;
            let status = sys::cudnnSetStream(handle, stream.cu_stream() as sys::cudaStream_t);
            if let Err(e) = check(status, "cudnnSetStream") {
                sys::cudnnDestroy(handle);
                return Err(e);
            }
        }
        Ok(Self { handle })
    }

    pub fn raw(&self) -> sys::cudnnHandle_t {
        self.handle
    }
}

impl Drop for CudnnHandle {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                sys::cudnnDestroy(self.handle);
            }
        }
    }
}
