//! Error types for cuDNN kernel operations

use cudarc::cudnn::sys::cudnnStatus_t;
use std::fmt;

/// Error type for cuDNN kernel operations
#[derive(Debug, Clone)]
pub enum CudnnKernelError {
    /// A cuDNN call returned a non-success status
    Status {
        status: cudnnStatus_t,
        context: &'static str,
    },
    /// Invalid input parameters or dimensions
    InvalidInput(String),
    /// CUDA driver error
    DriverError(String),
}

impl fmt::Display for CudnnKernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CudnnKernelError::Status { status, context } => {
                write!(f, "{} returned {:?}", context, status)
            },
            CudnnKernelError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CudnnKernelError::DriverError(msg) => write!(f, "driver error: {}", msg),
        }
    }
}

impl std::error::Error for CudnnKernelError {}

/// Result type for cuDNN kernel operations
pub type Result<T> = std::result::Result<T, CudnnKernelError>;

/// Maps a cuDNN status to a `Result`, tagging failures with the name of
/// the call that produced them.
pub(crate) fn check(status: cudnnStatus_t, context: &'static str) -> Result<()> {
    if status == cudnnStatus_t::CUDNN_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(CudnnKernelError::Status { status, context })
    }
}
