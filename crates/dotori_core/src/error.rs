use crate::{
    compat::*,
    types::{DType, Device, Shape},
};

/// Main error type for dotori_core.
///
/// This enum covers all error conditions that can occur while adapting
/// tensors to, and driving, a normalization backend.
#[derive(Clone)]
pub enum DotoriError {
    // ===== Device Errors =====
    /// Device mismatch between expected and actual device.
    DeviceMismatch { expected: Device, got: Device },
    /// A running statistic must be contiguous so the backend can update it in place.
    RunningStatNotContiguous { stat: &'static str },

    // ===== DType Errors =====
    /// Data type mismatch between expected and actual dtype.
    DTypeMismatch { expected: DType, got: DType },
    /// Unsupported dtype for a specific operation.
    UnsupportedDTypeForOp { dtype: DType, op: &'static str },
    /// Unsupported dtype conversion.
    UnsupportedDTypeCast { from: DType, to: DType },
    /// Unsupported dtype for a specific device.
    UnsupportedDTypeForDevice { dtype: DType, device: Device },

    // ===== Shape and Layout Errors =====
    /// Shape mismatch between expected and actual shapes.
    ShapeMismatch { expected: Shape, got: Shape },
    /// Size mismatch between expected and actual element counts.
    SizeMismatch { expected: usize, got: usize },
    /// Incompatible shapes in a binary operation.
    IncompatibleShapes { lhs: Shape, rhs: Shape, op: &'static str },
    /// Invalid axis for the given rank.
    InvalidAxis { axis: usize, ndim: usize },
    /// The same axis was listed twice in a reduction axis set.
    DuplicateAxis { axis: usize },

    // ===== Batch Normalization Errors =====
    /// Axis set not expressible as one of the backend's normalization modes.
    InvalidBatchNormAxes { axes: Vec<usize> },
    /// Shape/key-axis combination not expressible as a canonical 4d view.
    IncompatibleBatchNormLayout { shape: Shape, key_axes: Vec<usize> },
    /// Epsilon below the backend's documented minimum.
    EpsilonTooSmall { eps: f64, min: f64 },

    // ===== Backend Errors =====
    /// Backend operation failed.
    BackendError(String),
    /// cuDNN kernel error.
    #[cfg(feature = "cuda")]
    CudnnKernelError(String),

    // ===== Internal Errors =====
    /// Internal error with a descriptive message.
    InternalError(String),
    /// Not yet implemented feature.
    NotImplemented(&'static str),
}

impl fmt::Display for DotoriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Device Errors
            Self::DeviceMismatch { expected, got } => {
                write!(f, "device mismatch: expected {:?}, got {:?}", expected, got)
            },
            Self::RunningStatNotContiguous { stat } => {
                write!(f, "{} must be contiguous to be updated in place", stat)
            },

            // DType Errors
            Self::DTypeMismatch { expected, got } => {
                write!(f, "dtype mismatch: expected {:?}, got {:?}", expected, got)
            },
            Self::UnsupportedDTypeForOp { dtype, op } => {
                write!(f, "unsupported dtype {:?} for operation {}", dtype, op)
            },
            Self::UnsupportedDTypeCast { from, to } => {
                write!(f, "unsupported dtype conversion from {:?} to {:?}", from, to)
            },
            Self::UnsupportedDTypeForDevice { dtype, device } => {
                write!(f, "unsupported dtype {:?} for {:?} device", dtype, device)
            },

            // Shape and Layout Errors
            Self::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            },
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {}, got {}", expected, got)
            },
            Self::IncompatibleShapes { lhs, rhs, op } => {
                write!(f, "incompatible shapes in {}: lhs {:?}, rhs {:?}", op, lhs, rhs)
            },
            Self::InvalidAxis { axis, ndim } => {
                write!(f, "invalid axis {} for {}-dimensional tensor", axis, ndim)
            },
            Self::DuplicateAxis { axis } => {
                write!(f, "axis {} listed more than once", axis)
            },

            // Batch Normalization Errors
            Self::InvalidBatchNormAxes { axes } => {
                write!(
                    f,
                    "invalid axes {:?} for batch norm: expected 1, 3 or 4 reduced dimensions",
                    axes
                )
            },
            Self::IncompatibleBatchNormLayout { shape, key_axes } => {
                write!(
                    f,
                    "unexpected combination of shape {:?} and key axes {:?} for a canonical 4d view",
                    shape, key_axes
                )
            },
            Self::EpsilonTooSmall { eps, min } => {
                write!(f, "minimum allowed epsilon is {:e} but found {:e}", min, eps)
            },

            // Backend Errors
            Self::BackendError(msg) => write!(f, "backend error: {}", msg),
            #[cfg(feature = "cuda")]
            Self::CudnnKernelError(msg) => write!(f, "cudnn kernel error: {}", msg),

            // Internal Errors
            Self::InternalError(msg) => write!(f, "internal error: {}", msg),
            Self::NotImplemented(feature) => write!(f, "not implemented: {}", feature),
        }
    }
}

impl fmt::Debug for DotoriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DotoriError {}

// Conversion from dotori_cudnn error
#[cfg(feature = "cuda")]
impl From<dotori_cudnn::error::CudnnKernelError> for DotoriError {
    fn from(e: dotori_cudnn::error::CudnnKernelError) -> Self {
        DotoriError::CudnnKernelError(format!("{:?}", e))
    }
}

// Conversion from PoisonError (for RwLock)
#[cfg(feature = "std")]
impl<T> From<std::sync::PoisonError<T>> for DotoriError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        DotoriError::InternalError(format!("lock poisoned: {}", e))
    }
}

/// Result type alias for dotori_core operations.
pub type DotoriResult<T> = Result<T, DotoriError>;
