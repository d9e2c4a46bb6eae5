//! cuDNN normalization backend.

use crate::{
    be::storage::BackendStorage,
    be_cuda::device::CudaDevice,
    compat::*,
    error::{DotoriError, DotoriResult},
    op::batch_norm::{BatchNormForwardArgs, BatchNormMode, NormalizationBackend},
    tensor::Tensor,
    types::DType,
};
use dotori_cudnn::{
    cudarc::{cudnn::sys, driver::CudaStream},
    descriptor::TensorDescriptor,
    norm::{batch_norm_forward_training, BnMode},
    BN_MIN_EPSILON,
};
use std::ffi::c_void;

pub struct CudnnNormalization {
    device: Arc<CudaDevice>,
}

impl CudnnNormalization {
    pub fn new(device: Arc<CudaDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    fn bn_mode(mode: BatchNormMode) -> BnMode {
        match mode {
            BatchNormMode::PerActivation => BnMode::PerActivation,
            BatchNormMode::Spatial => BnMode::Spatial,
        }
    }

    fn cudnn_dtype(dtype: DType) -> DotoriResult<sys::cudnnDataType_t> {
        match dtype {
            DType::BF16 => Ok(sys::cudnnDataType_t::CUDNN_DATA_BFLOAT16),
            DType::F16 => Ok(sys::cudnnDataType_t::CUDNN_DATA_HALF),
            DType::F32 => Ok(sys::cudnnDataType_t::CUDNN_DATA_FLOAT),
            DType::F64 => Ok(sys::cudnnDataType_t::CUDNN_DATA_DOUBLE),
            dtype => Err(DotoriError::UnsupportedDTypeForOp {
                dtype,
                op: "batch_norm",
            }),
        }
    }

    fn dtype_of(data_type: sys::cudnnDataType_t) -> DotoriResult<DType> {
        match data_type {
            sys::cudnnDataType_t::CUDNN_DATA_FLOAT => Ok(DType::F32),
            sys::cudnnDataType_t::CUDNN_DATA_DOUBLE => Ok(DType::F64),
            other => Err(DotoriError::BackendError(format!(
                "unsupported cudnn data type: {:?}",
                other
            ))),
        }
    }

    fn device_ptr(tensor: &Tensor, stream: &CudaStream) -> DotoriResult<*mut c_void> {
        tensor.with_storage(|storage| match storage {
            BackendStorage::CUDA(cuda_storage) => Ok(cuda_storage.device_ptr(stream) as *mut c_void),
            _ => Err(DotoriError::DeviceMismatch {
                expected: tensor.device(),
                got: storage.device(),
            }),
        })
    }
}

impl NormalizationBackend for CudnnNormalization {
    fn min_epsilon(&self) -> f64 {
        BN_MIN_EPSILON
    }

    // cuDNN fixes the parameter dtype when it derives the parameter
    // descriptor; probe it with a minimal input descriptor.
    fn param_dtype(&self, input_dtype: DType) -> DotoriResult<DType> {
        let x_desc = TensorDescriptor::new_4d(Self::cudnn_dtype(input_dtype)?, 1, 1, 1, 1)?;
        let param_desc = TensorDescriptor::derive_bn(&x_desc, BnMode::Spatial.raw())?;
        Self::dtype_of(param_desc.data_type()?)
    }

    fn forward_training(&self, args: BatchNormForwardArgs<'_>) -> DotoriResult<()> {
        let shape = args.x.shape();
        let dims = shape.dims();
        debug_assert_eq!(dims.len(), 4);

        let x_desc = TensorDescriptor::new_4d(
            Self::cudnn_dtype(args.x.dtype())?,
            dims[0] as i32,
            dims[1] as i32,
            dims[2] as i32,
            dims[3] as i32,
        )?;
        let mode = Self::bn_mode(args.mode);
        let param_desc = TensorDescriptor::derive_bn(&x_desc, mode.raw())?;

        let stream = self.device.context().default_stream();
        let x = Self::device_ptr(args.x, &stream)?;
        let y = Self::device_ptr(args.y, &stream)?;
        let gamma = Self::device_ptr(args.gamma, &stream)?;
        let beta = Self::device_ptr(args.beta, &stream)?;
        let running_mean = Self::device_ptr(args.running_mean, &stream)?;
        let running_var = Self::device_ptr(args.running_var, &stream)?;
        let saved_mean = Self::device_ptr(args.saved_mean, &stream)?;
        let saved_inv_var = Self::device_ptr(args.saved_inv_var, &stream)?;

        // Enqueues on the device stream and returns; completion is
        // ordered with the write-back copies that follow on the same
        // stream.
        unsafe {
            batch_norm_forward_training(
                self.device.cudnn(),
                mode,
                &x_desc,
                x as *const c_void,
                y,
                &param_desc,
                gamma as *const c_void,
                beta as *const c_void,
                args.exp_avg_factor,
                running_mean,
                running_var,
                args.eps,
                saved_mean,
                saved_inv_var,
            )?;
        }

        Ok(())
    }
}
