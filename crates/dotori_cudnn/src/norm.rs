use crate::{
    descriptor::TensorDescriptor,
    error::{check, Result},
    handle::CudnnHandle,
};
use cudarc::cudnn::sys;
use std::ffi::c_void;

/// Normalization modes of the batch-normalization entry points.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BnMode {
    /// One scale/shift per tensor position, statistics over the batch.
    PerActivation,
    /// One scale/shift per channel, statistics over batch and spatial
    /// extents.
    Spatial,
}

impl BnMode {
    pub fn raw(self) -> sys::cudnnBatchNormMode_t {
        match self {
            BnMode::PerActivation => sys::cudnnBatchNormMode_t::CUDNN_BATCHNORM_PER_ACTIVATION,
            BnMode::Spatial => sys::cudnnBatchNormMode_t::CUDNN_BATCHNORM_SPATIAL,
        }
    }
}

/// Forward-training batch normalization.
///
/// `x` and `y` are described by `x_desc`; gamma, beta and the four
/// statistic buffers by `param_desc`. Running statistics are updated in
/// place with weight `exp_avg_factor`; the per-call batch mean and
/// inverse variance are written to `saved_mean` / `saved_inv_var`. The
/// call returns once the work is enqueued on the handle's stream.
///
/// # Safety
///
/// Every pointer must be a valid device pointer matching its descriptor's
/// layout and dtype, and must stay alive until the stream has executed
/// the call.
#[allow(clippy::too_many_arguments)]
pub unsafe fn batch_norm_forward_training(
    handle: &CudnnHandle,
    mode: BnMode,
    x_desc: &TensorDescriptor,
    x: *const c_void,
    y: *mut c_void,
    param_desc: &TensorDescriptor,
    gamma: *const c_void,
    beta: *const c_void,
    exp_avg_factor: f64,
    running_mean: *mut c_void,
    running_var: *mut c_void,
    eps: f64,
    saved_mean: *mut c_void,
    saved_inv_var: *mut c_void,
) -> Result<()> {
    // Blend coefficients follow the input dtype: doubles for F64 data,
    // floats for everything else (including half inputs).
    let one_f32 = 1f32;
    let zero_f32 = 0f32;
    let one_f64 = 1f64;
    let zero_f64 = 0f64;
    let (alpha, beta_blend): (*const c_void, *const c_void) =
        if x_desc.data_type()? == sys::cudnnDataType_t::CUDNN_DATA_DOUBLE {
            (
                &one_f64 as *const f64 as *const c_void,
                &zero_f64 as *const f64 as *const c_void,
            )
        } else {
            (
                &one_f32 as *const f32 as *const c_void,
                &zero_f32 as *const f32 as *const c_void,
            )
        };

    check(
        sys::cudnnBatchNormalizationForwardTraining(
            handle.raw(),
            mode.raw(),
            alpha,
            beta_blend,
            x_desc.raw(),
            x,
            x_desc.raw(),
            y,
            param_desc.raw(),
            gamma,
            beta,
            exp_avg_factor,
            running_mean,
            running_var,
            eps,
            saved_mean,
            saved_inv_var,
        ),
        "cudnnBatchNormalizationForwardTraining",
    )
}
