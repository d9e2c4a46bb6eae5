//! Software normalization backend.
//!
//! A host-side rendition of the accelerated primitive's contract: the
//! same canonical-4d/mode rigidity, the same parameter dtype rules, the
//! same in-place running-statistic update. It is the drop-in substitute
//! behind `NormalizationBackend` and carries the test suite.

use crate::{
    be::storage::BackendStorage,
    compat::*,
    error::{DotoriError, DotoriResult},
    op::batch_norm::{BatchNormForwardArgs, BatchNormMode, NormalizationBackend},
    tensor::Tensor,
    types::DType,
};
// f64::sqrt is a std method; no-std builds resolve it through num_traits.
#[cfg(not(feature = "std"))]
use num_traits::Float;

/// Smallest accepted epsilon, matching the accelerated primitive's floor
/// so the two backends stay interchangeable.
pub const MIN_EPSILON: f64 = 1e-5;

#[derive(Clone, Copy, Default, Debug)]
pub struct CpuNormalization;

fn write_f64(tensor: &Tensor, values: &[f64]) -> DotoriResult<()> {
    let layout = tensor.layout().clone();
    tensor.with_storage_mut(|storage| match storage {
        BackendStorage::CPU(cpu_storage) => cpu_storage.write_f64(&layout, values),
        #[cfg(feature = "cuda")]
        _ => Err(DotoriError::BackendError(
            "cpu normalization backend requires cpu tensors".to_string(),
        )),
    })
}

impl NormalizationBackend for CpuNormalization {
    fn min_epsilon(&self) -> f64 {
        MIN_EPSILON
    }

    fn param_dtype(&self, input_dtype: DType) -> DotoriResult<DType> {
        match input_dtype {
            DType::BF16 | DType::F16 | DType::F32 => Ok(DType::F32),
            DType::F64 => Ok(DType::F64),
            dtype => Err(DotoriError::UnsupportedDTypeForOp {
                dtype,
                op: "batch_norm",
            }),
        }
    }

    fn forward_training(&self, args: BatchNormForwardArgs<'_>) -> DotoriResult<()> {
        if !args.x.device().is_cpu() {
            return Err(DotoriError::BackendError(
                "cpu normalization backend requires cpu tensors".to_string(),
            ));
        }

        let shape = args.x.shape();
        let dims = shape.dims();
        debug_assert_eq!(dims.len(), 4);
        let (n, c, h, w) = (dims[0], dims[1], dims[2], dims[3]);

        let x = args.x.to_f64_vec()?;
        let gamma = args.gamma.to_f64_vec()?;
        let beta = args.beta.to_f64_vec()?;

        let (param_size, group_size) = match args.mode {
            BatchNormMode::Spatial => (c, n * h * w),
            BatchNormMode::PerActivation => (c * h * w, n),
        };
        if gamma.len() != param_size || beta.len() != param_size {
            return Err(DotoriError::SizeMismatch {
                expected: param_size,
                got: gamma.len(),
            });
        }
        if group_size == 0 {
            return Err(DotoriError::BackendError(
                "batch norm over an empty reduction group".to_string(),
            ));
        }

        let param_index = |ci: usize, hi: usize, wi: usize| match args.mode {
            BatchNormMode::Spatial => ci,
            BatchNormMode::PerActivation => (ci * h + hi) * w + wi,
        };

        let mut mean = vec![0.0f64; param_size];
        for bi in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        mean[param_index(ci, hi, wi)] += x[((bi * c + ci) * h + hi) * w + wi];
                    }
                }
            }
        }
        for value in mean.iter_mut() {
            *value /= group_size as f64;
        }

        let mut var = vec![0.0f64; param_size];
        for bi in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let p = param_index(ci, hi, wi);
                        let centered = x[((bi * c + ci) * h + hi) * w + wi] - mean[p];
                        var[p] += centered * centered;
                    }
                }
            }
        }
        for value in var.iter_mut() {
            *value /= group_size as f64;
        }

        let inv_std: Vec<f64> = var.iter().map(|&v| 1.0 / (v + args.eps).sqrt()).collect();

        let mut y = vec![0.0f64; x.len()];
        for bi in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let p = param_index(ci, hi, wi);
                        let i = ((bi * c + ci) * h + hi) * w + wi;
                        y[i] = gamma[p] * (x[i] - mean[p]) * inv_std[p] + beta[p];
                    }
                }
            }
        }
        write_f64(args.y, &y)?;

        // Blend the batch statistics into the caller-owned running
        // buffers. The running variance accumulates the unbiased
        // estimator while the saved inverse variance is built from the
        // biased one, matching the accelerated primitive.
        let factor = args.exp_avg_factor;
        let correction = if group_size > 1 {
            group_size as f64 / (group_size - 1) as f64
        } else {
            1.0
        };

        let mut running_mean = args.running_mean.to_f64_vec()?;
        let mut running_var = args.running_var.to_f64_vec()?;
        if running_mean.len() != param_size || running_var.len() != param_size {
            return Err(DotoriError::SizeMismatch {
                expected: param_size,
                got: running_mean.len(),
            });
        }
        for p in 0..param_size {
            running_mean[p] = running_mean[p] * (1.0 - factor) + mean[p] * factor;
            running_var[p] = running_var[p] * (1.0 - factor) + var[p] * correction * factor;
        }
        write_f64(args.running_mean, &running_mean)?;
        write_f64(args.running_var, &running_var)?;

        write_f64(args.saved_mean, &mean)?;
        write_f64(args.saved_inv_var, &inv_std)?;

        Ok(())
    }
}
