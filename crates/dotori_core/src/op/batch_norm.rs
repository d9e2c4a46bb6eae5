//! Batch-normalization forward pass over a rigid 4d, two-mode
//! normalization backend.
//!
//! The backend only understands rank-4 layouts with the parameter-bearing
//! dimension at position 1, and a small set of normalization modes. This
//! module adapts arbitrary reduction-axis sets and dtypes to that
//! contract, drives the backend, and writes results back into the
//! caller's representation.

use crate::{
    compat::*,
    error::{DotoriError, DotoriResult},
    tensor::Tensor,
    types::{DType, Shape},
};

/// Normalization modes understood by the backends.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BatchNormMode {
    /// Independent scale/shift per remaining tensor position; statistics
    /// reduced over the batch dimension only.
    PerActivation,
    /// One scale/shift pair per channel, shared over the spatial extents.
    Spatial,
}

/// Required shape and dtype of the scale/shift/statistics parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParamDescriptor {
    pub shape: Shape,
    pub dtype: DType,
}

/// Arguments handed to a backend's forward-training entry point.
///
/// `x` and `y` are canonical 4d contiguous views. All parameter tensors
/// carry the descriptor dtype. `running_mean` and `running_var` are
/// updated in place with weight `exp_avg_factor`; the per-call batch mean
/// and inverse variance are written into `saved_mean` / `saved_inv_var`.
pub struct BatchNormForwardArgs<'a> {
    pub mode: BatchNormMode,
    pub x: &'a Tensor,
    pub y: &'a Tensor,
    pub gamma: &'a Tensor,
    pub beta: &'a Tensor,
    pub running_mean: &'a Tensor,
    pub running_var: &'a Tensor,
    pub exp_avg_factor: f64,
    pub eps: f64,
    pub saved_mean: &'a Tensor,
    pub saved_inv_var: &'a Tensor,
}

/// A normalization primitive.
///
/// The rigid 4d/mode contract is a property of the accelerated libraries
/// this was built for, not of batch normalization itself; keeping the
/// primitive behind this trait lets a software or alternative-accelerator
/// implementation replace it without touching the axis/shape adaptation.
pub trait NormalizationBackend {
    /// Smallest epsilon the primitive accepts.
    fn min_epsilon(&self) -> f64;

    /// Dtype the primitive requires for scale/shift/statistics parameters,
    /// given the input dtype.
    fn param_dtype(&self, input_dtype: DType) -> DotoriResult<DType>;

    /// Forward-training pass over a canonical 4d view.
    fn forward_training(&self, args: BatchNormForwardArgs<'_>) -> DotoriResult<()>;
}

pub(crate) fn validate_axes(ndim: usize, axes: &[usize]) -> DotoriResult<()> {
    for (i, &axis) in axes.iter().enumerate() {
        if axis >= ndim {
            return Err(DotoriError::InvalidAxis { axis, ndim });
        }
        if axes[..i].contains(&axis) {
            return Err(DotoriError::DuplicateAxis { axis });
        }
    }
    Ok(())
}

/// Lists the dimensions not present in `axes`, in ascending order.
///
/// Example: axes {0, 2, 3} with rank 4 gives {1}.
pub fn reduce_key_axes(ndim: usize, axes: &[usize]) -> Vec<usize> {
    (0..ndim).filter(|dim| !axes.contains(dim)).collect()
}

/// Reshapes `x` into the canonical rank-4 layout with the surviving
/// dimension at position 1.
///
/// A rank-4 tensor whose key axis is already 1 passes through untouched.
/// A tensor whose single key axis is the last dimension is flattened to
/// `(size / last, last, 1, 1)`. Anything else is not expressible.
pub fn as_4d_view(x: &Tensor, key_axes: &[usize]) -> DotoriResult<Tensor> {
    let ndim = x.ndim();
    let key = key_axes.first().copied();

    if ndim == 4 && key == Some(1) {
        return Ok(x.clone());
    }
    if ndim > 0 && key == Some(ndim - 1) {
        let last_dim = x.shape().dims()[ndim - 1];
        return x.reshape([x.size() / last_dim, last_dim, 1, 1]);
    }
    Err(DotoriError::IncompatibleBatchNormLayout {
        shape: x.shape(),
        key_axes: key_axes.to_vec(),
    })
}

/// Classifies a reduction axis set into a normalization mode.
pub fn batch_norm_mode(axes: &[usize]) -> DotoriResult<BatchNormMode> {
    if axes == [0] {
        // (batch, channels, (depth,) height, width), reduced over batch only
        return Ok(BatchNormMode::PerActivation);
    }
    if axes == [0, 2, 3] || axes == [0, 2, 3, 4] {
        return Ok(BatchNormMode::Spatial);
    }
    Err(DotoriError::InvalidBatchNormAxes { axes: axes.to_vec() })
}

/// Derives the parameter shape and dtype the backend requires for a
/// canonical 4d view.
pub fn derive_param_descriptor<B: NormalizationBackend + ?Sized>(
    view: &Tensor,
    mode: BatchNormMode,
    backend: &B,
) -> DotoriResult<ParamDescriptor> {
    let shape = view.shape();
    let dims = shape.dims();
    let shape = match mode {
        BatchNormMode::Spatial => Shape::new(&[1, dims[1], 1, 1]),
        BatchNormMode::PerActivation => Shape::new(&[1, dims[1], dims[2], dims[3]]),
    };
    let dtype = backend.param_dtype(view.dtype())?;
    Ok(ParamDescriptor { shape, dtype })
}

/// Scoped dtype reconciliation around one backend call.
///
/// Construction casts the caller's parameters into the backend-required
/// dtype (sharing storage when the dtype already matches, so the backend
/// updates the caller's buffers directly). `write_back` copies
/// backend-updated running statistics back into the caller's storage and
/// is a no-op when no cast occurred, which keeps calling code uniform.
pub(crate) struct CoercedParams {
    pub(crate) gamma: Tensor,
    pub(crate) beta: Tensor,
    pub(crate) running_mean: Tensor,
    pub(crate) running_var: Tensor,
    original_mean: Tensor,
    original_var: Tensor,
    cast: bool,
}

impl CoercedParams {
    pub(crate) fn coerce(
        gamma: &Tensor,
        beta: &Tensor,
        running_mean: &Tensor,
        running_var: &Tensor,
        param_dtype: DType,
    ) -> DotoriResult<Self> {
        let cast = running_mean.dtype() != param_dtype;
        Ok(Self {
            gamma: gamma.to_dtype(param_dtype)?,
            beta: beta.to_dtype(param_dtype)?,
            running_mean: running_mean.to_dtype(param_dtype)?,
            running_var: running_var.to_dtype(param_dtype)?,
            original_mean: running_mean.clone(),
            original_var: running_var.clone(),
            cast,
        })
    }

    pub(crate) fn write_back(self) -> DotoriResult<()> {
        if !self.cast {
            return Ok(());
        }

        // The backend only updated the cast buffers; without this copy the
        // caller's running statistics would be stale.
        let dtype = self.original_mean.dtype();
        self.original_mean.copy_from_(&self.running_mean.to_dtype(dtype)?)?;
        self.original_var.copy_from_(&self.running_var.to_dtype(dtype)?)?;
        Ok(())
    }
}

/// One batch-normalization forward invocation site.
///
/// Owns the per-call mean / inverse-variance cache. The cache is private
/// to the invocation object; concurrent forward calls on the same device
/// must use separate objects.
pub struct BatchNormForward<B: NormalizationBackend> {
    backend: B,
    result_mean: Option<Tensor>,
    result_inv_var: Option<Tensor>,
}

impl<B: NormalizationBackend> BatchNormForward<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            result_mean: None,
            result_inv_var: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Per-call batch mean and inverse variance from the most recent
    /// forward call, retained for reuse by a following gradient pass.
    /// Overwritten by the next forward call.
    pub fn saved_stats(&self) -> Option<(&Tensor, &Tensor)> {
        match (&self.result_mean, &self.result_inv_var) {
            (Some(mean), Some(inv_var)) => Some((mean, inv_var)),
            _ => None,
        }
    }

    /// Runs the forward-training pass and returns the normalized output.
    ///
    /// `running_mean` and `running_var` are caller-owned and updated in
    /// place; they must be contiguous. The backend blends the batch
    /// statistics into them with weight `1 - decay`. All five tensors
    /// must share device and dtype; that agreement is the caller's
    /// contract and is only asserted in debug builds.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &mut self,
        x: &Tensor,
        gamma: &Tensor,
        beta: &Tensor,
        running_mean: &Tensor,
        running_var: &Tensor,
        eps: f64,
        decay: f64,
        axes: &[usize],
    ) -> DotoriResult<Tensor> {
        let min_eps = self.backend.min_epsilon();
        if eps < min_eps {
            return Err(DotoriError::EpsilonTooSmall { eps, min: min_eps });
        }

        validate_axes(x.ndim(), axes)?;

        #[cfg(debug_assertions)]
        {
            let reduced_size = x.shape().reduce_dims(axes).size();
            debug_assert_eq!(gamma.size(), reduced_size);
            debug_assert_eq!(beta.size(), reduced_size);
            debug_assert_eq!(running_mean.size(), reduced_size);
            debug_assert_eq!(running_var.size(), reduced_size);

            debug_assert_eq!(gamma.device(), x.device());
            debug_assert_eq!(beta.device(), x.device());
            debug_assert_eq!(running_mean.device(), x.device());
            debug_assert_eq!(running_var.device(), x.device());

            debug_assert_eq!(gamma.dtype(), x.dtype());
            debug_assert_eq!(beta.dtype(), x.dtype());
            debug_assert_eq!(running_mean.dtype(), x.dtype());
            debug_assert_eq!(running_var.dtype(), x.dtype());

            debug_assert!(gamma.is_contiguous());
            debug_assert!(beta.is_contiguous());
        }

        if !running_mean.is_contiguous() {
            return Err(DotoriError::RunningStatNotContiguous { stat: "running mean" });
        }
        if !running_var.is_contiguous() {
            return Err(DotoriError::RunningStatNotContiguous { stat: "running variance" });
        }

        let x_cont = x.contiguous()?;
        let x_view = as_4d_view(&x_cont, &reduce_key_axes(x.ndim(), axes))?;
        let mode = batch_norm_mode(axes)?;
        let descriptor = derive_param_descriptor(&x_view, mode, &self.backend)?;

        let params = CoercedParams::coerce(gamma, beta, running_mean, running_var, descriptor.dtype)?;

        let out = x_cont.zeros_like()?;
        let y_view = out.reshape(x_view.shape())?;

        // Initialize cache.
        let result_mean = Tensor::zeros(params.gamma.shape(), descriptor.dtype, x.device())?;
        let result_inv_var = Tensor::zeros(params.gamma.shape(), descriptor.dtype, x.device())?;

        self.backend.forward_training(BatchNormForwardArgs {
            mode,
            x: &x_view,
            y: &y_view,
            gamma: &params.gamma,
            beta: &params.beta,
            running_mean: &params.running_mean,
            running_var: &params.running_var,
            exp_avg_factor: 1.0 - decay,
            eps,
            saved_mean: &result_mean,
            saved_inv_var: &result_inv_var,
        })?;

        params.write_back()?;

        self.result_mean = Some(result_mean);
        self.result_inv_var = Some(result_inv_var);

        Ok(out)
    }

    /// Gradient of the forward pass. Not implemented in this core; the
    /// forward cache is retained so a future implementation can consume
    /// it.
    pub fn backward(
        &self,
        _x: &Tensor,
        _gamma: &Tensor,
        _gy: &Tensor,
        _eps: f64,
        _axes: &[usize],
    ) -> DotoriResult<[Tensor; 3]> {
        Err(DotoriError::NotImplemented("batch norm backward"))
    }

    /// Second-order gradient of the forward pass. Not implemented.
    pub fn double_backward(
        &self,
        _ggx: &Tensor,
        _gggamma: &Tensor,
        _ggbeta: &Tensor,
    ) -> DotoriResult<[Tensor; 3]> {
        Err(DotoriError::NotImplemented("batch norm double backward"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{be_cpu::norm::CpuNormalization, types::Device};

    fn tensor(shape: &[usize], dtype: DType) -> Tensor {
        Tensor::zeros(shape, dtype, Device::CPU).unwrap()
    }

    #[test]
    fn key_axes_complement() {
        assert_eq!(reduce_key_axes(4, &[0, 2, 3]), vec![1]);
        assert_eq!(reduce_key_axes(4, &[0]), vec![1, 2, 3]);
        assert_eq!(reduce_key_axes(2, &[0]), vec![1]);
        assert_eq!(reduce_key_axes(5, &[0, 2, 3, 4]), vec![1]);
    }

    #[test]
    fn mode_per_activation() {
        assert_eq!(batch_norm_mode(&[0]).unwrap(), BatchNormMode::PerActivation);
    }

    #[test]
    fn mode_spatial() {
        assert_eq!(batch_norm_mode(&[0, 2, 3]).unwrap(), BatchNormMode::Spatial);
        assert_eq!(batch_norm_mode(&[0, 2, 3, 4]).unwrap(), BatchNormMode::Spatial);
    }

    #[test]
    fn mode_rejects_other_axes() {
        for axes in [&[1][..], &[0, 1][..], &[0, 2][..], &[0, 1, 2, 3][..], &[][..]] {
            assert!(matches!(
                batch_norm_mode(axes),
                Err(DotoriError::InvalidBatchNormAxes { .. })
            ));
        }
    }

    #[test]
    fn canonical_view_passthrough_is_identity() {
        let x = tensor(&[8, 3, 16, 16], DType::F32);
        let view = as_4d_view(&x, &[1]).unwrap();
        assert!(view.shares_storage_with(&x));
        assert_eq!(view.shape(), x.shape());
        assert_eq!(view.strides(), x.strides());
    }

    #[test]
    fn canonical_view_flattens_channel_last() {
        let x = tensor(&[8, 5, 3], DType::F32);
        let view = as_4d_view(&x, &[2]).unwrap();
        assert_eq!(view.shape().dims(), &[40, 3, 1, 1]);
        assert_eq!(view.size(), x.size());
    }

    #[test]
    fn canonical_view_rejects_inner_key_axis() {
        let x = tensor(&[8, 3, 16], DType::F32);
        assert!(matches!(
            as_4d_view(&x, &[1, 2]),
            Err(DotoriError::IncompatibleBatchNormLayout { .. })
        ));
    }

    #[test]
    fn canonical_view_rejects_rank5() {
        let x = tensor(&[2, 3, 4, 5, 6], DType::F32);
        assert!(matches!(
            as_4d_view(&x, &[1]),
            Err(DotoriError::IncompatibleBatchNormLayout { .. })
        ));
    }

    #[test]
    fn descriptor_spatial_is_per_channel() {
        let view = tensor(&[8, 3, 16, 16], DType::F32);
        let descriptor = derive_param_descriptor(&view, BatchNormMode::Spatial, &CpuNormalization).unwrap();
        assert_eq!(descriptor.shape.dims(), &[1, 3, 1, 1]);
        assert_eq!(descriptor.dtype, DType::F32);
    }

    #[test]
    fn descriptor_per_activation_keeps_spatial_extents() {
        let view = tensor(&[8, 3, 16, 16], DType::F32);
        let descriptor = derive_param_descriptor(&view, BatchNormMode::PerActivation, &CpuNormalization).unwrap();
        assert_eq!(descriptor.shape.dims(), &[1, 3, 16, 16]);
    }

    #[test]
    fn descriptor_widens_reduced_precision_floats() {
        for dtype in [DType::F16, DType::BF16] {
            let view = tensor(&[8, 3, 16, 16], dtype);
            let descriptor = derive_param_descriptor(&view, BatchNormMode::Spatial, &CpuNormalization).unwrap();
            assert_eq!(descriptor.dtype, DType::F32);
        }
    }

    #[test]
    fn descriptor_rejects_unsupported_dtype() {
        let view = tensor(&[8, 3, 16, 16], DType::I32);
        assert!(matches!(
            derive_param_descriptor(&view, BatchNormMode::Spatial, &CpuNormalization),
            Err(DotoriError::UnsupportedDTypeForOp { .. })
        ));
    }

    #[test]
    fn axes_validation() {
        assert!(matches!(
            validate_axes(4, &[0, 4]),
            Err(DotoriError::InvalidAxis { axis: 4, ndim: 4 })
        ));
        assert!(matches!(validate_axes(4, &[0, 0]), Err(DotoriError::DuplicateAxis { axis: 0 })));
        assert!(validate_axes(4, &[0, 2, 3]).is_ok());
    }
}
