use crate::{be_cpu::norm::CpuNormalization, op::batch_norm::BatchNormForward};

/// The host device.
#[derive(Clone, Copy, Default, Debug)]
pub struct CpuDevice;

impl CpuDevice {
    /// Creates a forward-invocation object driving the software
    /// normalization backend.
    ///
    /// Each object owns its per-call statistic cache, so concurrent
    /// forward calls need separate objects.
    pub fn batch_norm_forward(&self) -> BatchNormForward<CpuNormalization> {
        BatchNormForward::new(CpuNormalization)
    }
}
