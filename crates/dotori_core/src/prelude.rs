//! Prelude module for convenient imports
//!
//! Usage: `use dotori_core::prelude::*;`

pub use crate::be_cpu::device::CpuDevice;
pub use crate::error::{DotoriError, DotoriResult};
pub use crate::op::batch_norm::{BatchNormForward, BatchNormMode, NormalizationBackend};
pub use crate::tensor::Tensor;
pub use crate::types::{DType, Device, Shape};
