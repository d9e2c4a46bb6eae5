pub mod descriptor;
pub mod error;
pub mod handle;
pub mod norm;

pub use cudarc;

/// Smallest epsilon the batch-normalization entry points accept
/// (`CUDNN_BN_MIN_EPSILON`).
pub const BN_MIN_EPSILON: f64 = 1e-5;
