#![no_std]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod be;
pub mod be_cpu;
#[cfg(feature = "cuda")]
pub mod be_cuda;
pub(crate) mod compat;
pub mod error;
pub mod op;
pub mod prelude;
pub mod tensor;
pub mod types;
