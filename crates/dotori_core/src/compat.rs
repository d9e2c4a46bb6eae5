//! std/no-std compatibility layer
//!
//! Internal module for handling differences between std and no-std environments.

// Basic types and formatting
#[cfg(not(feature = "std"))]
pub use alloc::{
    format,
    string::{String, ToString},
    vec,
    vec::Vec,
};

#[cfg(feature = "std")]
pub use std::{
    format,
    string::{String, ToString},
    vec,
    vec::Vec,
};

// Collections
#[cfg(not(feature = "std"))]
pub use alloc::collections::BTreeMap as HashMap;

#[cfg(feature = "std")]
pub use std::collections::HashMap;

// Synchronization primitives
#[cfg(not(feature = "std"))]
pub use alloc::sync::Arc;

#[cfg(feature = "std")]
pub use std::sync::Arc;

#[cfg(not(feature = "std"))]
pub use spin::{Lazy as LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(feature = "std")]
pub use std::sync::{LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Core traits and functions
pub use core::fmt;
