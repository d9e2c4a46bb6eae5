#![allow(non_upper_case_globals)]

use crate::compat::*;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    BOOL,
    F8E4M3,
    BF16,
    F16,
    F32,
    F64,
    U8,
    U32,
    I32,
    I64,
}

impl Default for DType {
    fn default() -> Self {
        Self::F32
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BOOL => "bool",
            Self::F8E4M3 => "f8e4m3",
            Self::BF16 => "bf16",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::I64 => "i64",
        };
        write!(f, "{s}")
    }
}

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl DType {
    pub fn get_size_in_bytes(&self) -> usize {
        match self {
            Self::BOOL => 1,
            Self::F8E4M3 => 1,
            Self::BF16 => 2,
            Self::F16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
            Self::U8 => 1,
            Self::U32 => 4,
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, DType::BOOL)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F8E4M3 | Self::BF16 | Self::F16 | Self::F32 | Self::F64)
    }

    /// True for float dtypes narrower than 32 bits.
    pub fn is_reduced_precision_float(&self) -> bool {
        matches!(self, Self::F8E4M3 | Self::BF16 | Self::F16)
    }

    pub fn is_uint(&self) -> bool {
        matches!(self, Self::U8 | Self::U32)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Self::I32 | Self::I64)
    }
}
