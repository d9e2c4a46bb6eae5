use crate::{
    be::storage::BackendStorageT,
    compat::*,
    error::{DotoriError, DotoriResult},
    types::{DType, Device, Layout},
};
use float8::F8E4M3;
use half::{bf16, f16};

#[derive(Debug, Clone)]
pub enum CpuStorage {
    BOOL(Vec<bool>),
    F8E4M3(Vec<F8E4M3>),
    BF16(Vec<bf16>),
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Element types that have a CPU storage representation.
pub trait WithDType: Copy + 'static {
    const DTYPE: DType;

    fn into_cpu_storage(data: Vec<Self>) -> CpuStorage;
}

macro_rules! with_dtype {
    ($ty:ty, $variant:ident) => {
        impl WithDType for $ty {
            const DTYPE: DType = DType::$variant;

            fn into_cpu_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }
        }
    };
}

with_dtype!(bool, BOOL);
with_dtype!(F8E4M3, F8E4M3);
with_dtype!(bf16, BF16);
with_dtype!(f16, F16);
with_dtype!(f32, F32);
with_dtype!(f64, F64);
with_dtype!(u8, U8);
with_dtype!(u32, U32);
with_dtype!(i32, I32);
with_dtype!(i64, I64);

/// Odometer over the element indices selected by a layout, in row-major
/// order of the logical shape.
pub(crate) struct StridedIndices<'a> {
    layout: &'a Layout,
    index: Vec<usize>,
    remaining: usize,
}

impl<'a> StridedIndices<'a> {
    pub(crate) fn new(layout: &'a Layout) -> Self {
        Self {
            layout,
            index: vec![0; layout.ndim()],
            remaining: layout.size(),
        }
    }
}

impl Iterator for StridedIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let strides = self.layout.strides();
        let current = self.layout.offset()
            + self
                .index
                .iter()
                .zip(strides.iter())
                .map(|(idx, stride)| idx * stride)
                .sum::<usize>();

        let dims = self.layout.shape().dims();
        for dim in (0..self.index.len()).rev() {
            self.index[dim] += 1;
            if self.index[dim] < dims[dim] {
                break;
            }
            self.index[dim] = 0;
        }

        Some(current)
    }
}

impl CpuStorage {
    pub fn from_vec<T: WithDType>(data: Vec<T>) -> Self {
        T::into_cpu_storage(data)
    }

    /// Storage of `len` elements, all set to `value` converted into `dtype`.
    pub fn filled(dtype: DType, len: usize, value: f64) -> Self {
        match dtype {
            DType::BOOL => Self::BOOL(vec![value != 0.0; len]),
            DType::F8E4M3 => Self::F8E4M3(vec![F8E4M3::from(value as f32); len]),
            DType::BF16 => Self::BF16(vec![bf16::from_f64(value); len]),
            DType::F16 => Self::F16(vec![f16::from_f64(value); len]),
            DType::F32 => Self::F32(vec![value as f32; len]),
            DType::F64 => Self::F64(vec![value; len]),
            DType::U8 => Self::U8(vec![value as u8; len]),
            DType::U32 => Self::U32(vec![value as u32; len]),
            DType::I32 => Self::I32(vec![value as i32; len]),
            DType::I64 => Self::I64(vec![value as i64; len]),
        }
    }

    pub fn zeros(dtype: DType, len: usize) -> Self {
        Self::filled(dtype, len, 0.0)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::BOOL(data) => data.len(),
            Self::F8E4M3(data) => data.len(),
            Self::BF16(data) => data.len(),
            Self::F16(data) => data.len(),
            Self::F32(data) => data.len(),
            Self::F64(data) => data.len(),
            Self::U8(data) => data.len(),
            Self::U32(data) => data.len(),
            Self::I32(data) => data.len(),
            Self::I64(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `values`, converted into this storage's float dtype, into
    /// the elements selected by `layout`, in row-major order.
    pub fn write_f64(&mut self, layout: &Layout, values: &[f64]) -> DotoriResult<()> {
        if layout.size() != values.len() {
            return Err(DotoriError::SizeMismatch {
                expected: layout.size(),
                got: values.len(),
            });
        }

        let dtype = self.dtype();

        macro_rules! scatter {
            ($data:expr, $from:expr) => {{
                let data = $data;
                for (i, &v) in StridedIndices::new(layout).zip(values.iter()) {
                    match data.get_mut(i) {
                        Some(slot) => *slot = $from(v),
                        None => {
                            return Err(DotoriError::SizeMismatch {
                                expected: i + 1,
                                got: data.len(),
                            })
                        },
                    }
                }
                Ok(())
            }};
        }

        match self {
            Self::BF16(data) => scatter!(data, bf16::from_f64),
            Self::F16(data) => scatter!(data, f16::from_f64),
            Self::F32(data) => scatter!(data, |v: f64| v as f32),
            Self::F64(data) => scatter!(data, |v: f64| v),
            _ => Err(DotoriError::UnsupportedDTypeCast {
                from: DType::F64,
                to: dtype,
            }),
        }
    }

    /// Reads the elements selected by `layout` as f64, in row-major order.
    pub fn to_f64_vec(&self, layout: &Layout) -> DotoriResult<Vec<f64>> {
        macro_rules! gather {
            ($data:expr, $get:expr) => {{
                let data = $data;
                StridedIndices::new(layout)
                    .map(|i| {
                        data.get(i).copied().map($get).ok_or(DotoriError::SizeMismatch {
                            expected: i + 1,
                            got: data.len(),
                        })
                    })
                    .collect()
            }};
        }

        match self {
            Self::BOOL(data) => gather!(data, |v: bool| if v { 1.0 } else { 0.0 }),
            Self::F8E4M3(data) => gather!(data, |v: F8E4M3| v.to_f64()),
            Self::BF16(data) => gather!(data, |v: bf16| v.to_f64()),
            Self::F16(data) => gather!(data, |v: f16| v.to_f64()),
            Self::F32(data) => gather!(data, |v: f32| v as f64),
            Self::F64(data) => gather!(data, |v: f64| v),
            Self::U8(data) => gather!(data, |v: u8| v as f64),
            Self::U32(data) => gather!(data, |v: u32| v as f64),
            Self::I32(data) => gather!(data, |v: i32| v as f64),
            Self::I64(data) => gather!(data, |v: i64| v as f64),
        }
    }
}

impl BackendStorageT for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            Self::BOOL(_) => DType::BOOL,
            Self::F8E4M3(_) => DType::F8E4M3,
            Self::BF16(_) => DType::BF16,
            Self::F16(_) => DType::F16,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::U8(_) => DType::U8,
            Self::U32(_) => DType::U32,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
        }
    }

    fn device(&self) -> Device {
        Device::CPU
    }

    fn get_nbytes(&self) -> usize {
        self.len() * self.dtype().get_size_in_bytes()
    }

    fn to_cpu_storage(&self) -> DotoriResult<CpuStorage> {
        Ok(self.clone())
    }

    fn to_dtype(&self, target_dtype: DType) -> DotoriResult<Self> {
        if self.dtype() == target_dtype {
            return Ok(self.clone());
        }

        macro_rules! convert {
            ($data:expr, $convert_fn:expr) => {
                $data.iter().map(|&v| $convert_fn(v)).collect()
            };
        }

        // Only float-to-float conversions take part in parameter dtype
        // reconciliation; everything else is rejected.
        let result = match (self, target_dtype) {
            (Self::BF16(data), DType::F32) => Self::F32(convert!(data, |v: bf16| v.to_f32())),
            (Self::BF16(data), DType::F64) => Self::F64(convert!(data, |v: bf16| v.to_f64())),
            (Self::F16(data), DType::F32) => Self::F32(convert!(data, |v: f16| v.to_f32())),
            (Self::F16(data), DType::F64) => Self::F64(convert!(data, |v: f16| v.to_f64())),
            (Self::F32(data), DType::BF16) => Self::BF16(convert!(data, bf16::from_f32)),
            (Self::F32(data), DType::F16) => Self::F16(convert!(data, f16::from_f32)),
            (Self::F32(data), DType::F64) => Self::F64(convert!(data, |v: f32| v as f64)),
            (Self::F64(data), DType::BF16) => Self::BF16(convert!(data, bf16::from_f64)),
            (Self::F64(data), DType::F16) => Self::F16(convert!(data, f16::from_f64)),
            (Self::F64(data), DType::F32) => Self::F32(convert!(data, |v: f64| v as f32)),
            (Self::F8E4M3(data), DType::F32) => Self::F32(convert!(data, |v: F8E4M3| v.to_f32())),
            (Self::F8E4M3(data), DType::F64) => Self::F64(convert!(data, |v: F8E4M3| v.to_f64())),
            _ => {
                return Err(DotoriError::UnsupportedDTypeCast {
                    from: self.dtype(),
                    to: target_dtype,
                })
            },
        };
        Ok(result)
    }

    fn copy_strided(&self, layout: &Layout) -> DotoriResult<Self> {
        macro_rules! gather {
            ($data:expr, $variant:ident) => {{
                let data = $data;
                let gathered: DotoriResult<Vec<_>> = StridedIndices::new(layout)
                    .map(|i| {
                        data.get(i).copied().ok_or(DotoriError::SizeMismatch {
                            expected: i + 1,
                            got: data.len(),
                        })
                    })
                    .collect();
                Ok(Self::$variant(gathered?))
            }};
        }

        match self {
            Self::BOOL(data) => gather!(data, BOOL),
            Self::F8E4M3(data) => gather!(data, F8E4M3),
            Self::BF16(data) => gather!(data, BF16),
            Self::F16(data) => gather!(data, F16),
            Self::F32(data) => gather!(data, F32),
            Self::F64(data) => gather!(data, F64),
            Self::U8(data) => gather!(data, U8),
            Self::U32(data) => gather!(data, U32),
            Self::I32(data) => gather!(data, I32),
            Self::I64(data) => gather!(data, I64),
        }
    }

    fn copy_from(&mut self, src: &Self) -> DotoriResult<()> {
        if self.len() != src.len() {
            return Err(DotoriError::SizeMismatch {
                expected: self.len(),
                got: src.len(),
            });
        }

        match (self, src) {
            (Self::BOOL(dst), Self::BOOL(src)) => dst.copy_from_slice(src),
            (Self::F8E4M3(dst), Self::F8E4M3(src)) => dst.copy_from_slice(src),
            (Self::BF16(dst), Self::BF16(src)) => dst.copy_from_slice(src),
            (Self::F16(dst), Self::F16(src)) => dst.copy_from_slice(src),
            (Self::F32(dst), Self::F32(src)) => dst.copy_from_slice(src),
            (Self::F64(dst), Self::F64(src)) => dst.copy_from_slice(src),
            (Self::U8(dst), Self::U8(src)) => dst.copy_from_slice(src),
            (Self::U32(dst), Self::U32(src)) => dst.copy_from_slice(src),
            (Self::I32(dst), Self::I32(src)) => dst.copy_from_slice(src),
            (Self::I64(dst), Self::I64(src)) => dst.copy_from_slice(src),
            (dst, src) => {
                return Err(DotoriError::DTypeMismatch {
                    expected: dst.dtype(),
                    got: src.dtype(),
                })
            },
        }
        Ok(())
    }
}
