use anyhow::{bail, ensure, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::U8 => 1,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }
}

/// A fixed-shape numeric buffer over little-endian CPU bytes.
///
/// This is the only tensor representation in the pipeline: samples are
/// loaded into it, runners consume and produce it, and the tolerance
/// tracker reduces over it.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_le_bytes(dtype: DType, shape: Shape, data: Bytes) -> Result<Self> {
        let expected = shape.numel() * dtype.byte_size();
        ensure!(
            data.len() == expected,
            "tensor byte size mismatch: got {}, expected {} ({} x {})",
            data.len(),
            expected,
            shape.numel(),
            dtype,
        );
        Ok(Self { dtype, shape, data })
    }

    pub fn from_f32s(shape: Shape, values: &[f32]) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * 4);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_le_bytes(DType::F32, shape, Bytes::from(data))
    }

    /// Encodes f64 values into the requested dtype. Lossy for integer
    /// dtypes and for f64 values outside f32 range.
    pub fn from_f64s(dtype: DType, shape: Shape, values: &[f64]) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * dtype.byte_size());
        for &v in values {
            match dtype {
                DType::F32 => data.extend_from_slice(&(v as f32).to_le_bytes()),
                DType::I64 => data.extend_from_slice(&(v as i64).to_le_bytes()),
                DType::I32 => data.extend_from_slice(&(v as i32).to_le_bytes()),
                DType::U8 => data.push(v as u8),
                DType::F16 => bail!("f16 tensors cannot be built from f64 values"),
            }
        }
        Self::from_le_bytes(dtype, shape, Bytes::from(data))
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Decodes every element to f64, in row-major order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let out = match self.dtype {
            DType::F32 => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            DType::I64 => self
                .data
                .chunks_exact(8)
                .map(|b| {
                    i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
                })
                .collect(),
            DType::I32 => self
                .data
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            DType::U8 => self.data.iter().map(|&b| b as f64).collect(),
            DType::F16 => bail!("f16 tensors are not supported in comparisons"),
        };
        Ok(out)
    }

    /// Repeats each slice along `axis` `n` times, growing that
    /// dimension by a factor of `n`. Used to expand a batch-1 sample to
    /// a batch-N sample for profiling.
    pub fn repeat(&self, axis: usize, n: usize) -> Result<Tensor> {
        ensure!(
            axis < self.shape.rank(),
            "repeat axis {} out of range for rank {}",
            axis,
            self.shape.rank()
        );
        ensure!(n > 0, "repeat count must be positive");

        let dims = &self.shape.0;
        let elem = self.dtype.byte_size();
        let outer: usize = dims[..axis].iter().product::<usize>().max(1);
        let axis_len = dims[axis];
        let inner = dims[axis + 1..].iter().product::<usize>().max(1) * elem;

        let mut out = Vec::with_capacity(self.data.len() * n);
        for o in 0..outer {
            for a in 0..axis_len {
                let start = (o * axis_len + a) * inner;
                let chunk = &self.data[start..start + inner];
                for _ in 0..n {
                    out.extend_from_slice(chunk);
                }
            }
        }

        let mut shape = self.shape.clone();
        shape.0[axis] *= n;
        Tensor::from_le_bytes(self.dtype, shape, Bytes::from(out))
    }
}
