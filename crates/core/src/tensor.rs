// SPDX-License-Identifier: MIT

//! Binary tensor codec: `{dtype, shape, data: base64}` on the wire, a flat
//! little-endian byte buffer plus shape in memory.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    Float128,
}

impl DType {
    /// Width in bytes of one element of this dtype.
    pub fn item_size(self) -> usize {
        match self {
            DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 => 8,
            DType::Float128 => 16,
        }
    }
}

/// A tensor as the daemon moves it around internally: a flat little-endian
/// byte buffer, tagged with dtype and shape. No numeric interpretation
/// happens here; that's the inference engine adapter's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<u64>,
    pub data: Vec<u8>,
}

impl Tensor {
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    fn expected_byte_len(&self) -> u64 {
        self.element_count() * self.dtype.item_size() as u64
    }

    /// Build a tensor from raw bytes, validating that the buffer length
    /// matches `shape` and `dtype`.
    pub fn new(dtype: DType, shape: Vec<u64>, data: Vec<u8>) -> Result<Self, DaemonError> {
        let t = Tensor { dtype, shape, data };
        let expected = t.expected_byte_len();
        if t.data.len() as u64 != expected {
            return Err(DaemonError::InvalidTensor(format!(
                "shape/dtype imply {} bytes, got {}",
                expected,
                t.data.len()
            )));
        }
        Ok(t)
    }

    pub fn encode(&self) -> WireTensor {
        WireTensor {
            dtype: self.dtype,
            shape: self.shape.clone(),
            data: BASE64.encode(&self.data),
        }
    }

    pub fn decode(wire: &WireTensor) -> Result<Self, DaemonError> {
        let bytes = BASE64
            .decode(&wire.data)
            .map_err(|e| DaemonError::InvalidTensor(format!("invalid base64: {e}")))?;
        Tensor::new(wire.dtype, wire.shape.clone(), bytes)
    }
}

/// The JSON shape a tensor takes on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTensor {
    pub dtype: DType,
    pub shape: Vec<u64>,
    pub data: String,
}

#[cfg(test)]
#[path = "tensor_tests.rs"]
mod tests;
