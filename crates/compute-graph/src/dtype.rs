// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor element types and their storage footprint.

use crate::GraphError;
use std::str::FromStr;

/// Element types a tensor can hold.
///
/// Quantised types are stored in fixed-size blocks: a row of `ne0`
/// elements occupies `ne0 / block_len()` blocks of `block_bytes()` each.
/// Plain types have a block length of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 32-bit signed integer (row indices, positions).
    I32,
    /// 8-bit signed integer.
    I8,
    /// 4-bit quantised, 32 elements per 18-byte block.
    Q4_0,
    /// 8-bit quantised, 32 elements per 34-byte block.
    Q8_0,
}

impl DType {
    /// Number of elements stored per block.
    pub fn block_len(self) -> usize {
        match self {
            DType::Q4_0 | DType::Q8_0 => 32,
            _ => 1,
        }
    }

    /// Bytes occupied by one block.
    pub fn block_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::I8 => 1,
            DType::Q4_0 => 18,
            DType::Q8_0 => 34,
        }
    }

    /// Returns `true` for block-quantised types.
    pub fn is_quantized(self) -> bool {
        self.block_len() > 1
    }

    /// Bytes needed to store one row of `ne0` elements.
    ///
    /// `ne0` must be a multiple of [`block_len`](Self::block_len); the
    /// graph builder rejects shapes that are not.
    pub fn row_size(self, ne0: usize) -> usize {
        ne0 / self.block_len() * self.block_bytes()
    }

    /// Returns a short lowercase label (`"f32"`, `"q4_0"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I32 => "i32",
            DType::I8 => "i8",
            DType::Q4_0 => "q4_0",
            DType::Q8_0 => "q8_0",
        }
    }
}

impl FromStr for DType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" | "float32" => Ok(DType::F32),
            "f16" | "float16" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            "i32" | "int32" => Ok(DType::I32),
            "i8" | "int8" => Ok(DType::I8),
            "q4_0" => Ok(DType::Q4_0),
            "q8_0" => Ok(DType::Q8_0),
            other => Err(GraphError::UnknownDType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_size_plain() {
        assert_eq!(DType::F32.row_size(10), 40);
        assert_eq!(DType::F16.row_size(10), 20);
        assert_eq!(DType::I8.row_size(10), 10);
    }

    #[test]
    fn test_row_size_quantized() {
        assert_eq!(DType::Q4_0.row_size(64), 2 * 18);
        assert_eq!(DType::Q8_0.row_size(32), 34);
        assert!(DType::Q4_0.is_quantized());
        assert!(!DType::F32.is_quantized());
    }

    #[test]
    fn test_parse() {
        assert_eq!("F32".parse::<DType>().unwrap(), DType::F32);
        assert_eq!("q8_0".parse::<DType>().unwrap(), DType::Q8_0);
        assert!("f64".parse::<DType>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DType::Q4_0).unwrap();
        assert_eq!(json, "\"q4_0\"");
    }
}
