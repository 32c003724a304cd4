// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable byte sizes for backend capacities and buffer sizes.

use crate::BackendError;
use std::fmt;
use std::str::FromStr;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// A byte count that parses from and prints as `"512M"`, `"1G"`, `"64K"`.
///
/// # Parsing
/// - `"512M"` / `"512MB"` → 512 × 1024² bytes
/// - `"1G"` / `"1GB"` → 1024³ bytes
/// - `"64K"` / `"64KB"` → 64 × 1024 bytes
/// - `"4096"` / `"4096B"` → raw byte count
///
/// Suffixes are case-insensitive. Zero is a valid size.
///
/// # Examples
/// ```
/// use backend::ByteSize;
///
/// let s: ByteSize = "1G".parse().unwrap();
/// assert_eq!(s.as_bytes(), 1 << 30);
/// assert_eq!(s.to_string(), "1G");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "SizeRepr", into = "String")]
pub struct ByteSize(usize);

impl ByteSize {
    pub const fn from_bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    pub const fn from_kb(kb: usize) -> Self {
        Self(kb * KB)
    }

    pub const fn from_mb(mb: usize) -> Self {
        Self(mb * MB)
    }

    pub const fn from_gb(gb: usize) -> Self {
        Self(gb * GB)
    }

    pub const fn as_bytes(self) -> usize {
        self.0
    }

    /// Size in mebibytes as a float, for reports.
    pub fn as_mb_f64(self) -> f64 {
        self.0 as f64 / MB as f64
    }
}

impl FromStr for ByteSize {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_uppercase();
        let digits_end = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (num, suffix) = upper.split_at(digits_end);

        let multiplier = match suffix.trim() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => KB,
            "M" | "MB" | "MIB" => MB,
            "G" | "GB" | "GIB" => GB,
            _ => return Err(BackendError::InvalidSize(s.to_string())),
        };
        let value: usize = num
            .parse()
            .map_err(|_| BackendError::InvalidSize(s.to_string()))?;
        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| BackendError::InvalidSize(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "0"),
            b if b % GB == 0 => write!(f, "{}G", b / GB),
            b if b % MB == 0 => write!(f, "{}M", b / MB),
            b if b % KB == 0 => write!(f, "{}K", b / KB),
            b => write!(f, "{b}"),
        }
    }
}

/// Accepts either `"512M"` or a bare integer in configuration files.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SizeRepr {
    Bytes(usize),
    Text(String),
}

impl TryFrom<SizeRepr> for ByteSize {
    type Error = BackendError;

    fn try_from(repr: SizeRepr) -> Result<Self, Self::Error> {
        match repr {
            SizeRepr::Bytes(b) => Ok(Self(b)),
            SizeRepr::Text(s) => s.parse(),
        }
    }
}

impl From<ByteSize> for String {
    fn from(size: ByteSize) -> Self {
        size.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!("512M".parse::<ByteSize>().unwrap(), ByteSize::from_mb(512));
        assert_eq!("512mb".parse::<ByteSize>().unwrap(), ByteSize::from_mb(512));
        assert_eq!("1G".parse::<ByteSize>().unwrap(), ByteSize::from_gb(1));
        assert_eq!("64KiB".parse::<ByteSize>().unwrap(), ByteSize::from_kb(64));
        assert_eq!(" 4096 ".parse::<ByteSize>().unwrap(), ByteSize::from_bytes(4096));
        assert_eq!("0".parse::<ByteSize>().unwrap(), ByteSize::from_bytes(0));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<ByteSize>().is_err());
        assert!("abc".parse::<ByteSize>().is_err());
        assert!("12T".parse::<ByteSize>().is_err());
        assert!("-5M".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ByteSize::from_gb(2).to_string(), "2G");
        assert_eq!(ByteSize::from_mb(1536).to_string(), "1536M");
        assert_eq!(ByteSize::from_kb(3).to_string(), "3K");
        assert_eq!(ByteSize::from_bytes(100).to_string(), "100");
    }

    #[test]
    fn test_serde_accepts_string_and_integer() {
        let a: ByteSize = serde_json::from_str("\"256M\"").unwrap();
        let b: ByteSize = serde_json::from_str("268435456").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"256M\"");
    }
}
