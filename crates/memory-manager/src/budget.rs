// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory budget configuration and parsing.
//!
//! A [`MemoryBudget`] is the hard ceiling for an engine's working memory
//! (the arena holding activations and scratch). Constants are excluded:
//! they stay in the loaded model.

use crate::MemoryError;
use std::fmt;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// A hard ceiling for an engine's arena.
///
/// # Parsing
/// Supports human-readable strings with binary suffixes:
/// - `"256K"` or `"256KB"` → 256 × 1024 bytes
/// - `"4M"` or `"4MB"` → 4 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1024³ bytes
/// - `"65536"` or `"65536B"` → raw byte count
///
/// # Examples
/// ```
/// use memory_manager::MemoryBudget;
///
/// let b = MemoryBudget::parse("256K").unwrap();
/// assert_eq!(b.as_bytes(), 256 * 1024);
/// assert!(b.check(300 * 1024).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_kb(kb: usize) -> Self {
        Self { bytes: kb * KB }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MB }
    }

    /// Returns the budget in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Fails when `required` bytes do not fit.
    pub fn check(&self, required: usize) -> Result<(), MemoryError> {
        if required > self.bytes {
            return Err(MemoryError::OverBudget {
                required_bytes: required,
                budget_bytes: self.bytes,
            });
        }
        Ok(())
    }

    /// Parses a human-readable budget string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let trimmed = s.trim();
        let upper = trimmed.to_uppercase();
        let digits_end = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (number, suffix) = upper.split_at(digits_end);
        let multiplier = match suffix.trim() {
            "" | "B" => 1,
            "K" | "KB" => KB,
            "M" | "MB" => MB,
            "G" | "GB" => GB,
            _ => return Err(MemoryError::InvalidBudget(s.to_string())),
        };
        let value: usize = number
            .parse()
            .map_err(|_| MemoryError::InvalidBudget(s.to_string()))?;
        let bytes = value
            .checked_mul(multiplier)
            .filter(|&b| b > 0)
            .ok_or_else(|| MemoryError::InvalidBudget(s.to_string()))?;
        Ok(Self { bytes })
    }
}

impl TryFrom<String> for MemoryBudget {
    type Error = MemoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MemoryBudget> for String {
    fn from(b: MemoryBudget) -> Self {
        b.to_string().replace(' ', "")
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b >= GB && b % GB == 0 {
            write!(f, "{} GB", b / GB)
        } else if b >= MB && b % MB == 0 {
            write!(f, "{} MB", b / MB)
        } else if b >= KB && b % KB == 0 {
            write!(f, "{} KB", b / KB)
        } else {
            write!(f, "{b} B")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(MemoryBudget::parse("256K").unwrap().as_bytes(), 256 * KB);
        assert_eq!(MemoryBudget::parse("256kb").unwrap().as_bytes(), 256 * KB);
        assert_eq!(MemoryBudget::parse("4M").unwrap().as_bytes(), 4 * MB);
        assert_eq!(MemoryBudget::parse("4 MB").unwrap().as_bytes(), 4 * MB);
        assert_eq!(MemoryBudget::parse("1g").unwrap().as_bytes(), GB);
        assert_eq!(MemoryBudget::parse("65536").unwrap().as_bytes(), 65536);
        assert_eq!(MemoryBudget::parse(" 512B ").unwrap().as_bytes(), 512);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(MemoryBudget::parse("").is_err());
        assert!(MemoryBudget::parse("abc").is_err());
        assert!(MemoryBudget::parse("0K").is_err());
        assert!(MemoryBudget::parse("12Q").is_err());
        assert!(MemoryBudget::parse("-4M").is_err());
    }

    #[test]
    fn test_check() {
        let b = MemoryBudget::from_kb(1);
        assert!(b.check(1024).is_ok());
        assert!(matches!(
            b.check(1025),
            Err(MemoryError::OverBudget { required_bytes: 1025, budget_bytes: 1024 })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryBudget::from_mb(1024).to_string(), "1 GB");
        assert_eq!(MemoryBudget::from_mb(4).to_string(), "4 MB");
        assert_eq!(MemoryBudget::from_bytes(2048).to_string(), "2 KB");
        assert_eq!(MemoryBudget::from_bytes(100).to_string(), "100 B");
    }

    #[test]
    fn test_serde_as_string() {
        let b: MemoryBudget = serde_json::from_str("\"256K\"").unwrap();
        assert_eq!(b, MemoryBudget::from_kb(256));
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"256KB\"");
    }
}
