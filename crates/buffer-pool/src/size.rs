// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Segment size configuration and parsing.
//!
//! A [`MemorySize`] is the size of one memory segment handed out by a
//! [`BufferPool`](crate::BufferPool). It supports human-readable parsing so
//! configuration files can say `segment_size = "32K"`.

use crate::PoolError;
use std::fmt;

const KB: usize = 1024;
const MB: usize = 1024 * 1024;
const GB: usize = 1024 * 1024 * 1024;

/// A byte count with human-readable parsing and display.
///
/// # Parsing
/// - `"32K"` or `"32KB"` → 32 × 1024 bytes
/// - `"1M"` or `"1MB"` → 1024² bytes
/// - `"1G"` or `"1GB"` → 1024³ bytes
/// - `"1024"` or `"1024B"` → raw byte count
///
/// # Examples
/// ```
/// use buffer_pool::MemorySize;
///
/// let s = MemorySize::parse("32K").unwrap();
/// assert_eq!(s.as_bytes(), 32 * 1024);
/// assert_eq!(s.to_string(), "32 KB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemorySize {
    bytes: usize,
}

impl MemorySize {
    /// Creates a size from a byte count.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// Creates a size from kilobytes.
    pub fn from_kb(kb: usize) -> Self {
        Self { bytes: kb * KB }
    }

    /// Creates a size from megabytes.
    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MB }
    }

    /// Returns the size in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Parses a human-readable size string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, PoolError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PoolError::InvalidSize("empty size string".into()));
        }

        let upper = s.to_uppercase();
        let (num_str, multiplier) = [("GB", GB), ("G", GB), ("MB", MB), ("M", MB), ("KB", KB), ("K", KB), ("B", 1)]
            .iter()
            .find(|(suffix, _)| upper.ends_with(suffix))
            .map(|(suffix, m)| (&s[..s.len() - suffix.len()], *m))
            .unwrap_or((s, 1));

        let value: usize = num_str.trim().parse().map_err(|_| {
            PoolError::InvalidSize(format!(
                "'{s}': expected a number followed by an optional suffix (K, M, G)"
            ))
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| PoolError::InvalidSize(format!("'{s}' overflows usize")))?;

        if bytes == 0 {
            return Err(PoolError::ZeroSized("memory size"));
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= GB && self.bytes % GB == 0 {
            write!(f, "{} GB", self.bytes / GB)
        } else if self.bytes >= MB && self.bytes % MB == 0 {
            write!(f, "{} MB", self.bytes / MB)
        } else if self.bytes >= KB && self.bytes % KB == 0 {
            write!(f, "{} KB", self.bytes / KB)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}
