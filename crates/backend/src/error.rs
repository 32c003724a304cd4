// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for backend buffer management.

/// Errors reported by a [`Backend`](crate::Backend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend cannot provide a buffer of the requested size.
    #[error("backend '{backend}' out of memory: requested {requested} bytes, {available} available (capacity {capacity})")]
    OutOfDeviceMemory {
        backend: String,
        requested: usize,
        available: usize,
        capacity: usize,
    },

    /// Alignments must be non-zero powers of two.
    #[error("invalid alignment {0}: must be a power of two")]
    InvalidAlignment(usize),

    /// A human-readable size string could not be parsed.
    #[error("invalid size '{0}': expected a number with an optional K/M/G suffix")]
    InvalidSize(String),

    /// A backend's internal bookkeeping lock was poisoned.
    #[error("backend '{0}' state lock poisoned")]
    Poisoned(String),
}
