// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host memory backend.
//!
//! Each buffer is a zeroed heap allocation over-sized by the alignment so
//! that an aligned base always fits. Live allocations are kept in a table
//! keyed by [`BufferId`]; releasing removes the entry and frees the memory.

use crate::interface::{align_up, check_alignment};
use crate::{Backend, BackendError, BufferInfo};
use compute_graph::BufferId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Default host alignment, matching common SIMD widths.
pub const CPU_DEFAULT_ALIGNMENT: usize = 32;

/// Heap-backed [`Backend`].
#[derive(Debug)]
pub struct CpuBackend {
    alignment: usize,
    /// Live storage, keyed by buffer id.
    buffers: Mutex<HashMap<BufferId, Box<[u8]>>>,
    /// Bytes handed out and not yet released.
    live_bytes: AtomicUsize,
    releases: AtomicU64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            alignment: CPU_DEFAULT_ALIGNMENT,
            buffers: Mutex::new(HashMap::new()),
            live_bytes: AtomicUsize::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Creates a backend that aligns buffer bases to `alignment`.
    pub fn with_alignment(alignment: usize) -> Result<Self, BackendError> {
        Ok(Self {
            alignment: check_alignment(alignment)?,
            ..Self::new()
        })
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Number of buffers released so far.
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::Acquire)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn allocate(&self, size: usize) -> Result<BufferInfo, BackendError> {
        let storage = vec![0u8; size + self.alignment].into_boxed_slice();
        let base = align_up(storage.as_ptr() as usize, self.alignment);
        let info = BufferInfo::new(base, size, self.alignment);

        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| BackendError::Poisoned(self.name().to_string()))?;
        buffers.insert(info.id, storage);
        self.live_bytes.fetch_add(size, Ordering::Release);
        Ok(info)
    }

    fn release(&self, buffer: &BufferInfo) {
        let removed = match self.buffers.lock() {
            Ok(mut buffers) => buffers.remove(&buffer.id),
            Err(_) => None,
        };
        match removed {
            Some(_) => {
                self.live_bytes.fetch_sub(buffer.size, Ordering::Release);
                self.releases.fetch_add(1, Ordering::Release);
            }
            None => tracing::warn!("cpu: release of unknown buffer {}", buffer.id),
        }
    }
}
