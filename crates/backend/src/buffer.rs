// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend buffer descriptors and the RAII guard for owned buffers.
//!
//! A [`BackendBuffer`] is a cheap, cloneable description of a region a
//! backend handed out: its identity, base address, size, and the backend
//! that owns it. Cloning a descriptor does not duplicate ownership.
//!
//! An [`OwnedBuffer`] is the single owner of such a region. Dropping it
//! releases the region back to its backend exactly once, so an allocator
//! that created its own buffer cannot leak it or free it twice:
//!
//! ```text
//! BackendBuffer::alloc(&backend, size)
//!       │
//!       ▼
//!   BackendBuffer  ──into_owned()──►  OwnedBuffer
//!                                         │  drop()
//!                                         ▼
//!                                 Backend::release(&info)
//! ```

use crate::{Backend, BackendError, BackendRef};
use compute_graph::{BufferId, Tensor};
use std::fmt;
use std::sync::Arc;

/// Identity and geometry of a backend buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BufferInfo {
    /// Process-unique buffer identity.
    pub id: BufferId,
    /// Address of the first byte, already aligned to `alignment`.
    pub base: usize,
    /// Usable size in bytes.
    pub size: usize,
    /// Alignment guaranteed for `base`.
    pub alignment: usize,
}

impl BufferInfo {
    /// Describes a region at `base` with a fresh identity.
    pub fn new(base: usize, size: usize, alignment: usize) -> Self {
        Self {
            id: BufferId::next(),
            base,
            size,
            alignment,
        }
    }

    /// One-past-the-end address.
    pub fn end(&self) -> usize {
        self.base + self.size
    }
}

/// A buffer allocated by a backend, together with that backend.
#[derive(Clone)]
pub struct BackendBuffer {
    info: BufferInfo,
    backend: BackendRef,
}

impl BackendBuffer {
    /// Asks `backend` for a buffer of at least `size` bytes.
    pub fn alloc(backend: &BackendRef, size: usize) -> Result<Self, BackendError> {
        let info = backend.allocate(size)?;
        tracing::debug!(
            "{}: allocated {} ({} bytes at {:#x})",
            backend.name(),
            info.id,
            info.size,
            info.base
        );
        Ok(Self {
            info,
            backend: Arc::clone(backend),
        })
    }

    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    pub fn id(&self) -> BufferId {
        self.info.id
    }

    pub fn base(&self) -> usize {
        self.info.base
    }

    pub fn size(&self) -> usize {
        self.info.size
    }

    pub fn alignment(&self) -> usize {
        self.info.alignment
    }

    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    /// Bytes the owning backend needs to store `tensor`.
    pub fn alloc_size(&self, tensor: &Tensor) -> usize {
        self.backend.alloc_size(tensor)
    }

    /// Takes sole ownership of the region; it is released when the
    /// returned guard drops.
    pub fn into_owned(self) -> OwnedBuffer {
        OwnedBuffer { inner: Some(self) }
    }
}

impl fmt::Debug for BackendBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBuffer")
            .field("backend", &self.backend.name())
            .field("info", &self.info)
            .finish()
    }
}

/// Sole owner of a backend buffer. Releases it on drop.
pub struct OwnedBuffer {
    /// `None` only after the buffer has been released.
    inner: Option<BackendBuffer>,
}

impl OwnedBuffer {
    /// Descriptor of the owned region.
    ///
    /// The descriptor stays valid to read after the guard drops, but the
    /// region it names does not.
    pub fn buffer(&self) -> Option<&BackendBuffer> {
        self.inner.as_ref()
    }

    /// Releases the region now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(buffer) = self.inner.take() {
            tracing::debug!("{}: releasing {}", buffer.backend.name(), buffer.info.id);
            buffer.backend.release(&buffer.info);
        }
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for OwnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("buffer", &self.inner)
            .finish()
    }
}
