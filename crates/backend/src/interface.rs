// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The backend collaborator interface.

use crate::{BackendError, BufferInfo};
use compute_graph::Tensor;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;

/// A memory provider the allocators place tensors into.
///
/// Backends hand out whole buffers; carving tensors out of them is the
/// allocator's job. Implementations must be thread-safe because buffer
/// descriptors holding a [`BackendRef`] may move between threads.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short identifier, e.g. `"cpu"`. Tensors name their producing
    /// backend by this string.
    fn name(&self) -> &str;

    /// Alignment guaranteed for buffer bases, and expected of tensor
    /// offsets within them.
    fn alignment(&self) -> usize;

    /// Obtains a buffer of at least `size` bytes.
    fn allocate(&self, size: usize) -> Result<BufferInfo, BackendError>;

    /// Returns a buffer obtained from [`allocate`](Backend::allocate).
    ///
    /// Releasing an unknown or already released buffer is a no-op.
    fn release(&self, buffer: &BufferInfo);

    /// Bytes needed to store `tensor` on this backend. Defaults to the
    /// tensor's packed size.
    fn alloc_size(&self, tensor: &Tensor) -> usize {
        tensor.nbytes()
    }
}

/// Rounds `n` up to a multiple of `align` (a power of two).
pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// Checks that `align` is a usable alignment.
pub fn check_alignment(align: usize) -> Result<usize, BackendError> {
    if align.is_power_of_two() {
        Ok(align)
    } else {
        Err(BackendError::InvalidAlignment(align))
    }
}
