// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Simulated accelerator backend.
//!
//! [`DeviceBackend`] hands out addresses from a private, bump-allocated
//! address space bounded by a fixed capacity. No host memory is touched,
//! which makes it suitable for planning against devices that are not
//! present. Two device traits matter to the allocator and are modelled:
//!
//! - a hard capacity, exceeded with [`BackendError::OutOfDeviceMemory`];
//! - quantised rows padded to a multiple of `row_padding` elements, so
//!   [`Backend::alloc_size`] can exceed a tensor's packed size.

use crate::interface::{align_up, check_alignment};
use crate::{Backend, BackendError, BufferInfo, ByteSize};
use compute_graph::{BufferId, Tensor};
use std::collections::HashMap;
use std::sync::Mutex;

/// Default device alignment.
pub const DEVICE_DEFAULT_ALIGNMENT: usize = 256;

/// Default quantised row padding, in elements.
pub const DEVICE_DEFAULT_ROW_PADDING: usize = 512;

/// First address handed out. Non-zero so device offsets never look null.
const DEVICE_BASE: usize = 0x1000_0000;

#[derive(Debug, Default)]
struct DeviceState {
    /// Bytes held by live buffers.
    used: usize,
    /// Next unissued address.
    next_addr: usize,
    live: HashMap<BufferId, usize>,
    total_allocations: u64,
}

/// A capacity-bounded simulated device.
#[derive(Debug)]
pub struct DeviceBackend {
    name: String,
    capacity: ByteSize,
    alignment: usize,
    row_padding: usize,
    state: Mutex<DeviceState>,
}

impl DeviceBackend {
    pub fn new(name: impl Into<String>, capacity: ByteSize) -> Self {
        Self {
            name: name.into(),
            capacity,
            alignment: DEVICE_DEFAULT_ALIGNMENT,
            row_padding: DEVICE_DEFAULT_ROW_PADDING,
            state: Mutex::new(DeviceState {
                next_addr: DEVICE_BASE,
                ..DeviceState::default()
            }),
        }
    }

    pub fn with_alignment(mut self, alignment: usize) -> Result<Self, BackendError> {
        self.alignment = check_alignment(alignment)?;
        Ok(self)
    }

    /// Sets the quantised row padding; `0` or `1` disables padding.
    pub fn with_row_padding(mut self, elements: usize) -> Self {
        self.row_padding = elements.max(1);
        self
    }

    pub fn capacity(&self) -> ByteSize {
        self.capacity
    }

    /// Bytes held by live buffers.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().map(|s| s.used).unwrap_or(0)
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().map(|s| s.live.len()).unwrap_or(0)
    }

    pub fn total_allocations(&self) -> u64 {
        self.state.lock().map(|s| s.total_allocations).unwrap_or(0)
    }
}

impl Backend for DeviceBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn allocate(&self, size: usize) -> Result<BufferInfo, BackendError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BackendError::Poisoned(self.name.clone()))?;

        let capacity = self.capacity.as_bytes();
        let available = capacity.saturating_sub(state.used);
        if size > available {
            tracing::warn!(
                "{}: cannot allocate {} bytes ({} of {} in use)",
                self.name,
                size,
                state.used,
                capacity
            );
            return Err(BackendError::OutOfDeviceMemory {
                backend: self.name.clone(),
                requested: size,
                available,
                capacity,
            });
        }

        let base = align_up(state.next_addr, self.alignment);
        state.next_addr = base + size.max(1);
        state.used += size;
        state.total_allocations += 1;

        let info = BufferInfo::new(base, size, self.alignment);
        state.live.insert(info.id, size);
        Ok(info)
    }

    fn release(&self, buffer: &BufferInfo) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match state.live.remove(&buffer.id) {
            Some(size) => state.used -= size,
            None => tracing::warn!("{}: release of unknown buffer {}", self.name, buffer.id),
        }
    }

    fn alloc_size(&self, tensor: &Tensor) -> usize {
        let size = tensor.nbytes();
        let dtype = tensor.dtype();
        let ne0 = tensor.shape().ne()[0];
        if dtype.is_quantized() && ne0 % self.row_padding != 0 {
            let pad = self.row_padding - ne0 % self.row_padding;
            size + dtype.row_size(pad)
        } else {
            size
        }
    }
}
