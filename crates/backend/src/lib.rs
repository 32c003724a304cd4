// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # backend
//!
//! Memory providers for the tensor allocators.
//!
//! # Key Components
//!
//! - [`Backend`]: the collaborator interface: name, alignment, buffer
//!   allocation and release, and per-tensor allocation size.
//! - [`BackendBuffer`]: a descriptor of one buffer plus its backend.
//! - [`OwnedBuffer`]: an RAII guard that releases its buffer exactly
//!   once, on drop.
//! - [`CpuBackend`]: aligned host heap buffers.
//! - [`DeviceBackend`]: a capacity-bounded simulated device with
//!   quantised row padding.
//! - [`ByteSize`]: human-readable sizes (`"512M"`, `"1G"`).
//!
//! # Example
//! ```
//! use backend::{Backend, BackendBuffer, BackendRef, CpuBackend};
//! use std::sync::Arc;
//!
//! let cpu: BackendRef = Arc::new(CpuBackend::new());
//! let buffer = BackendBuffer::alloc(&cpu, 4096).unwrap();
//! assert_eq!(buffer.base() % cpu.alignment(), 0);
//!
//! // Ownership transfers to the guard; the buffer is released on drop.
//! let owned = buffer.into_owned();
//! drop(owned);
//! ```

mod buffer;
mod cpu;
mod device;
mod error;
mod interface;
mod size;

pub use buffer::{BackendBuffer, BufferInfo, OwnedBuffer};
pub use cpu::{CpuBackend, CPU_DEFAULT_ALIGNMENT};
pub use device::{DeviceBackend, DEVICE_DEFAULT_ALIGNMENT, DEVICE_DEFAULT_ROW_PADDING};
pub use error::BackendError;
pub use interface::{align_up, check_alignment, Backend, BackendRef};
pub use size::ByteSize;
