// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors.
//!
//! A [`Tensor`] here carries no element data. It describes what the
//! allocator needs: how many bytes the tensor occupies, what produces it,
//! what it reads, whether it aliases another tensor, and where (if
//! anywhere) it has been placed.

use crate::{DType, Op, Shape};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of source tensors a node can read.
pub const MAX_SRC: usize = 6;

/// Identity of a tensor within its [`ComputeGraph`](crate::ComputeGraph).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct TensorId(pub(crate) u32);

impl TensorId {
    /// Position of the tensor in its graph's tensor table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of a memory buffer.
///
/// Measure-mode allocators also draw an id so that placements they hand
/// out can be told apart from real ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BufferId(u64);

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

impl BufferId {
    /// Draws a fresh id.
    pub fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// The aliasing relation of a view tensor.
///
/// `src` is always a non-view tensor: views of views are collapsed onto
/// the root with their offsets summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ViewSource {
    pub src: TensorId,
    pub offset: usize,
}

/// Where a tensor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TensorData {
    /// Buffer holding the tensor.
    pub buffer: BufferId,
    /// Byte offset from the buffer's base.
    pub offset: usize,
    /// `true` when an allocator placed the tensor; `false` when the caller
    /// did. Caller placements are never moved or reclaimed.
    pub planned: bool,
}

impl TensorData {
    /// A caller-provided placement.
    pub fn external(buffer: BufferId, offset: usize) -> Self {
        Self {
            buffer,
            offset,
            planned: false,
        }
    }

    /// A placement made by an allocator.
    pub fn planned(buffer: BufferId, offset: usize) -> Self {
        Self {
            buffer,
            offset,
            planned: true,
        }
    }
}

/// A tensor participating in a computation graph.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub(crate) id: TensorId,
    pub(crate) name: String,
    pub(crate) dtype: DType,
    pub(crate) shape: Shape,
    pub(crate) op: Op,
    pub(crate) src: Vec<TensorId>,
    pub(crate) view: Option<ViewSource>,
    pub(crate) data: Option<TensorData>,
    pub(crate) output: bool,
    pub(crate) backend: Option<String>,
}

impl Tensor {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// Tensors this one reads.
    pub fn src(&self) -> &[TensorId] {
        &self.src
    }

    /// Returns `true` for tensors without a producing op.
    pub fn is_leaf(&self) -> bool {
        self.op == Op::None
    }

    /// Returns `true` if this tensor aliases another tensor's memory.
    pub fn is_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<ViewSource> {
        self.view
    }

    /// The tensor whose memory this view aliases.
    pub fn view_src(&self) -> Option<TensorId> {
        self.view.map(|v| v.src)
    }

    /// Current placement, if any.
    pub fn data(&self) -> Option<TensorData> {
        self.data
    }

    /// Returns `true` if the tensor must survive graph execution.
    pub fn is_output(&self) -> bool {
        self.output
    }

    /// Preferred backend label, if one was assigned.
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Contiguous size in bytes.
    pub fn nbytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Returns `true` if both tensors have identical dtype and extents, so a
    /// kernel can write one over the other element by element.
    pub fn same_layout(&self, other: &Tensor) -> bool {
        self.dtype == other.dtype && self.shape.ne() == other.shape.ne()
    }

    /// One-line description for logs and CLI output.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} '{}' {} {} {} B",
            self.id,
            self.name,
            self.op.as_str(),
            self.dtype.as_str(),
            self.nbytes(),
        );
        if let Some(view) = self.view {
            s.push_str(&format!(" view of {} +{}", view.src, view.offset));
        }
        if self.output {
            s.push_str(" [output]");
        }
        s
    }
}
