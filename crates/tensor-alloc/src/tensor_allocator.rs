// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Offset allocator over a single buffer.
//!
//! A [`TensorAllocator`] carves tensor regions out of one contiguous
//! buffer. Free space is an offset-sorted list of [`FreeBlock`]s; adjacent
//! blocks are always merged, so the list never holds two blocks that
//! touch.
//!
//! # Placement policy
//!
//! Best fit over every block except the last, falling back to the last
//! (tail) block. The tail is usually the large untouched remainder of the
//! buffer, so holes left by freed tensors are filled before the high-water
//! mark moves:
//!
//! ```text
//! offset 0                                                    size
//! ├──────┬────────┬──────┬─────────┬─────────────────────────────┤
//! │ live │  free  │ live │  free   │        free (tail)          │
//! └──────┴────────┴──────┴─────────┴─────────────────────────────┘
//!           ▲ best fit among these    ▲ only if no hole fits
//! ```
//!
//! # Measure mode
//!
//! A measure allocator runs the identical algorithm over a virtual region
//! of `usize::MAX / 2` bytes at base 0. Its [`max_size`] is therefore the
//! exact end offset a real buffer would reach for the same sequence of
//! requests, so a buffer of that size is always sufficient.
//!
//! [`max_size`]: TensorAllocator::max_size

use crate::{AllocError, AllocationStats};
use backend::{align_up, Backend, BackendBuffer, BackendRef, OwnedBuffer};
use compute_graph::{BufferId, ComputeGraph, Tensor, TensorData, TensorId, Validated};

/// Size of the virtual region used in measure mode.
pub const MEASURE_SIZE: usize = usize::MAX / 2;

/// A free span of the buffer, relative to its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FreeBlock {
    pub offset: usize,
    pub size: usize,
}

impl FreeBlock {
    fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Where a real allocator's memory comes from.
#[derive(Debug)]
enum Binding {
    /// Caller memory described by base address and size.
    Raw,
    /// A backend buffer the caller keeps ownership of.
    Borrowed(BackendBuffer),
    /// A backend buffer released when the allocator drops.
    Owned(OwnedBuffer),
}

#[derive(Debug)]
enum Mode {
    /// `sizing` keeps a tiny backend buffer alive so per-tensor sizes can
    /// be asked of its backend.
    Measure { sizing: Option<OwnedBuffer> },
    Real(Binding),
}

/// Best-fit offset allocator over one buffer (or a virtual region).
#[derive(Debug)]
pub struct TensorAllocator {
    /// Identity stamped on every placement this allocator hands out.
    id: BufferId,
    base: usize,
    size: usize,
    alignment: usize,
    mode: Mode,
    free_blocks: Vec<FreeBlock>,
    max_size: usize,
    stats: AllocationStats,
}

impl TensorAllocator {
    // ── Constructors ────────────────────────────────────────────────

    /// Serves offsets into caller memory at `base` spanning `size` bytes.
    ///
    /// The first offset handed out is the one that makes `base + offset`
    /// aligned. Those leading bytes count against `size`, and a measure pass
    /// always runs at base 0: sizing an unaligned `base` from a measured
    /// figure needs `align_up(base, alignment) - base` bytes on top of it.
    pub fn new(base: usize, size: usize, alignment: usize) -> Result<Self, AllocError> {
        Self::build(BufferId::next(), base, size, alignment, Mode::Real(Binding::Raw))
    }

    /// A measure-mode allocator: no memory, only the high-water mark.
    pub fn new_measure(alignment: usize) -> Result<Self, AllocError> {
        Self::build(
            BufferId::next(),
            0,
            MEASURE_SIZE,
            alignment,
            Mode::Measure { sizing: None },
        )
    }

    /// Serves offsets into `buffer`, which stays owned by the caller.
    pub fn from_buffer(buffer: BackendBuffer) -> Result<Self, AllocError> {
        Self::build(
            buffer.id(),
            buffer.base(),
            buffer.size(),
            buffer.alignment(),
            Mode::Real(Binding::Borrowed(buffer)),
        )
    }

    /// Asks `backend` for a `size`-byte buffer and owns it: the buffer is
    /// released exactly once, when the allocator drops.
    pub fn from_backend(backend: &BackendRef, size: usize) -> Result<Self, AllocError> {
        let buffer = BackendBuffer::alloc(backend, size)?;
        let info = *buffer.info();
        Self::build(
            info.id,
            info.base,
            info.size,
            info.alignment,
            Mode::Real(Binding::Owned(buffer.into_owned())),
        )
    }

    /// A measure-mode allocator that sizes and aligns tensors the way
    /// `backend` would.
    pub fn measure_from_backend(backend: &BackendRef) -> Result<Self, AllocError> {
        let sizing = BackendBuffer::alloc(backend, 1)?.into_owned();
        Self::build(
            BufferId::next(),
            0,
            MEASURE_SIZE,
            backend.alignment(),
            Mode::Measure {
                sizing: Some(sizing),
            },
        )
    }

    fn build(
        id: BufferId,
        base: usize,
        size: usize,
        alignment: usize,
        mode: Mode,
    ) -> Result<Self, AllocError> {
        if !alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment(alignment));
        }
        let mut alloc = Self {
            id,
            base,
            size,
            alignment,
            mode,
            free_blocks: Vec::new(),
            max_size: 0,
            stats: AllocationStats::default(),
        };
        alloc.reset_free_list();
        Ok(alloc)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn is_measure(&self) -> bool {
        matches!(self.mode, Mode::Measure { .. })
    }

    /// The backend buffer this allocator serves from, if any.
    pub fn buffer(&self) -> Option<&BackendBuffer> {
        match &self.mode {
            Mode::Real(Binding::Borrowed(b)) => Some(b),
            Mode::Real(Binding::Owned(o)) => o.buffer(),
            Mode::Real(Binding::Raw) | Mode::Measure { .. } => None,
        }
    }

    /// Identity stamped on placements from this allocator.
    pub fn buffer_id(&self) -> BufferId {
        self.id
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Bytes managed: the buffer size, or [`MEASURE_SIZE`].
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Highest end offset ever handed out. Survives [`reset`](Self::reset).
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> &AllocationStats {
        &self.stats
    }

    pub fn free_blocks(&self) -> &[FreeBlock] {
        &self.free_blocks
    }

    /// Total bytes in the free list.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks.iter().map(|b| b.size).sum()
    }

    pub fn largest_free(&self) -> usize {
        self.free_blocks.iter().map(|b| b.size).max().unwrap_or(0)
    }

    /// Whether `data` is a placement in this allocator's buffer.
    pub fn owns(&self, data: &TensorData) -> bool {
        data.buffer == self.id
    }

    /// Bytes this allocator reserves for `tensor`: the backend's
    /// allocation size rounded up to the alignment.
    pub fn tensor_size(&self, tensor: &Tensor) -> usize {
        let sizing_buffer = match &self.mode {
            Mode::Real(Binding::Borrowed(b)) => Some(b),
            Mode::Real(Binding::Owned(o)) | Mode::Measure { sizing: Some(o) } => o.buffer(),
            Mode::Real(Binding::Raw) | Mode::Measure { sizing: None } => None,
        };
        let size = sizing_buffer.map_or_else(|| tensor.nbytes(), |b| b.alloc_size(tensor));
        align_up(size, self.alignment)
    }

    // ── Allocation ──────────────────────────────────────────────────

    /// Places `id` in this allocator and records the placement on the
    /// tensor.
    pub fn alloc(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        id: TensorId,
    ) -> Result<TensorData, AllocError> {
        let tensor = graph.tensor(id);
        if tensor.is_view() {
            return Err(AllocError::ViewAllocation {
                tensor: tensor.name().to_string(),
            });
        }
        if tensor.data().is_some() {
            return Err(AllocError::AlreadyAllocated {
                tensor: tensor.name().to_string(),
            });
        }

        let size = self.tensor_size(tensor);
        let Some(offset) = self.take(size) else {
            self.stats.record_oom();
            let largest_free = self.largest_free();
            tracing::warn!(
                "{}: no block fits '{}' ({} bytes, largest free {})",
                self.id,
                tensor.name(),
                size,
                largest_free
            );
            return Err(AllocError::OutOfMemory {
                tensor: tensor.name().to_string(),
                needed: size,
                largest_free,
                buffer_size: self.size,
            });
        };

        tracing::debug!(
            "{}: '{}' → [{}, {}) ({} bytes)",
            self.id,
            tensor.name(),
            offset,
            offset + size,
            size
        );
        let data = TensorData::planned(self.id, offset);
        graph.set_data(id, Some(data));
        Ok(data)
    }

    /// Returns `id`'s region to the free list and clears its placement.
    pub fn free(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        id: TensorId,
    ) -> Result<(), AllocError> {
        let tensor = graph.tensor(id);
        let data = match tensor.data() {
            Some(d) if self.owns(&d) && !tensor.is_view() => d,
            _ => {
                return Err(AllocError::ForeignTensor {
                    tensor: tensor.name().to_string(),
                })
            }
        };
        self.release(tensor, data);
        graph.set_data(id, None);
        Ok(())
    }

    /// Returns `tensor`'s region at `data` without touching the tensor.
    pub(crate) fn release(&mut self, tensor: &Tensor, data: TensorData) {
        let size = self.tensor_size(tensor);
        tracing::debug!(
            "{}: free '{}' [{}, {})",
            self.id,
            tensor.name(),
            data.offset,
            data.offset + size
        );
        self.insert_free(data.offset, size);
        self.stats.record_free(size);
    }

    /// Restores the initial free list. Keeps the buffer and the high-water
    /// mark.
    pub fn reset(&mut self) {
        self.reset_free_list();
        self.stats.record_reset();
    }

    fn reset_free_list(&mut self) {
        let head = align_up(self.base, self.alignment) - self.base;
        self.free_blocks.clear();
        self.free_blocks.push(FreeBlock {
            offset: head,
            size: self.size.saturating_sub(head),
        });
    }

    // ── Free list ───────────────────────────────────────────────────

    /// Removes `size` bytes from the best-fitting block. `None` leaves the
    /// free list untouched.
    fn take(&mut self, size: usize) -> Option<usize> {
        let index = self.best_fit(size)?;
        let tail = self.free_blocks.len() - 1;
        let block = &mut self.free_blocks[index];
        let offset = block.offset;
        block.offset += size;
        block.size -= size;
        // An exhausted tail stays, so a real buffer sized by a measure pass
        // keeps the same free-list shape and makes the same choices.
        if block.size == 0 && index != tail {
            self.free_blocks.remove(index);
        }

        self.max_size = self.max_size.max(offset + size);
        self.stats.record_allocation(size);
        Some(offset)
    }

    fn best_fit(&self, size: usize) -> Option<usize> {
        let tail = self.free_blocks.len().checked_sub(1)?;
        let hole = self.free_blocks[..tail]
            .iter()
            .enumerate()
            .filter(|(_, b)| b.size >= size)
            .min_by_key(|(_, b)| b.size)
            .map(|(i, _)| i);
        hole.or_else(|| (self.free_blocks[tail].size >= size).then_some(tail))
    }

    /// Inserts `[offset, offset + size)`, merging with neighbours.
    fn insert_free(&mut self, offset: usize, size: usize) {
        if size == 0 {
            return;
        }
        let end = offset + size;
        // First block starting after the freed span.
        let next = self.free_blocks.partition_point(|b| b.offset < offset);

        let merges_prev = next > 0 && self.free_blocks[next - 1].end() == offset;
        let merges_next = next < self.free_blocks.len() && self.free_blocks[next].offset == end;

        match (merges_prev, merges_next) {
            (true, true) => {
                let following = self.free_blocks.remove(next);
                self.free_blocks[next - 1].size += size + following.size;
            }
            (true, false) => self.free_blocks[next - 1].size += size,
            (false, true) => {
                let block = &mut self.free_blocks[next];
                block.offset = offset;
                block.size += size;
            }
            (false, false) => self.free_blocks.insert(next, FreeBlock { offset, size }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::{ByteSize, CpuBackend, DeviceBackend};
    use compute_graph::{DType, Shape};
    use std::sync::Arc;

    /// A graph of f32 leafs with the given byte sizes (multiples of 4).
    fn leafs(sizes: &[usize]) -> (ComputeGraph<Validated>, Vec<TensorId>) {
        let mut g = ComputeGraph::new("leafs");
        let mut ids: Vec<TensorId> = sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                g.new_tensor(format!("t{i}"), DType::F32, Shape::vector(s / 4))
                    .unwrap()
            })
            .collect();
        // Validation needs a node.
        let sink = g
            .op("sink", compute_graph::Op::Relu, &ids[..1], DType::F32, Shape::vector(1))
            .unwrap();
        ids.push(sink);
        (g.validate().unwrap(), ids)
    }

    #[test]
    fn test_sequential_allocation() {
        let (mut g, ids) = leafs(&[100, 52, 100]);
        let mut a = TensorAllocator::new(0, 1024, 4).unwrap();
        let offsets: Vec<usize> = ids[..3]
            .iter()
            .map(|&id| a.alloc(&mut g, id).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0, 100, 152]);
        assert_eq!(a.max_size(), 252);
        assert_eq!(a.free_bytes(), 1024 - 252);
    }

    #[test]
    fn test_alignment_rounds_sizes() {
        let (mut g, ids) = leafs(&[4, 4]);
        let mut a = TensorAllocator::new(0, 1024, 32).unwrap();
        assert_eq!(a.alloc(&mut g, ids[0]).unwrap().offset, 0);
        assert_eq!(a.alloc(&mut g, ids[1]).unwrap().offset, 32);
        assert_eq!(a.max_size(), 64);
    }

    #[test]
    fn test_unaligned_base() {
        let (mut g, ids) = leafs(&[16]);
        let mut a = TensorAllocator::new(0x1004, 256, 16).unwrap();
        let data = a.alloc(&mut g, ids[0]).unwrap();
        assert_eq!((a.base() + data.offset) % 16, 0);
        assert_eq!(data.offset, 12);
    }

    #[test]
    fn test_unaligned_base_needs_head_slack() {
        let (mut g, ids) = leafs(&[64, 64]);
        let mut measure = TensorAllocator::new_measure(16).unwrap();
        for &id in &ids[..2] {
            measure.alloc(&mut g, id).unwrap();
        }
        let measured = measure.max_size();
        assert_eq!(measured, 128);
        g.clear_planned();

        let base = 0x1004;
        let head = align_up(base, 16) - base;
        let mut tight = TensorAllocator::new(base, measured, 16).unwrap();
        tight.alloc(&mut g, ids[0]).unwrap();
        assert!(matches!(
            tight.alloc(&mut g, ids[1]),
            Err(AllocError::OutOfMemory { .. })
        ));
        g.clear_planned();

        let mut padded = TensorAllocator::new(base, measured + head, 16).unwrap();
        for &id in &ids[..2] {
            padded.alloc(&mut g, id).unwrap();
        }
        assert_eq!(padded.max_size(), measured + head);
    }

    #[test]
    fn test_best_fit_reuses_hole() {
        // [100, 52, 100], free the first, then a 52-byte tensor must land
        // inside the freed span without moving the high-water mark.
        let (mut g, ids) = leafs(&[100, 52, 100, 52]);
        let mut a = TensorAllocator::new(0, 4096, 4).unwrap();
        for &id in &ids[..3] {
            a.alloc(&mut g, id).unwrap();
        }
        let mark = a.max_size();
        a.free(&mut g, ids[0]).unwrap();
        let data = a.alloc(&mut g, ids[3]).unwrap();
        assert!(data.offset + 52 <= 100);
        assert_eq!(a.max_size(), mark);
    }

    #[test]
    fn test_best_fit_prefers_smallest_hole() {
        let (mut g, ids) = leafs(&[200, 8, 64, 8, 48]);
        let mut a = TensorAllocator::new(0, 4096, 4).unwrap();
        for &id in &ids[..4] {
            a.alloc(&mut g, id).unwrap();
        }
        // Holes: [0, 200) and [208, 272).
        a.free(&mut g, ids[0]).unwrap();
        a.free(&mut g, ids[2]).unwrap();
        let data = a.alloc(&mut g, ids[4]).unwrap();
        assert_eq!(data.offset, 208);
    }

    #[test]
    fn test_free_merges_neighbours() {
        let (mut g, ids) = leafs(&[64, 64, 64]);
        let mut a = TensorAllocator::new(0, 192, 4).unwrap();
        for &id in &ids[..3] {
            a.alloc(&mut g, id).unwrap();
        }
        assert_eq!(a.free_blocks(), &[FreeBlock { offset: 192, size: 0 }]);
        a.free(&mut g, ids[0]).unwrap();
        a.free(&mut g, ids[2]).unwrap();
        assert_eq!(a.free_blocks().len(), 2);
        a.free(&mut g, ids[1]).unwrap();
        assert_eq!(a.free_blocks(), &[FreeBlock { offset: 0, size: 192 }]);
        assert!(g.tensor(ids[1]).data().is_none());
    }

    #[test]
    fn test_oom_leaves_free_list_unchanged() {
        let (mut g, ids) = leafs(&[64, 64, 128]);
        let mut a = TensorAllocator::new(0, 192, 4).unwrap();
        a.alloc(&mut g, ids[0]).unwrap();
        a.alloc(&mut g, ids[1]).unwrap();
        a.free(&mut g, ids[0]).unwrap();
        let before = a.free_blocks().to_vec();

        let err = a.alloc(&mut g, ids[2]).unwrap_err();
        match err {
            AllocError::OutOfMemory {
                needed,
                largest_free,
                buffer_size,
                ..
            } => {
                assert_eq!(needed, 128);
                assert_eq!(largest_free, 64);
                assert_eq!(buffer_size, 192);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.free_blocks(), before.as_slice());
        assert!(g.tensor(ids[2]).data().is_none());
        assert_eq!(a.stats().oom_count, 1);
    }

    #[test]
    fn test_rejects_double_alloc_and_foreign_free() {
        let (mut g, ids) = leafs(&[16, 16]);
        let mut a = TensorAllocator::new(0, 256, 4).unwrap();
        let mut b = TensorAllocator::new(0, 256, 4).unwrap();
        a.alloc(&mut g, ids[0]).unwrap();
        assert!(matches!(
            a.alloc(&mut g, ids[0]),
            Err(AllocError::AlreadyAllocated { .. })
        ));
        assert!(matches!(
            b.free(&mut g, ids[0]),
            Err(AllocError::ForeignTensor { .. })
        ));
        assert!(matches!(
            a.free(&mut g, ids[1]),
            Err(AllocError::ForeignTensor { .. })
        ));
    }

    #[test]
    fn test_invalid_alignment() {
        assert!(matches!(
            TensorAllocator::new(0, 64, 3),
            Err(AllocError::InvalidAlignment(3))
        ));
        assert!(TensorAllocator::new_measure(0).is_err());
    }

    #[test]
    fn test_reset_restores_offsets_keeps_max() {
        let (mut g, ids) = leafs(&[40, 80, 120]);
        let mut a = TensorAllocator::new(0, 1024, 8).unwrap();
        let first: Vec<usize> = ids[..3]
            .iter()
            .map(|&id| a.alloc(&mut g, id).unwrap().offset)
            .collect();
        let mark = a.max_size();

        g.clear_planned();
        a.reset();
        assert_eq!(a.max_size(), mark);
        assert_eq!(a.free_bytes(), 1024);

        let second: Vec<usize> = ids[..3]
            .iter()
            .map(|&id| a.alloc(&mut g, id).unwrap().offset)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_measure_tracks_high_water() {
        let (mut g, ids) = leafs(&[100, 52, 100]);
        let mut m = TensorAllocator::new_measure(4).unwrap();
        assert!(m.is_measure());
        assert!(m.buffer().is_none());
        for &id in &ids[..3] {
            m.alloc(&mut g, id).unwrap();
        }
        m.free(&mut g, ids[1]).unwrap();
        assert_eq!(m.max_size(), 252);
        assert_eq!(m.size(), MEASURE_SIZE);
    }

    #[test]
    fn test_from_backend_owns_buffer() {
        let cpu = Arc::new(CpuBackend::new());
        let backend: BackendRef = cpu.clone();
        let a = TensorAllocator::from_backend(&backend, 4096).unwrap();
        assert!(!a.is_measure());
        assert_eq!(a.buffer().map(|b| b.size()), Some(4096));
        assert_eq!(a.buffer_id(), a.buffer().unwrap().id());
        assert_eq!(cpu.live_buffers(), 1);
        drop(a);
        assert_eq!(cpu.live_buffers(), 0);
        assert_eq!(cpu.release_count(), 1);
    }

    #[test]
    fn test_from_buffer_leaves_buffer_to_caller() {
        let cpu = Arc::new(CpuBackend::new());
        let backend: BackendRef = cpu.clone();
        let buffer = BackendBuffer::alloc(&backend, 1024).unwrap();
        let a = TensorAllocator::from_buffer(buffer.clone()).unwrap();
        assert_eq!(a.alignment(), cpu.alignment());
        drop(a);
        assert_eq!(cpu.live_buffers(), 1);
        drop(buffer.into_owned());
        assert_eq!(cpu.live_buffers(), 0);
    }

    #[test]
    fn test_backend_failure_yields_no_allocator() {
        let dev: BackendRef = Arc::new(DeviceBackend::new("gpu", ByteSize::from_kb(1)));
        let err = TensorAllocator::from_backend(&dev, 4096).unwrap_err();
        assert!(matches!(err, AllocError::Backend(_)));
    }

    #[test]
    fn test_measure_from_backend_uses_backend_sizes() {
        let mut g = ComputeGraph::new("q");
        let q = g
            .new_tensor("q", DType::Q8_0, Shape::matrix(32, 4))
            .unwrap();
        let y = g
            .op("y", compute_graph::Op::Dup, &[q], DType::Q8_0, Shape::matrix(32, 4))
            .unwrap();
        let mut g = g.validate().unwrap();

        let dev = Arc::new(DeviceBackend::new("gpu", ByteSize::from_mb(1)).with_row_padding(64));
        let backend: BackendRef = dev.clone();
        let mut m = TensorAllocator::measure_from_backend(&backend).unwrap();
        assert!(m.is_measure());
        assert_eq!(m.alignment(), dev.alignment());
        assert_eq!(dev.live_buffers(), 1);

        // 4 rows of 34 bytes plus one 32-element pad block, aligned to 256.
        let expected = align_up(4 * 34 + 34, 256);
        assert_eq!(m.tensor_size(g.tensor(q)), expected);
        m.alloc(&mut g, q).unwrap();
        m.alloc(&mut g, y).unwrap();
        assert_eq!(m.max_size(), 2 * expected);

        drop(m);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn test_view_allocation_rejected() {
        let mut g = ComputeGraph::new("v");
        let x = g.new_tensor("x", DType::F32, Shape::vector(16)).unwrap();
        let v = g.view("v", x, 0, Shape::vector(8)).unwrap();
        g.op("y", compute_graph::Op::Relu, &[v], DType::F32, Shape::vector(8))
            .unwrap();
        let mut g = g.validate().unwrap();
        let mut a = TensorAllocator::new(0, 256, 4).unwrap();
        assert!(matches!(
            a.alloc(&mut g, v),
            Err(AllocError::ViewAllocation { .. })
        ));
    }
}
