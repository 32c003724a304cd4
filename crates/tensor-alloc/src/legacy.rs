// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-buffer convenience allocator.
//!
//! [`Allocator`] bundles one [`GraphAllocator`] with one
//! [`TensorAllocator`] for callers that plan a graph into a single buffer.
//! Every call forwards to one of the two; the parse sequence lives only in
//! the graph allocator.

use crate::{AllocError, GraphAllocator, GraphPassStats, ParseStep, TensorAllocator};
use backend::{BackendBuffer, BackendRef};
use compute_graph::{ComputeGraph, TensorData, TensorId, Validated};

/// A graph allocator bound to one tensor allocator.
#[derive(Debug)]
pub struct Allocator {
    graph: GraphAllocator,
    tensors: TensorAllocator,
}

impl Allocator {
    pub fn new(base: usize, size: usize, alignment: usize) -> Result<Self, AllocError> {
        Ok(Self::wrap(TensorAllocator::new(base, size, alignment)?))
    }

    pub fn new_measure(alignment: usize) -> Result<Self, AllocError> {
        Ok(Self::wrap(TensorAllocator::new_measure(alignment)?))
    }

    pub fn from_buffer(buffer: BackendBuffer) -> Result<Self, AllocError> {
        Ok(Self::wrap(TensorAllocator::from_buffer(buffer)?))
    }

    pub fn from_backend(backend: &BackendRef, size: usize) -> Result<Self, AllocError> {
        Ok(Self::wrap(TensorAllocator::from_backend(backend, size)?))
    }

    pub fn measure_from_backend(backend: &BackendRef) -> Result<Self, AllocError> {
        Ok(Self::wrap(TensorAllocator::measure_from_backend(backend)?))
    }

    fn wrap(tensors: TensorAllocator) -> Self {
        Self {
            graph: GraphAllocator::new(),
            tensors,
        }
    }

    pub fn buffer(&self) -> Option<&BackendBuffer> {
        self.tensors.buffer()
    }

    pub fn is_measure(&self) -> bool {
        self.tensors.is_measure()
    }

    pub fn reset(&mut self) {
        self.tensors.reset();
    }

    /// Places a single tensor.
    pub fn alloc(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        id: TensorId,
    ) -> Result<TensorData, AllocError> {
        self.tensors.alloc(graph, id)
    }

    pub fn max_size(&self) -> usize {
        self.tensors.max_size()
    }

    pub fn set_parse_seq(&mut self, steps: Vec<ParseStep>) {
        self.graph.set_parse_seq(steps);
    }

    pub fn set_parse_seq_raw(&mut self, raw: &[i32]) -> Result<(), AllocError> {
        self.graph.set_parse_seq_raw(raw)
    }

    /// Plans `graph` into the bound buffer. Returns the high-water mark.
    pub fn alloc_graph(&mut self, graph: &mut ComputeGraph<Validated>) -> Result<usize, AllocError> {
        self.graph.alloc_graph(graph, &mut self.tensors)
    }

    pub fn tensor_allocator(&self) -> &TensorAllocator {
        &self.tensors
    }

    pub fn graph_stats(&self) -> &GraphPassStats {
        self.graph.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::{CpuBackend, DeviceBackend, ByteSize};
    use compute_graph::{DType, Op, Shape};
    use std::sync::Arc;

    fn mlp() -> ComputeGraph<Validated> {
        let mut g = ComputeGraph::new("mlp");
        let x = g.new_tensor("x", DType::F32, Shape::matrix(64, 8)).unwrap();
        let w = g.new_tensor("w", DType::F32, Shape::matrix(64, 64)).unwrap();
        let h = g
            .op("h", Op::MulMat, &[w, x], DType::F32, Shape::matrix(64, 8))
            .unwrap();
        let a = g
            .op("a", Op::Gelu, &[h], DType::F32, Shape::matrix(64, 8))
            .unwrap();
        let y = g
            .op("y", Op::MulMat, &[w, a], DType::F32, Shape::matrix(64, 8))
            .unwrap();
        g.mark_output(y).unwrap();
        g.validate().unwrap()
    }

    #[test]
    fn test_measure_then_allocate() {
        let cpu: BackendRef = Arc::new(CpuBackend::new());
        let mut g = mlp();

        let mut measure = Allocator::measure_from_backend(&cpu).unwrap();
        assert!(measure.is_measure());
        assert!(measure.buffer().is_none());
        let needed = measure.alloc_graph(&mut g).unwrap();
        assert!(needed > 0);
        assert!(needed < g.total_tensor_bytes());
        assert_eq!(measure.graph_stats().inplace_reused, 1);

        g.clear_planned();
        let mut real = Allocator::from_backend(&cpu, needed).unwrap();
        assert_eq!(real.alloc_graph(&mut g).unwrap(), needed);
        assert_eq!(real.buffer().map(|b| b.size()), Some(needed));
        assert!(g.tensors().all(|t| t.data().is_some()));
    }

    #[test]
    fn test_parse_seq_forwarded() {
        let mut g = mlp();
        let mut alloc = Allocator::new(0, 1 << 20, 32).unwrap();
        alloc.set_parse_seq_raw(&[0, -1, 1, -1, 2, -1]).unwrap();
        alloc.alloc_graph(&mut g).unwrap();
        assert_eq!(alloc.graph_stats().barriers, 3);
        assert_eq!(alloc.graph_stats().nodes_visited, 3);
    }

    #[test]
    fn test_manual_alloc_and_reset() {
        let mut g = mlp();
        let mut alloc = Allocator::new_measure(32).unwrap();
        let x = g.find("x").unwrap();
        let data = alloc.alloc(&mut g, x).unwrap();
        assert_eq!(data.offset, 0);
        assert_eq!(alloc.max_size(), 64 * 8 * 4);

        alloc.reset();
        assert_eq!(alloc.max_size(), 64 * 8 * 4);
        assert_eq!(alloc.tensor_allocator().stats().resets, 1);
    }

    #[test]
    fn test_from_buffer_and_device_limits() {
        let dev: BackendRef = Arc::new(DeviceBackend::new("gpu", ByteSize::from_kb(8)));
        let buffer = BackendBuffer::alloc(&dev, 4096).unwrap();
        let mut alloc = Allocator::from_buffer(buffer).unwrap();
        let mut g = mlp();
        // w alone is 16 KiB.
        assert!(matches!(
            alloc.alloc_graph(&mut g),
            Err(AllocError::OutOfMemory { .. })
        ));
    }
}
