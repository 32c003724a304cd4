// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for profiling and diagnostics.
//!
//! [`AllocationStats`] accumulates over the lifetime of a
//! [`TensorAllocator`](crate::TensorAllocator): live and peak bytes,
//! failures, and frees. [`GraphPassStats`] describes the most recent
//! graph pass of a [`GraphAllocator`](crate::GraphAllocator).

/// Cumulative statistics of one tensor allocator.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Successful allocations.
    pub total_allocations: u64,
    /// Allocations rejected for lack of a fitting block.
    pub oom_count: u64,
    /// Regions returned to the free list.
    pub total_frees: u64,
    /// Bytes currently handed out.
    pub live_bytes: usize,
    /// Highest `live_bytes` seen. Unlike the high-water mark this ignores
    /// fragmentation.
    pub peak_live_bytes: usize,
    /// Total bytes ever allocated, including reused space.
    pub cumulative_allocated_bytes: u64,
    /// Number of `reset` calls.
    pub resets: u64,
}

impl AllocationStats {
    pub(crate) fn record_allocation(&mut self, size: usize) {
        self.total_allocations += 1;
        self.cumulative_allocated_bytes += size as u64;
        self.live_bytes += size;
        self.update_peak(self.live_bytes);
    }

    pub(crate) fn record_free(&mut self, size: usize) {
        self.total_frees += 1;
        self.live_bytes = self.live_bytes.saturating_sub(size);
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    pub(crate) fn record_reset(&mut self) {
        self.resets += 1;
        self.live_bytes = 0;
    }

    fn update_peak(&mut self, current_bytes: usize) {
        if current_bytes > self.peak_live_bytes {
            self.peak_live_bytes = current_bytes;
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_live_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Allocations: {} ok, {} OOMs, {} frees, peak live {:.2} MB, {} resets",
            self.total_allocations, self.oom_count, self.total_frees, peak_mb, self.resets,
        )
    }
}

/// What the last graph pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GraphPassStats {
    /// Parse steps that named a node.
    pub nodes_visited: usize,
    /// Tensors given fresh regions (nodes and on-demand leafs).
    pub allocated: usize,
    /// Regions returned once their last consumer ran.
    pub freed: usize,
    /// Nodes that took over a dying source's region.
    pub inplace_reused: usize,
    /// View tensors placed inside their root.
    pub views: usize,
    /// Tensors that already had a placement and were left alone.
    pub skipped_placed: usize,
    /// Barriers at which liveness was updated.
    pub barriers: usize,
}

impl GraphPassStats {
    pub fn summary(&self) -> String {
        format!(
            "{} nodes: {} allocated, {} freed, {} in-place, {} views, {} pre-placed, {} barriers",
            self.nodes_visited,
            self.allocated,
            self.freed,
            self.inplace_reused,
            self.views,
            self.skipped_placed,
            self.barriers,
        )
    }
}
