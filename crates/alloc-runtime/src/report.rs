// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Plan reports.
//!
//! A [`PlanReport`] summarises a finished two-pass plan: how much memory
//! each backend needed, what the real buffers look like, and where every
//! tensor landed. Reports serialise to JSON for the CLI and for diffing
//! plans between graph revisions.

use crate::{RuntimeError, Schedule};
use backend::BackendRef;
use compute_graph::{ComputeGraph, Validated};
use tensor_alloc::{AllocationStats, GraphPassStats, TensorAllocator};

/// Per-backend figures.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendReport {
    pub name: String,
    /// Size reported by the measure pass.
    pub measured_bytes: usize,
    /// High-water mark of the real pass.
    pub used_bytes: usize,
    /// Base address of the real buffer.
    pub buffer_base: usize,
    /// Tensors (views excluded) assigned to this backend.
    pub tensors: usize,
    /// Bytes those tensors would take without reuse.
    pub unshared_bytes: usize,
    pub stats: AllocationStats,
}

/// Where one tensor lives.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TensorPlacement {
    pub name: String,
    pub op: String,
    pub dtype: String,
    pub backend: String,
    /// Offset from the backend buffer's base; `None` if unplaced.
    pub offset: Option<usize>,
    pub size: usize,
    /// Root tensor for views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_of: Option<String>,
    pub output: bool,
    /// Placed by the caller rather than the planner.
    pub preallocated: bool,
}

/// Summary of a finished plan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanReport {
    pub graph: String,
    pub schedule: String,
    /// Footprint with no memory reuse at all.
    pub total_tensor_bytes: usize,
    pub backends: Vec<BackendReport>,
    /// Statistics of the real pass.
    pub pass: GraphPassStats,
    /// Empty when placement reporting is disabled.
    pub placements: Vec<TensorPlacement>,
}

impl PlanReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        graph: &ComputeGraph<Validated>,
        schedule: Schedule,
        backends: &[(String, BackendRef)],
        backend_of: &[usize],
        measured: &[usize],
        allocators: &[TensorAllocator],
        pass: &GraphPassStats,
        with_placements: bool,
    ) -> Self {
        let mut reports: Vec<BackendReport> = backends
            .iter()
            .zip(measured)
            .zip(allocators)
            .map(|(((name, _), &measured_bytes), alloc)| BackendReport {
                name: name.clone(),
                measured_bytes,
                used_bytes: alloc.max_size(),
                buffer_base: alloc.base(),
                tensors: 0,
                unshared_bytes: 0,
                stats: alloc.stats().clone(),
            })
            .collect();

        for t in graph.tensors().filter(|t| !t.is_view()) {
            if let Some(r) = backend_of.get(t.id().index()).and_then(|&i| reports.get_mut(i)) {
                r.tensors += 1;
                r.unshared_bytes += t.nbytes();
            }
        }

        let placements = if with_placements {
            graph
                .tensors()
                .map(|t| TensorPlacement {
                    name: t.name().to_string(),
                    op: t.op().as_str().to_string(),
                    dtype: t.dtype().as_str().to_string(),
                    backend: backend_of
                        .get(t.id().index())
                        .and_then(|&i| backends.get(i))
                        .map(|(n, _)| n.clone())
                        .unwrap_or_default(),
                    offset: t.data().map(|d| d.offset),
                    size: t.nbytes(),
                    view_of: t.view_src().map(|r| graph.tensor(r).name().to_string()),
                    output: t.is_output(),
                    preallocated: t.data().is_some_and(|d| !d.planned),
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            graph: graph.name.clone(),
            schedule: schedule.name().to_string(),
            total_tensor_bytes: graph.total_tensor_bytes(),
            backends: reports,
            pass: pass.clone(),
            placements,
        }
    }

    /// Sum of the measured sizes of every backend.
    pub fn total_measured_bytes(&self) -> usize {
        self.backends.iter().map(|b| b.measured_bytes).sum()
    }

    /// Fraction of the no-reuse footprint saved by the plan.
    pub fn savings_ratio(&self) -> f64 {
        if self.total_tensor_bytes == 0 {
            return 0.0;
        }
        1.0 - self.total_measured_bytes() as f64 / self.total_tensor_bytes as f64
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let backends = self
            .backends
            .iter()
            .map(|b| format!("{} {:.2} MB", b.name, b.measured_bytes as f64 / (1024.0 * 1024.0)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Plan '{}' ({}): {} | {:.2} MB without reuse, {:.0}% saved | {}",
            self.graph,
            self.schedule,
            backends,
            self.total_tensor_bytes as f64 / (1024.0 * 1024.0),
            self.savings_ratio() * 100.0,
            self.pass.summary(),
        )
    }
}
