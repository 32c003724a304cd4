// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Two-pass planning with a type-state–enforced pipeline.
//!
//! ```text
//! PlanningSession<Idle>
//!     │  .measure()     one measure allocator per backend
//!     ▼
//! PlanningSession<Measured>
//!     │  .allocate()    one real buffer per backend, sized by the measure
//!     ▼
//! PlanningSession<Allocated>
//!     │  .report()
//!     ▼
//!   PlanReport
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error.

use crate::schedule::{backend_grouped_order, count_batches};
use crate::{PlanReport, RuntimeConfig, RuntimeError, Schedule};
use backend::BackendRef;
use compute_graph::{ComputeGraph, GraphManifest, TensorId, Validated};
use std::marker::PhantomData;
use std::path::Path;
use tensor_alloc::{BackendAssignment, GraphAllocator, GraphPassStats, ParseStep, TensorAllocator};

// ── Type-state markers ─────────────────────────────────────────

/// Backends are resolved and tensors assigned; nothing is placed.
#[derive(Debug)]
pub struct Idle;

/// The measure pass ran; per-backend sizes are known.
#[derive(Debug)]
pub struct Measured;

/// Every tensor has a real placement in a backend buffer.
#[derive(Debug)]
pub struct Allocated;

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Idle {}
impl SessionState for Measured {}
impl SessionState for Allocated {}

// ── Session ────────────────────────────────────────────────────

/// Plans the memory of one graph across the configured backends.
///
/// # Example
/// ```
/// use alloc_runtime::{PlanningSession, RuntimeConfig};
/// use compute_graph::{ComputeGraph, DType, Op, Shape};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut g = ComputeGraph::new("demo");
/// let x = g.new_tensor("x", DType::F32, Shape::vector(1024))?;
/// let y = g.op("y", Op::Gelu, &[x], DType::F32, Shape::vector(1024))?;
/// g.mark_output(y)?;
///
/// let session = PlanningSession::new(RuntimeConfig::default(), g.validate()?)?
///     .measure()?;
/// println!("cpu needs {} bytes", session.measured()[0]);
/// let session = session.allocate()?;
/// println!("{}", session.report().summary());
/// # Ok(())
/// # }
/// ```
pub struct PlanningSession<S: SessionState = Idle> {
    config: RuntimeConfig,
    schedule: Schedule,
    graph: ComputeGraph<Validated>,
    backends: Vec<(String, BackendRef)>,
    /// Allocator index of every tensor, by tensor index.
    backend_of: Vec<usize>,
    assignment: BackendAssignment,
    gallocr: GraphAllocator,
    measured: Vec<usize>,
    measure_stats: GraphPassStats,
    allocators: Vec<TensorAllocator>,
    _state: PhantomData<S>,
}

// ── Idle → Measured ────────────────────────────────────────────

impl PlanningSession<Idle> {
    /// Creates a session for `graph`.
    ///
    /// Every tensor is mapped to a backend: its own `backend` label if it
    /// has one, the root's backend for views, the first consuming node's
    /// backend for unlabelled leafs, and `default_backend` otherwise.
    pub fn new(config: RuntimeConfig, graph: ComputeGraph<Validated>) -> Result<Self, RuntimeError> {
        config.validate()?;
        let schedule = config.parse_schedule()?;
        let backends = config.create_backends()?;
        let backend_of = resolve_backends(&graph, &backends, &config.default_backend)?;

        let assignment = BackendAssignment::for_graph(&graph, |id| Some(backend_of[id.index()]))?;
        let mut gallocr = GraphAllocator::new();
        if schedule == Schedule::BackendGrouped {
            let steps = backend_grouped_order(&graph, |id| backend_of[id.index()]);
            tracing::info!(
                "backend-grouped schedule: {} batches",
                count_batches(&steps)
            );
            gallocr.set_parse_seq(steps);
        }

        tracing::info!(
            "session for '{}' over {} backend(s), schedule '{}'",
            graph.name,
            backends.len(),
            schedule.name()
        );

        Ok(Self {
            config,
            schedule,
            graph,
            backends,
            backend_of,
            assignment,
            gallocr,
            measured: Vec::new(),
            measure_stats: GraphPassStats::default(),
            allocators: Vec::new(),
            _state: PhantomData,
        })
    }

    /// Loads a JSON graph manifest and creates a session for it.
    pub fn from_manifest(config: RuntimeConfig, path: &Path) -> Result<Self, RuntimeError> {
        let graph = GraphManifest::from_file(path)?.build()?;
        tracing::info!("{}", graph.summary());
        Self::new(config, graph)
    }

    /// Runs the measure pass. Transitions to the `Measured` state.
    ///
    /// Placements made by the measure pass are cleared afterwards, so the
    /// graph is ready for the real pass.
    pub fn measure(mut self) -> Result<PlanningSession<Measured>, RuntimeError> {
        let mut allocators = self
            .backends
            .iter()
            .map(|(_, b)| TensorAllocator::measure_from_backend(b))
            .collect::<Result<Vec<_>, _>>()?;

        let measured =
            self.gallocr
                .alloc_graph_n(&mut self.graph, &self.assignment, &mut allocators)?;
        let cleared = self.graph.clear_planned();
        tracing::debug!("cleared {cleared} measured placements");

        for ((name, _), size) in self.backends.iter().zip(&measured) {
            tracing::info!("backend '{name}' needs {size} bytes");
        }

        let measure_stats = self.gallocr.stats().clone();
        Ok(self.transition(measured, measure_stats, Vec::new()))
    }
}

// ── Measured → Allocated ───────────────────────────────────────

impl PlanningSession<Measured> {
    /// Bytes each backend needs, in backend order.
    pub fn measured(&self) -> &[usize] {
        &self.measured
    }

    /// Bytes the named backend needs.
    pub fn required(&self, backend: &str) -> Option<usize> {
        self.backend_index(backend).map(|i| self.measured[i])
    }

    /// Sum over all backends.
    pub fn total_required(&self) -> usize {
        self.measured.iter().sum()
    }

    /// Allocates one buffer per backend and runs the real pass.
    /// Transitions to the `Allocated` state.
    pub fn allocate(mut self) -> Result<PlanningSession<Allocated>, RuntimeError> {
        let mut allocators = self
            .backends
            .iter()
            .zip(&self.measured)
            .map(|((_, b), &size)| TensorAllocator::from_backend(b, size))
            .collect::<Result<Vec<_>, _>>()?;

        let peaks = self
            .gallocr
            .alloc_graph_n(&mut self.graph, &self.assignment, &mut allocators)?;

        for (((name, _), &measured), &used) in self.backends.iter().zip(&self.measured).zip(&peaks) {
            if used > measured {
                return Err(RuntimeError::InvalidPlan(format!(
                    "backend '{name}' used {used} bytes but measured {measured}"
                )));
            }
        }
        tracing::info!("graph '{}' placed: {}", self.graph.name, self.gallocr.stats().summary());

        let measured = std::mem::take(&mut self.measured);
        let measure_stats = self.measure_stats.clone();
        Ok(self.transition(measured, measure_stats, allocators))
    }
}

// ── Allocated ──────────────────────────────────────────────────

impl PlanningSession<Allocated> {
    /// The allocators holding the backend buffers, in backend order.
    pub fn allocators(&self) -> &[TensorAllocator] {
        &self.allocators
    }

    /// Absolute address of `id` in its backend's address space.
    pub fn address_of(&self, id: TensorId) -> Option<usize> {
        let data = self.graph.get(id)?.data()?;
        self.allocators
            .iter()
            .find(|a| a.owns(&data))
            .map(|a| a.base() + data.offset)
    }

    /// Builds a report of the plan.
    pub fn report(&self) -> PlanReport {
        PlanReport::build(
            &self.graph,
            self.schedule,
            &self.backends,
            &self.backend_of,
            &self.measured,
            &self.allocators,
            self.gallocr.stats(),
            self.config.report_placements,
        )
    }

    /// Releases the backend buffers and returns the graph with its
    /// placements.
    pub fn into_graph(self) -> ComputeGraph<Validated> {
        self.graph
    }
}

// ── Shared implementations ─────────────────────────────────────

impl<S: SessionState> PlanningSession<S> {
    pub fn graph(&self) -> &ComputeGraph<Validated> {
        &self.graph
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Backend names in allocator order.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|(n, _)| n.as_str())
    }

    pub fn backend_index(&self, name: &str) -> Option<usize> {
        self.backends.iter().position(|(n, _)| n == name)
    }

    /// Name of the backend `id` is assigned to.
    pub fn backend_of(&self, id: TensorId) -> Option<&str> {
        let index = *self.backend_of.get(id.index())?;
        self.backends.get(index).map(|(n, _)| n.as_str())
    }

    /// The parse sequence in use, if the schedule produced one.
    pub fn parse_seq(&self) -> Option<&[ParseStep]> {
        self.gallocr.parse_seq()
    }

    /// Statistics of the measure pass, once it has run.
    pub fn measure_stats(&self) -> &GraphPassStats {
        &self.measure_stats
    }

    fn transition<T: SessionState>(
        self,
        measured: Vec<usize>,
        measure_stats: GraphPassStats,
        allocators: Vec<TensorAllocator>,
    ) -> PlanningSession<T> {
        PlanningSession {
            config: self.config,
            schedule: self.schedule,
            graph: self.graph,
            backends: self.backends,
            backend_of: self.backend_of,
            assignment: self.assignment,
            gallocr: self.gallocr,
            measured,
            measure_stats,
            allocators,
            _state: PhantomData,
        }
    }
}

impl<S: SessionState> std::fmt::Debug for PlanningSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningSession")
            .field("graph", &self.graph.name)
            .field("backends", &self.backends.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("schedule", &self.schedule)
            .field("measured", &self.measured)
            .field("state", &std::any::type_name::<S>())
            .finish()
    }
}

/// Maps every tensor of `graph` to an index into `backends`.
fn resolve_backends(
    graph: &ComputeGraph<Validated>,
    backends: &[(String, BackendRef)],
    default_backend: &str,
) -> Result<Vec<usize>, RuntimeError> {
    let lookup = |tensor: &str, name: &str| {
        backends
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| RuntimeError::UnknownBackend {
                tensor: tensor.to_string(),
                backend: name.to_string(),
            })
    };
    let default = lookup("<default>", default_backend)?;
    let mut backend_of: Vec<Option<usize>> = vec![None; graph.num_tensors()];

    // Op nodes first: labels or the default.
    for &id in graph.nodes() {
        let t = graph.tensor(id);
        if t.is_view() {
            continue;
        }
        backend_of[id.index()] = Some(match t.backend() {
            Some(name) => lookup(t.name(), name)?,
            None => default,
        });
    }

    // Leafs follow their label, then their first non-view consumer.
    for &id in graph.leafs() {
        let t = graph.tensor(id);
        let index = match t.backend() {
            Some(name) => lookup(t.name(), name)?,
            None => graph
                .nodes()
                .iter()
                .filter(|&&n| !graph.tensor(n).is_view())
                .find(|&&n| graph.tensor(n).src().contains(&id))
                .and_then(|&n| backend_of[n.index()])
                .unwrap_or(default),
        };
        backend_of[id.index()] = Some(index);
    }

    // Views share their root's buffer.
    for &id in graph.nodes() {
        let t = graph.tensor(id);
        let Some(root) = t.view_src() else { continue };
        let index = backend_of[root.index()].unwrap_or(default);
        if let Some(label) = t.backend() {
            if lookup(t.name(), label)? != index {
                tracing::warn!(
                    "view '{}' names backend '{label}' but aliases '{}'; using the root's backend",
                    t.name(),
                    graph.tensor(root).name()
                );
            }
        }
        backend_of[id.index()] = Some(index);
    }

    Ok(backend_of.into_iter().map(|b| b.unwrap_or(default)).collect())
}
