// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Liveness-driven placement of a whole graph.
//!
//! A [`GraphAllocator`] walks the nodes of a validated graph and places
//! every tensor they touch through one or more [`TensorAllocator`]s,
//! returning each region as soon as nothing can read it any more.
//!
//! # Passes
//!
//! ```text
//! counting pass    for each node: +1 child on every source,
//!                                 +1 view on the root of a view
//!       │
//!       ▼
//! visiting pass    for each step of the parse sequence:
//!                    Node(i)  → place sources on demand, place node i
//!                    Barrier  → for every node since the last barrier,
//!                               -1 child on each source; free sources
//!                               that reach 0 children and 0 views
//! ```
//!
//! Without a parse sequence, or with one that contains no barrier, each
//! node is followed by an implicit barrier.
//!
//! # Liveness records
//!
//! Per-tensor state lives in slot-indexed arrays keyed through a
//! [`TensorHashSet`]. A tensor that takes over a source's region in place
//! is recorded as an *alias* of that region and counts as one of its
//! views, so the region survives until the alias itself dies.

use crate::{AllocError, GraphPassStats, TensorAllocator};
use compute_graph::{ComputeGraph, TensorData, TensorHashSet, TensorId, Validated};

/// One step of a parse sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParseStep {
    /// Visit the node at this index of the graph's node list.
    Node(usize),
    /// Apply liveness updates for every node visited since the last
    /// barrier.
    Barrier,
}

impl ParseStep {
    /// Encodes the step the way raw sequences do: `-1` for a barrier.
    ///
    /// Returns `None` for node indices beyond `i32::MAX`.
    pub fn to_raw(self) -> Option<i32> {
        match self {
            ParseStep::Node(i) => i32::try_from(i).ok(),
            ParseStep::Barrier => Some(-1),
        }
    }
}

/// Raw barrier marker.
pub const PARSE_SEQ_BARRIER: i32 = -1;

/// Liveness state of one tensor during a pass.
#[derive(Debug, Clone, Copy, Default)]
struct UsageRecord {
    /// Consumers not yet retired.
    n_children: u32,
    /// Live views (and in-place aliases) of this tensor's region.
    n_views: u32,
    /// The region this tensor reuses in place, if any.
    alias: Option<TensorId>,
    /// Whether this pass gave the tensor its region.
    allocated: bool,
}

/// Maps tensors to allocators for [`GraphAllocator::alloc_graph_n`].
///
/// Pairs a [`TensorHashSet`] with a parallel slot → allocator-index
/// array.
#[derive(Debug, Clone)]
pub struct BackendAssignment {
    set: TensorHashSet,
    allocator_of: Vec<Option<usize>>,
}

impl BackendAssignment {
    /// An empty assignment over `set`; tensors already in the set start
    /// unassigned.
    pub fn new(set: TensorHashSet) -> Self {
        let allocator_of = vec![None; set.size()];
        Self { set, allocator_of }
    }

    /// Assigns every node and leaf of `graph` with `choose`.
    pub fn for_graph<F>(graph: &ComputeGraph<Validated>, mut choose: F) -> Result<Self, AllocError>
    where
        F: FnMut(TensorId) -> Option<usize>,
    {
        let mut assignment = Self::new(TensorHashSet::for_graph(graph)?);
        for &id in graph.nodes().iter().chain(graph.leafs()) {
            if let Some(index) = choose(id) {
                assignment.assign(id, index)?;
            }
        }
        Ok(assignment)
    }

    /// Maps `id` to allocator `index`, inserting it into the set if needed.
    pub fn assign(&mut self, id: TensorId, index: usize) -> Result<(), AllocError> {
        let slot = self.set.insert(id)?;
        self.allocator_of[slot] = Some(index);
        Ok(())
    }

    pub fn allocator_of(&self, id: TensorId) -> Option<usize> {
        self.set.find(id).and_then(|slot| self.allocator_of[slot])
    }
}

/// Plans memory for whole graphs.
#[derive(Debug, Default)]
pub struct GraphAllocator {
    parse_seq: Option<Vec<ParseStep>>,
    stats: GraphPassStats,
}

impl GraphAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visits nodes in `steps` order instead of stored order.
    pub fn set_parse_seq(&mut self, steps: Vec<ParseStep>) {
        self.parse_seq = Some(steps);
    }

    /// Like [`set_parse_seq`](Self::set_parse_seq), with `-1` as barrier.
    pub fn set_parse_seq_raw(&mut self, raw: &[i32]) -> Result<(), AllocError> {
        let steps = raw
            .iter()
            .enumerate()
            .map(|(position, &value)| match value {
                PARSE_SEQ_BARRIER => Ok(ParseStep::Barrier),
                v => usize::try_from(v)
                    .map(ParseStep::Node)
                    .map_err(|_| AllocError::InvalidParseSeq {
                        position,
                        value: v.into(),
                        n_nodes: 0,
                    }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.set_parse_seq(steps);
        Ok(())
    }

    /// Reverts to stored node order.
    pub fn clear_parse_seq(&mut self) {
        self.parse_seq = None;
    }

    pub fn parse_seq(&self) -> Option<&[ParseStep]> {
        self.parse_seq.as_deref()
    }

    /// Statistics of the last pass.
    pub fn stats(&self) -> &GraphPassStats {
        &self.stats
    }

    /// Places every node of `graph` (and the leafs they read) through
    /// `alloc`. Returns the allocator's high-water mark.
    pub fn alloc_graph(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        alloc: &mut TensorAllocator,
    ) -> Result<usize, AllocError> {
        let set = TensorHashSet::for_graph(graph)?;
        let allocator_of = vec![Some(0); set.size()];
        self.run(graph, std::slice::from_mut(alloc), set, allocator_of)?;
        Ok(alloc.max_size())
    }

    /// Places `graph` across several allocators, dispatching each tensor
    /// to the allocator `assignment` maps it to. Returns every
    /// allocator's high-water mark.
    pub fn alloc_graph_n(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        assignment: &BackendAssignment,
        allocators: &mut [TensorAllocator],
    ) -> Result<Vec<usize>, AllocError> {
        let required = graph.n_nodes() + graph.n_leafs();
        if assignment.set.size() < required {
            return Err(AllocError::HashSetTooSmall {
                capacity: assignment.set.size(),
                required,
            });
        }
        self.run(
            graph,
            allocators,
            assignment.set.clone(),
            assignment.allocator_of.clone(),
        )?;
        Ok(allocators.iter().map(TensorAllocator::max_size).collect())
    }

    fn run(
        &mut self,
        graph: &mut ComputeGraph<Validated>,
        allocators: &mut [TensorAllocator],
        set: TensorHashSet,
        allocator_of: Vec<Option<usize>>,
    ) -> Result<(), AllocError> {
        let steps = self.steps(graph.n_nodes())?;
        let usage = vec![UsageRecord::default(); set.size()];
        let mut pass = GraphPass {
            graph,
            allocators,
            set,
            allocator_of,
            usage,
            stats: GraphPassStats::default(),
        };

        pass.count()?;
        let result = pass.visit(&steps);
        self.stats = pass.stats;
        result?;

        tracing::info!(
            "graph '{}' allocated: {}",
            pass.graph.name,
            self.stats.summary()
        );
        Ok(())
    }

    /// The effective, validated step list.
    fn steps(&self, n_nodes: usize) -> Result<Vec<ParseStep>, AllocError> {
        let seq = match self.parse_seq.as_deref() {
            Some([]) => {
                tracing::warn!("empty parse sequence, using stored node order");
                None
            }
            other => other,
        };

        let Some(seq) = seq else {
            return Ok((0..n_nodes)
                .flat_map(|i| [ParseStep::Node(i), ParseStep::Barrier])
                .collect());
        };

        // Each node runs at most once: a repeat would retire its sources twice.
        let mut seen = vec![false; n_nodes];
        for (position, step) in seq.iter().enumerate() {
            if let ParseStep::Node(i) = *step {
                if i >= n_nodes || std::mem::replace(&mut seen[i], true) {
                    return Err(AllocError::InvalidParseSeq {
                        position,
                        value: i64::try_from(i).unwrap_or(i64::MAX),
                        n_nodes,
                    });
                }
            }
        }

        if seq.contains(&ParseStep::Barrier) {
            Ok(seq.to_vec())
        } else {
            Ok(seq
                .iter()
                .flat_map(|&step| [step, ParseStep::Barrier])
                .collect())
        }
    }
}

/// State of one allocation pass.
struct GraphPass<'a> {
    graph: &'a mut ComputeGraph<Validated>,
    allocators: &'a mut [TensorAllocator],
    set: TensorHashSet,
    allocator_of: Vec<Option<usize>>,
    usage: Vec<UsageRecord>,
    stats: GraphPassStats,
}

impl GraphPass<'_> {
    // ── Bookkeeping ─────────────────────────────────────────────────

    fn slot(&mut self, id: TensorId) -> Result<usize, AllocError> {
        match self.set.find(id) {
            Some(slot) => Ok(slot),
            None => Ok(self.set.insert(id)?),
        }
    }

    fn usage(&mut self, id: TensorId) -> Result<&mut UsageRecord, AllocError> {
        let slot = self.slot(id)?;
        Ok(&mut self.usage[slot])
    }

    fn name(&self, id: TensorId) -> String {
        self.graph.tensor(id).name().to_string()
    }

    /// Allocator index responsible for `id`.
    fn allocator_for(&mut self, id: TensorId) -> Result<Option<usize>, AllocError> {
        let slot = self.slot(id)?;
        match self.allocator_of[slot] {
            Some(index) if index >= self.allocators.len() => Err(AllocError::InvalidAssignment {
                tensor: self.name(id),
                index,
                count: self.allocators.len(),
            }),
            other => Ok(other),
        }
    }

    fn require_allocator(&mut self, id: TensorId) -> Result<usize, AllocError> {
        self.allocator_for(id)?
            .ok_or_else(|| AllocError::UnassignedTensor {
                tensor: self.name(id),
            })
    }

    /// The region root of `id`: its view source or in-place alias.
    fn region_root(&mut self, id: TensorId) -> Result<Option<TensorId>, AllocError> {
        if let Some(root) = self.graph.tensor(id).view_src() {
            return Ok(Some(root));
        }
        Ok(self.usage(id)?.alias)
    }

    // ── Counting pass ───────────────────────────────────────────────

    fn count(&mut self) -> Result<(), AllocError> {
        for i in 0..self.graph.n_nodes() {
            let Some(node) = self.graph.node(i) else {
                continue;
            };
            let tensor = self.graph.tensor(node);
            let root = tensor.view_src();
            let src = tensor.src().to_vec();

            if let Some(root) = root {
                self.usage(root)?.n_views += 1;
            }
            for s in src {
                self.usage(s)?.n_children += 1;
            }
        }
        Ok(())
    }

    // ── Visiting pass ───────────────────────────────────────────────

    fn visit(&mut self, steps: &[ParseStep]) -> Result<(), AllocError> {
        let mut since_barrier: Vec<TensorId> = Vec::new();
        for step in steps {
            match *step {
                ParseStep::Node(i) => {
                    let Some(node) = self.graph.node(i) else {
                        continue;
                    };
                    self.stats.nodes_visited += 1;
                    for input in self.graph.tensor(node).src().to_vec() {
                        self.ensure_placed(node, input)?;
                    }
                    self.place_node(node)?;
                    since_barrier.push(node);
                }
                ParseStep::Barrier => {
                    self.stats.barriers += 1;
                    for node in since_barrier.drain(..) {
                        self.retire_sources(node)?;
                    }
                }
            }
        }
        for node in since_barrier {
            self.retire_sources(node)?;
        }
        Ok(())
    }

    /// Gives `input` a placement if it can be produced on demand.
    fn ensure_placed(&mut self, node: TensorId, input: TensorId) -> Result<(), AllocError> {
        let tensor = self.graph.tensor(input);
        if tensor.data().is_some() {
            return Ok(());
        }
        if let Some(root) = tensor.view_src() {
            self.ensure_placed(node, root)?;
            return self.place_view(input);
        }
        if tensor.is_leaf() {
            let index = self.require_allocator(input)?;
            return self.allocate(index, input);
        }
        Err(AllocError::UnproducedInput {
            node: self.name(node),
            input: tensor.name().to_string(),
        })
    }

    fn place_node(&mut self, node: TensorId) -> Result<(), AllocError> {
        let tensor = self.graph.tensor(node);
        if tensor.data().is_some() {
            tracing::debug!("'{}' already placed, skipping", tensor.name());
            self.stats.skipped_placed += 1;
            return Ok(());
        }
        if tensor.is_view() {
            return self.place_view(node);
        }

        let index = self.require_allocator(node)?;
        if self.graph.tensor(node).op().can_inplace() && self.try_inplace(node, index)? {
            return Ok(());
        }
        self.allocate(index, node)
    }

    fn allocate(&mut self, index: usize, id: TensorId) -> Result<(), AllocError> {
        self.allocators[index].alloc(self.graph, id)?;
        self.usage(id)?.allocated = true;
        self.stats.allocated += 1;
        Ok(())
    }

    /// A view sits at its root's placement plus the view offset.
    fn place_view(&mut self, id: TensorId) -> Result<(), AllocError> {
        let tensor = self.graph.tensor(id);
        let Some(view) = tensor.view() else {
            return Ok(());
        };
        let Some(root_data) = self.graph.tensor(view.src).data() else {
            return Err(AllocError::UnproducedInput {
                node: tensor.name().to_string(),
                input: self.name(view.src),
            });
        };
        let data = TensorData {
            offset: root_data.offset + view.offset,
            ..root_data
        };
        self.graph.set_data(id, Some(data));
        self.stats.views += 1;
        Ok(())
    }

    /// Lets `node` take over the region of a source that dies with it.
    fn try_inplace(&mut self, node: TensorId, index: usize) -> Result<bool, AllocError> {
        for parent in self.graph.tensor(node).src().to_vec() {
            let Some(parent_data) = self.graph.tensor(parent).data() else {
                continue;
            };
            if !parent_data.planned || !self.allocators[index].owns(&parent_data) {
                continue;
            }
            if self.graph.tensor(parent).is_output() {
                continue;
            }
            let record = *self.usage(parent)?;
            if record.n_children != 1
                || record.n_views != 0
                || !self.graph.tensor(node).same_layout(self.graph.tensor(parent))
            {
                continue;
            }

            let target = match self.region_root(parent)? {
                Some(root) => {
                    let root_record = *self.usage(root)?;
                    let root_data = self.graph.tensor(root).data();
                    if root_record.n_views != 1
                        || root_record.n_children != 0
                        || root_data != Some(parent_data)
                        || self.graph.tensor(root).is_output()
                    {
                        continue;
                    }
                    root
                }
                None => parent,
            };
            if !self.usage(target)?.allocated {
                continue;
            }

            self.usage(target)?.n_views += 1;
            self.usage(node)?.alias = Some(target);
            self.graph.set_data(node, Some(parent_data));
            self.stats.inplace_reused += 1;
            tracing::debug!(
                "'{}' reuses '{}' in place",
                self.graph.tensor(node).name(),
                self.graph.tensor(target).name()
            );
            return Ok(true);
        }
        Ok(false)
    }

    // ── Liveness updates ────────────────────────────────────────────

    /// Retires `node` as a consumer of each of its sources.
    fn retire_sources(&mut self, node: TensorId) -> Result<(), AllocError> {
        for parent in self.graph.tensor(node).src().to_vec() {
            let record = self.usage(parent)?;
            record.n_children = record.n_children.saturating_sub(1);
            if record.n_children > 0 || record.n_views > 0 {
                continue;
            }
            if self.graph.tensor(parent).is_output() {
                continue;
            }

            match self.region_root(parent)? {
                Some(root) => {
                    let root_record = self.usage(root)?;
                    root_record.n_views = root_record.n_views.saturating_sub(1);
                    if root_record.n_views == 0 && root_record.n_children == 0 {
                        self.free_region(root)?;
                    }
                }
                None => self.free_region(parent)?,
            }
        }
        Ok(())
    }

    /// Returns `id`'s region to its allocator, unless the tensor must
    /// outlive the pass or was not placed by this pass.
    fn free_region(&mut self, id: TensorId) -> Result<(), AllocError> {
        if !self.usage(id)?.allocated {
            return Ok(());
        }
        let tensor = self.graph.tensor(id);
        if tensor.is_output() {
            return Ok(());
        }
        let Some(data) = tensor.data().filter(|d| d.planned) else {
            return Ok(());
        };
        let Some(index) = self.allocator_for(id)? else {
            return Ok(());
        };
        let allocator = &mut self.allocators[index];
        if !allocator.owns(&data) {
            return Ok(());
        }
        allocator.release(self.graph.tensor(id), data);
        self.stats.freed += 1;
        Ok(())
    }
}
