// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Computation graph: tensors connected by the ops that produce them.
//!
//! # Type-State Pattern
//!
//! ```text
//! ComputeGraph<Building>   tensors and ops being added.
//!       │  .validate()
//!       ▼
//! ComputeGraph<Validated>  structure frozen, placements may be assigned.
//! ```
//!
//! Allocators only accept a validated graph, so they never see a graph
//! whose structure can still change underneath them. Placements are the
//! one thing that stays mutable after validation.
//!
//! Nodes are stored in insertion order. Because every op may only read
//! tensors that already exist, insertion order is a topological order.

use crate::tensor::{ViewSource, MAX_SRC};
use crate::{DType, GraphError, Op, Shape, Tensor, TensorData, TensorId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph is under construction.
#[derive(Debug, Clone)]
pub struct Building;

/// Marker: graph structure is frozen.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Building {}
impl GraphState for Validated {}

// ── ComputeGraph ───────────────────────────────────────────────────

/// A DAG of tensors.
///
/// *Nodes* are tensors produced by an op (views included); *leafs* are
/// tensors with no producing op (weights, inputs, constants).
#[derive(Debug, Clone)]
pub struct ComputeGraph<S: GraphState = Building> {
    /// Human-readable graph name.
    pub name: String,
    tensors: Vec<Tensor>,
    nodes: Vec<TensorId>,
    leafs: Vec<TensorId>,
    by_name: HashMap<String, TensorId>,
    _state: PhantomData<S>,
}

// ── Building state ─────────────────────────────────────────────────

impl ComputeGraph<Building> {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tensors: Vec::new(),
            nodes: Vec::new(),
            leafs: Vec::new(),
            by_name: HashMap::new(),
            _state: PhantomData,
        }
    }

    /// Adds a leaf tensor (no producing op).
    pub fn new_tensor(
        &mut self,
        name: impl Into<String>,
        dtype: DType,
        shape: Shape,
    ) -> Result<TensorId, GraphError> {
        let name = name.into();
        check_shape(&name, dtype, &shape)?;
        Ok(self.push(name, dtype, shape, Op::None, Vec::new(), None))
    }

    /// Adds a node computed by `op` from `src`.
    ///
    /// View ops must go through [`view_op`](Self::view_op) instead, since
    /// they need an offset into their source.
    pub fn op(
        &mut self,
        name: impl Into<String>,
        op: Op,
        src: &[TensorId],
        dtype: DType,
        shape: Shape,
    ) -> Result<TensorId, GraphError> {
        let name = name.into();
        if op == Op::None {
            return Err(GraphError::InvalidGraph(format!(
                "node '{name}' has no op; use new_tensor for leafs"
            )));
        }
        if op.is_view() {
            return Err(GraphError::InvalidView {
                tensor: name,
                detail: format!("'{}' is a view op; use view_op", op.as_str()),
            });
        }
        if src.len() > MAX_SRC {
            return Err(GraphError::TooManySources {
                tensor: name,
                count: src.len(),
                max: MAX_SRC,
            });
        }
        for &s in src {
            self.check_id(s)?;
        }
        check_shape(&name, dtype, &shape)?;
        Ok(self.push(name, dtype, shape, op, src.to_vec(), None))
    }

    /// Adds a view of `src` starting `offset` bytes into it.
    ///
    /// A view of a view is recorded against the root tensor with the
    /// offsets summed. The view must fit inside the root.
    pub fn view_op(
        &mut self,
        name: impl Into<String>,
        op: Op,
        src: TensorId,
        offset: usize,
        dtype: DType,
        shape: Shape,
    ) -> Result<TensorId, GraphError> {
        let name = name.into();
        if !op.is_view() {
            return Err(GraphError::InvalidView {
                tensor: name,
                detail: format!("'{}' does not alias memory", op.as_str()),
            });
        }
        self.check_id(src)?;
        check_shape(&name, dtype, &shape)?;

        let parent = &self.tensors[src.index()];
        let (root, base_offset) = match parent.view {
            Some(v) => (v.src, v.offset),
            None => (src, 0),
        };
        let offset = base_offset + offset;
        let nbytes = shape.size_bytes(dtype);
        let root_bytes = self.tensors[root.index()].nbytes();
        if offset + nbytes > root_bytes {
            return Err(GraphError::InvalidView {
                tensor: name,
                detail: format!(
                    "range {offset}..{} exceeds source '{}' of {root_bytes} bytes",
                    offset + nbytes,
                    self.tensors[root.index()].name,
                ),
            });
        }

        let view = ViewSource { src: root, offset };
        Ok(self.push(name, dtype, shape, op, vec![src], Some(view)))
    }

    /// Byte-range view with the source's dtype.
    pub fn view(
        &mut self,
        name: impl Into<String>,
        src: TensorId,
        offset: usize,
        shape: Shape,
    ) -> Result<TensorId, GraphError> {
        self.check_id(src)?;
        let dtype = self.tensors[src.index()].dtype;
        self.view_op(name, Op::View, src, offset, dtype, shape)
    }

    /// Same bytes, different shape.
    pub fn reshape(
        &mut self,
        name: impl Into<String>,
        src: TensorId,
        shape: Shape,
    ) -> Result<TensorId, GraphError> {
        let name = name.into();
        self.check_id(src)?;
        let parent = &self.tensors[src.index()];
        let dtype = parent.dtype;
        if shape.num_elements() != parent.shape.num_elements() {
            return Err(GraphError::InvalidShape {
                tensor: name,
                detail: format!(
                    "reshape of {} elements into {} ({} elements)",
                    parent.shape.num_elements(),
                    shape,
                    shape.num_elements(),
                ),
            });
        }
        self.view_op(name, Op::Reshape, src, 0, dtype, shape)
    }

    /// Flags a tensor as needed after execution; it is never reclaimed.
    pub fn mark_output(&mut self, id: TensorId) -> Result<(), GraphError> {
        self.check_id(id)?;
        self.tensors[id.index()].output = true;
        Ok(())
    }

    /// Labels the backend expected to produce this tensor.
    pub fn set_backend(
        &mut self,
        id: TensorId,
        backend: impl Into<String>,
    ) -> Result<(), GraphError> {
        self.check_id(id)?;
        self.tensors[id.index()].backend = Some(backend.into());
        Ok(())
    }

    /// Places a tensor in caller-managed memory before allocation.
    ///
    /// Allocators treat such tensors as already placed and never reclaim
    /// them. Views cannot be preallocated; they follow their source.
    pub fn preallocate(&mut self, id: TensorId, data: TensorData) -> Result<(), GraphError> {
        self.check_id(id)?;
        let tensor = &mut self.tensors[id.index()];
        if tensor.is_view() {
            return Err(GraphError::InvalidView {
                tensor: tensor.name.clone(),
                detail: "views take their placement from their source".into(),
            });
        }
        tensor.data = Some(TensorData {
            planned: false,
            ..data
        });
        Ok(())
    }

    /// Freezes the graph structure.
    ///
    /// # Checks
    /// - The graph has at least one op node.
    /// - Every view's root is a tensor of this graph and not itself a view.
    pub fn validate(self) -> Result<ComputeGraph<Validated>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::InvalidGraph(format!(
                "graph '{}' contains no op nodes",
                self.name
            )));
        }

        for tensor in &self.tensors {
            if let Some(view) = tensor.view {
                let root = self.tensors.get(view.src.index()).ok_or_else(|| {
                    GraphError::UnknownTensor {
                        name: view.src.to_string(),
                    }
                })?;
                if root.is_view() {
                    return Err(GraphError::InvalidView {
                        tensor: tensor.name.clone(),
                        detail: format!("root '{}' is itself a view", root.name),
                    });
                }
            }
        }

        tracing::debug!(
            "graph '{}' validated: {} nodes, {} leafs",
            self.name,
            self.nodes.len(),
            self.leafs.len(),
        );

        Ok(ComputeGraph {
            name: self.name,
            tensors: self.tensors,
            nodes: self.nodes,
            leafs: self.leafs,
            by_name: self.by_name,
            _state: PhantomData,
        })
    }

    fn push(
        &mut self,
        name: String,
        dtype: DType,
        shape: Shape,
        op: Op,
        src: Vec<TensorId>,
        view: Option<ViewSource>,
    ) -> TensorId {
        let id = TensorId(self.tensors.len() as u32);
        if op == Op::None {
            self.leafs.push(id);
        } else {
            self.nodes.push(id);
        }
        self.by_name.entry(name.clone()).or_insert(id);
        self.tensors.push(Tensor {
            id,
            name,
            dtype,
            shape,
            op,
            src,
            view,
            data: None,
            output: false,
            backend: None,
        });
        id
    }
}

fn check_shape(name: &str, dtype: DType, shape: &Shape) -> Result<(), GraphError> {
    let ne0 = shape.ne()[0];
    if ne0 % dtype.block_len() != 0 {
        return Err(GraphError::InvalidShape {
            tensor: name.to_string(),
            detail: format!(
                "row length {ne0} is not a multiple of the {} block size {}",
                dtype.as_str(),
                dtype.block_len(),
            ),
        });
    }
    Ok(())
}

// ── Validated state ────────────────────────────────────────────────

impl ComputeGraph<Validated> {
    /// Op nodes in stored (topological) order.
    pub fn nodes(&self) -> &[TensorId] {
        &self.nodes
    }

    /// Tensors without a producing op.
    pub fn leafs(&self) -> &[TensorId] {
        &self.leafs
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leafs(&self) -> usize {
        self.leafs.len()
    }

    /// The node at position `index` of the stored order.
    pub fn node(&self, index: usize) -> Option<TensorId> {
        self.nodes.get(index).copied()
    }

    /// Assigns or clears a tensor's placement.
    pub fn set_data(&mut self, id: TensorId, data: Option<TensorData>) {
        self.tensors[id.index()].data = data;
    }

    /// Drops every placement made by an allocator, keeping caller
    /// placements. Returns the number of tensors cleared.
    ///
    /// Needed before re-running allocation on the same graph, since
    /// already-placed tensors are skipped.
    pub fn clear_planned(&mut self) -> usize {
        let mut cleared = 0;
        for tensor in &mut self.tensors {
            if matches!(tensor.data, Some(d) if d.planned) {
                tensor.data = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Number of nodes that read `id`.
    pub fn consumers(&self, id: TensorId) -> usize {
        self.nodes
            .iter()
            .map(|&n| {
                self.tensors[n.index()]
                    .src
                    .iter()
                    .filter(|&&s| s == id)
                    .count()
            })
            .sum()
    }

    /// Sum of the sizes of all non-view tensors: the footprint with no
    /// memory reuse at all.
    pub fn total_tensor_bytes(&self) -> usize {
        self.tensors
            .iter()
            .filter(|t| !t.is_view())
            .map(|t| t.nbytes())
            .sum()
    }

    /// Returns a one-line summary of the graph.
    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} nodes, {} leafs, {:.2} MB without reuse",
            self.name,
            self.n_nodes(),
            self.n_leafs(),
            self.total_tensor_bytes() as f64 / (1024.0 * 1024.0),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> ComputeGraph<S> {
    /// Returns the tensor with the given id.
    ///
    /// # Panics
    /// Panics if `id` was issued by a different graph.
    pub fn tensor(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.index()]
    }

    /// Returns the tensor with the given id, if it belongs to this graph.
    pub fn get(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id.index())
    }

    /// Looks up a tensor by name (first definition wins).
    pub fn find(&self, name: &str) -> Option<TensorId> {
        self.by_name.get(name).copied()
    }

    /// Iterates over every tensor in definition order.
    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter()
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    fn check_id(&self, id: TensorId) -> Result<(), GraphError> {
        if id.index() < self.tensors.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownTensor {
                name: id.to_string(),
            })
        }
    }
}

impl<S: GraphState> fmt::Display for ComputeGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ComputeGraph '{}' ({} nodes, {} leafs):",
            self.name,
            self.nodes.len(),
            self.leafs.len()
        )?;
        for tensor in &self.tensors {
            writeln!(f, "  {}", tensor.summary())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: `x -> add(x, w) -> gelu`.
    fn small_graph() -> ComputeGraph<Building> {
        let mut g = ComputeGraph::new("small");
        let x = g.new_tensor("x", DType::F32, Shape::matrix(16, 4)).unwrap();
        let w = g.new_tensor("w", DType::F32, Shape::matrix(16, 4)).unwrap();
        let a = g
            .op("a", Op::Add, &[x, w], DType::F32, Shape::matrix(16, 4))
            .unwrap();
        g.op("g", Op::Gelu, &[a], DType::F32, Shape::matrix(16, 4))
            .unwrap();
        g
    }

    #[test]
    fn test_nodes_and_leafs() {
        let g = small_graph().validate().unwrap();
        assert_eq!(g.n_nodes(), 2);
        assert_eq!(g.n_leafs(), 2);
        assert_eq!(g.tensor(g.nodes()[0]).name(), "a");
    }

    #[test]
    fn test_validate_empty() {
        let g = ComputeGraph::new("empty");
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_unknown_source() {
        let mut g = ComputeGraph::new("bad");
        let err = g
            .op("a", Op::Add, &[TensorId(7)], DType::F32, Shape::vector(4))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownTensor { .. }));
    }

    #[test]
    fn test_too_many_sources() {
        let mut g = ComputeGraph::new("wide");
        let x = g.new_tensor("x", DType::F32, Shape::vector(4)).unwrap();
        let src = vec![x; MAX_SRC + 1];
        let err = g
            .op("c", Op::Concat, &src, DType::F32, Shape::vector(4))
            .unwrap_err();
        assert!(matches!(err, GraphError::TooManySources { .. }));
    }

    #[test]
    fn test_view_of_view_collapses_to_root() {
        let mut g = ComputeGraph::new("views");
        let x = g.new_tensor("x", DType::F32, Shape::vector(64)).unwrap();
        let v1 = g.view("v1", x, 16, Shape::vector(32)).unwrap();
        let v2 = g.view("v2", v1, 8, Shape::vector(8)).unwrap();
        let view = g.tensor(v2).view().unwrap();
        assert_eq!(view.src, x);
        assert_eq!(view.offset, 24);
        assert_eq!(g.tensor(v2).src(), &[v1]);
    }

    #[test]
    fn test_view_out_of_bounds() {
        let mut g = ComputeGraph::new("views");
        let x = g.new_tensor("x", DType::F32, Shape::vector(16)).unwrap();
        let err = g.view("v", x, 40, Shape::vector(8)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidView { .. }));
    }

    #[test]
    fn test_reshape_element_count() {
        let mut g = ComputeGraph::new("reshape");
        let x = g.new_tensor("x", DType::F32, Shape::matrix(8, 4)).unwrap();
        assert!(g.reshape("r", x, Shape::vector(32)).is_ok());
        assert!(g.reshape("bad", x, Shape::vector(31)).is_err());
    }

    #[test]
    fn test_op_rejects_view_kind() {
        let mut g = ComputeGraph::new("g");
        let x = g.new_tensor("x", DType::F32, Shape::vector(4)).unwrap();
        assert!(g
            .op("v", Op::View, &[x], DType::F32, Shape::vector(4))
            .is_err());
    }

    #[test]
    fn test_quantized_row_alignment() {
        let mut g = ComputeGraph::new("q");
        assert!(g.new_tensor("ok", DType::Q4_0, Shape::matrix(64, 2)).is_ok());
        assert!(g.new_tensor("bad", DType::Q4_0, Shape::matrix(40, 2)).is_err());
    }

    #[test]
    fn test_preallocate_and_clear_planned() {
        let mut g = small_graph();
        let x = g.find("x").unwrap();
        let buf = crate::BufferId::next();
        g.preallocate(x, TensorData::planned(buf, 0)).unwrap();
        // The caller placement is always recorded as external.
        assert!(!g.tensor(x).data().unwrap().planned);

        let mut g = g.validate().unwrap();
        let a = g.find("a").unwrap();
        g.set_data(a, Some(TensorData::planned(buf, 256)));
        assert_eq!(g.clear_planned(), 1);
        assert!(g.tensor(a).data().is_none());
        assert!(g.tensor(x).data().is_some());
    }

    #[test]
    fn test_consumers() {
        let g = small_graph().validate().unwrap();
        assert_eq!(g.consumers(g.find("x").unwrap()), 1);
        assert_eq!(g.consumers(g.find("a").unwrap()), 1);
        assert_eq!(g.consumers(g.find("g").unwrap()), 0);
    }

    #[test]
    fn test_summary_and_display() {
        let g = small_graph().validate().unwrap();
        assert!(g.summary().contains("2 nodes"));
        let display = format!("{g}");
        assert!(display.contains("gelu"));
        assert!(display.contains("'x'"));
    }
}
