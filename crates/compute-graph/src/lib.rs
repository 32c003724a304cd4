// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # compute-graph
//!
//! The tensor and graph model consumed by the graph allocator.
//!
//! This crate carries no element data and runs no kernels. It describes
//! exactly what memory planning needs:
//!
//! - [`Tensor`]: size (from [`DType`] and [`Shape`]), producing [`Op`],
//!   sources, view relation, and placement ([`TensorData`]).
//! - [`ComputeGraph`]: nodes and leafs in topological order, with a
//!   **type-state pattern** (`Building` → `Validated`).
//! - [`TensorHashSet`]: an open-addressed set of tensor ids used to key
//!   per-tensor state in graph passes.
//! - [`GraphManifest`]: JSON graph descriptions.
//!
//! # Example
//! ```
//! use compute_graph::{ComputeGraph, DType, Op, Shape};
//!
//! let mut g = ComputeGraph::new("tiny");
//! let x = g.new_tensor("x", DType::F32, Shape::vector(256)).unwrap();
//! let y = g.op("y", Op::Relu, &[x], DType::F32, Shape::vector(256)).unwrap();
//! g.mark_output(y).unwrap();
//! let g = g.validate().unwrap();
//! assert_eq!(g.n_nodes(), 1);
//! ```

mod dtype;
mod error;
pub mod graph;
mod hash;
mod manifest;
mod op;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::GraphError;
pub use graph::{Building, ComputeGraph, GraphState, Validated};
pub use hash::{hash_size, TensorHashSet};
pub use manifest::{GraphManifest, ManifestTensor};
pub use op::Op;
pub use shape::{Shape, MAX_DIMS};
pub use tensor::{BufferId, Tensor, TensorData, TensorId, ViewSource, MAX_SRC};
