// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-alloc
//!
//! Ahead-of-time memory planning for computation graphs.
//!
//! # Key Components
//!
//! - [`TensorAllocator`]: a best-fit offset allocator over one buffer,
//!   with a measure mode that computes the buffer size a graph needs.
//! - [`GraphAllocator`]: walks a graph with reference-counted liveness,
//!   freeing each intermediate after its last consumer and reusing dying
//!   regions in place. Supports parse sequences with barriers and
//!   dispatch across several allocators.
//! - [`Allocator`]: one graph allocator bound to one tensor allocator.
//! - [`AllocationStats`] / [`GraphPassStats`]: allocator metrics.
//!
//! # Two-pass planning
//!
//! ```text
//!   measure pass                         real pass
//!   TensorAllocator::new_measure ──►  max_size ──►  TensorAllocator::from_backend(size)
//!        │                                               │
//!   GraphAllocator::alloc_graph                  GraphAllocator::alloc_graph
//!        │                                               │
//!   graph.clear_planned()  ─────────────────────────────►│
//!                                                   identical offsets
//! ```
//!
//! # Example
//! ```
//! use compute_graph::{ComputeGraph, DType, Op, Shape};
//! use tensor_alloc::{GraphAllocator, TensorAllocator};
//!
//! let mut g = ComputeGraph::new("chain");
//! let x = g.new_tensor("x", DType::F32, Shape::vector(256)).unwrap();
//! let h = g.op("h", Op::Dup, &[x], DType::F32, Shape::vector(256)).unwrap();
//! let y = g.op("y", Op::Dup, &[h], DType::F32, Shape::vector(256)).unwrap();
//! g.mark_output(y).unwrap();
//! let mut g = g.validate().unwrap();
//!
//! let mut gallocr = GraphAllocator::new();
//! let mut measure = TensorAllocator::new_measure(32).unwrap();
//! let needed = gallocr.alloc_graph(&mut g, &mut measure).unwrap();
//! // x is dead once h exists, so y reuses its bytes.
//! assert_eq!(needed, 2 * 1024);
//!
//! g.clear_planned();
//! let mut real = TensorAllocator::new(0, needed, 32).unwrap();
//! assert_eq!(gallocr.alloc_graph(&mut g, &mut real).unwrap(), needed);
//! ```

mod error;
pub mod graph_allocator;
mod legacy;
mod stats;
pub mod tensor_allocator;

pub use error::AllocError;
pub use graph_allocator::{BackendAssignment, GraphAllocator, ParseStep, PARSE_SEQ_BARRIER};
pub use legacy::Allocator;
pub use stats::{AllocationStats, GraphPassStats};
pub use tensor_allocator::{FreeBlock, TensorAllocator, MEASURE_SIZE};
