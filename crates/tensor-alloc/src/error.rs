// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor and graph allocation.

use backend::BackendError;
use compute_graph::GraphError;

/// Errors that can occur while placing tensors.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// No free block can hold the tensor. The free list is left unchanged.
    #[error("out of memory allocating '{tensor}': needed {needed} bytes, largest free block {largest_free} (buffer: {buffer_size})")]
    OutOfMemory {
        tensor: String,
        needed: usize,
        largest_free: usize,
        buffer_size: usize,
    },

    /// Alignments must be non-zero powers of two.
    #[error("invalid alignment {0}: must be a power of two")]
    InvalidAlignment(usize),

    /// The tensor already has a placement.
    #[error("tensor '{tensor}' is already allocated")]
    AlreadyAllocated { tensor: String },

    /// Views alias their source and are never allocated directly.
    #[error("tensor '{tensor}' is a view and cannot be allocated")]
    ViewAllocation { tensor: String },

    /// A node reads an op result that no earlier step produced.
    #[error("node '{node}' reads '{input}', which has not been produced yet")]
    UnproducedInput { node: String, input: String },

    /// Multi-backend dispatch found no allocator for a tensor that needs one.
    #[error("tensor '{tensor}' needs allocation but is not assigned to any allocator")]
    UnassignedTensor { tensor: String },

    /// Assignment maps a tensor to an allocator index that does not exist.
    #[error("tensor '{tensor}' is assigned to allocator {index}, but only {count} were supplied")]
    InvalidAssignment {
        tensor: String,
        index: usize,
        count: usize,
    },

    /// A parse sequence entry does not name a node of the graph, or names
    /// one that an earlier entry already ran.
    #[error(
        "parse sequence entry {position} ({value}) is not an unvisited node ({n_nodes} known)"
    )]
    InvalidParseSeq {
        position: usize,
        value: i64,
        n_nodes: usize,
    },

    /// The assignment hash set cannot hold every node and leaf.
    #[error("hash set has {capacity} slots, graph needs at least {required}")]
    HashSetTooSmall { capacity: usize, required: usize },

    /// The tensor is not placed in this allocator's buffer.
    #[error("tensor '{tensor}' is not owned by this allocator")]
    ForeignTensor { tensor: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
