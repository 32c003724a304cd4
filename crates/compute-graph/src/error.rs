// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and manifest loading.

/// Errors that can occur while building or loading a computation graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph manifest file could not be read.
    #[error("failed to read graph manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse graph manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A tensor id or name does not refer to a tensor of this graph.
    #[error("unknown tensor: {name}")]
    UnknownTensor { name: String },

    /// Two tensors in a manifest share a name.
    #[error("duplicate tensor name: {name}")]
    DuplicateTensor { name: String },

    /// An op was given more sources than a node can hold.
    #[error("tensor '{tensor}' has {count} sources (max {max})")]
    TooManySources {
        tensor: String,
        count: usize,
        max: usize,
    },

    /// A view does not fit inside its source, or was built from an op that
    /// cannot alias memory.
    #[error("invalid view '{tensor}': {detail}")]
    InvalidView { tensor: String, detail: String },

    /// A shape is incompatible with its dtype or its operation.
    #[error("invalid shape for '{tensor}': {detail}")]
    InvalidShape { tensor: String, detail: String },

    /// An op name in a manifest was not recognised.
    #[error("unknown op '{0}'")]
    UnknownOp(String),

    /// A dtype name in a manifest was not recognised.
    #[error("unknown dtype '{0}'")]
    UnknownDType(String),

    /// The graph is structurally unusable (e.g., it has no op nodes).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A tensor hash set ran out of free slots.
    #[error("tensor hash set is full ({size} slots)")]
    HashSetFull { size: usize },
}
