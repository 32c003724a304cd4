// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for planning sessions.

/// Errors that can occur while configuring or running a planning session.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A tensor names a backend that is not configured.
    #[error("tensor '{tensor}' is assigned to unknown backend '{backend}'")]
    UnknownBackend { tensor: String, backend: String },

    /// The real pass disagreed with the measure pass.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Allocation failed in the measure or real pass.
    #[error("allocation error: {0}")]
    AllocError(#[from] tensor_alloc::AllocError),

    /// A backend could not be created or could not provide a buffer.
    #[error("backend error: {0}")]
    BackendError(#[from] backend::BackendError),

    /// The graph could not be loaded.
    #[error("graph error: {0}")]
    GraphError(#[from] compute_graph::GraphError),

    /// A report could not be serialised.
    #[error("report serialisation error: {0}")]
    ReportError(#[from] serde_json::Error),
}
