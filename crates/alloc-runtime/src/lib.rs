// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # alloc-runtime
//!
//! Runs the two-pass memory planning workflow over a validated graph.
//!
//! The runtime takes:
//! - A validated `ComputeGraph` from `compute-graph`.
//! - A [`RuntimeConfig`] naming the backends and the node schedule.
//!
//! It measures the memory each backend needs, allocates exactly that much
//! from every backend, and places the graph into those buffers with the
//! same offsets the measure pass computed.
//!
//! # Type-State Pipeline
//! ```text
//! PlanningSession<Idle> → PlanningSession<Measured> → PlanningSession<Allocated>
//! ```
//! Transitions are compile-time checked.
//!
//! # Schedules
//! - `stored`: the graph's own node order, freeing after every node.
//! - `backend-grouped`: nodes batched by backend with
//!   [`backend_grouped_order`], freeing at batch boundaries.

mod config;
mod error;
mod report;
pub mod schedule;
mod session;

pub use config::{BackendConfig, BackendKind, RuntimeConfig, Schedule};
pub use error::RuntimeError;
pub use report::{BackendReport, PlanReport, TensorPlacement};
pub use schedule::backend_grouped_order;
pub use session::{Allocated, Idle, Measured, PlanningSession, SessionState};
