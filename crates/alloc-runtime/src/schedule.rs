// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Parse sequences that group nodes by backend.
//!
//! [`backend_grouped_order`] reorders a graph's nodes topologically so
//! that nodes running on the same backend form contiguous batches, and
//! ends every batch with a barrier:
//!
//! ```text
//!   stored:   a(cpu) b(gpu) c(cpu) d(gpu) e(cpu)
//!   grouped:  a c | b d | e |
//! ```
//!
//! Liveness updates happen at the barriers, so every tensor a batch reads
//! stays placed until the whole batch has been visited.

use compute_graph::{ComputeGraph, TensorId, Validated};
use std::collections::{BTreeSet, HashMap};
use tensor_alloc::ParseStep;

/// Builds a backend-grouped parse sequence for `graph`.
///
/// `backend_of` maps a node to its allocator index. Among nodes whose
/// inputs are ready, stored order breaks ties, so a graph that already
/// runs on one backend comes out as a single batch in stored order.
pub fn backend_grouped_order<F>(graph: &ComputeGraph<Validated>, backend_of: F) -> Vec<ParseStep>
where
    F: Fn(TensorId) -> usize,
{
    let nodes = graph.nodes();
    let position: HashMap<TensorId, usize> =
        nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut pending = vec![0usize; nodes.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, &id) in nodes.iter().enumerate() {
        for src in graph.tensor(id).src() {
            if let Some(&p) = position.get(src) {
                pending[i] += 1;
                consumers[p].push(i);
            }
        }
    }
    let backend: Vec<usize> = nodes.iter().map(|&id| backend_of(id)).collect();

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
    let mut steps = Vec::with_capacity(nodes.len() * 2);

    while let Some(&first) = ready.iter().next() {
        let current = backend[first];
        while let Some(i) = ready.iter().copied().find(|&i| backend[i] == current) {
            ready.remove(&i);
            steps.push(ParseStep::Node(i));
            for &c in &consumers[i] {
                pending[c] -= 1;
                if pending[c] == 0 {
                    ready.insert(c);
                }
            }
        }
        steps.push(ParseStep::Barrier);
    }

    tracing::debug!(
        "grouped {} nodes of '{}' into {} batches",
        nodes.len(),
        graph.name,
        count_batches(&steps)
    );
    steps
}

/// Number of barrier-terminated batches in `steps`.
pub fn count_batches(steps: &[ParseStep]) -> usize {
    steps.iter().filter(|s| **s == ParseStep::Barrier).count()
}
