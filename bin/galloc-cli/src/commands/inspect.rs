// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `galloc inspect` command: display graph structure.
//!
//! Loads a graph manifest and prints its nodes in stored order, its
//! leafs, and the consumer and view counts the planner works from.

use super::{human_bytes, truncate};
use anyhow::Context;
use compute_graph::GraphManifest;
use std::path::Path;

pub fn execute(graph: &Path) -> anyhow::Result<()> {
    let graph = GraphManifest::from_file(graph)
        .and_then(|m| m.build())
        .with_context(|| format!("failed to load graph '{}'", graph.display()))?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Graph: {}", graph.name);
    println!("  Nodes: {}", graph.n_nodes());
    println!("  Leafs: {}", graph.n_leafs());
    println!(
        "  Without reuse: {}",
        human_bytes(graph.total_tensor_bytes())
    );
    println!();

    // ── Nodes ──────────────────────────────────────────────────
    println!(
        "  {:<4} {:<28} {:<10} {:<6} {:<16} {:>10} {:>5} {:>5}  {}",
        "Idx", "Name", "Op", "DType", "Shape", "Size", "Uses", "Views", "Notes",
    );
    println!("  {}", "-".repeat(100));
    for (i, &id) in graph.nodes().iter().enumerate() {
        let t = graph.tensor(id);
        let views = graph
            .nodes()
            .iter()
            .filter(|&&n| graph.tensor(n).view_src() == Some(id))
            .count();
        let mut notes = Vec::new();
        if let Some(v) = t.view() {
            notes.push(format!("view of '{}' +{}", graph.tensor(v.src).name(), v.offset));
        }
        if t.is_output() {
            notes.push("output".to_string());
        }
        if let Some(b) = t.backend() {
            notes.push(format!("on {b}"));
        }
        println!(
            "  {:<4} {:<28} {:<10} {:<6} {:<16} {:>10} {:>5} {:>5}  {}",
            i,
            truncate(t.name(), 28),
            t.op().as_str(),
            t.dtype().as_str(),
            t.shape().to_string(),
            human_bytes(t.nbytes()),
            graph.consumers(id),
            views,
            notes.join(", "),
        );
    }
    println!();

    // ── Leafs ──────────────────────────────────────────────────
    println!(
        "  {:<28} {:<6} {:<16} {:>10} {:>5}",
        "Leaf", "DType", "Shape", "Size", "Uses",
    );
    println!("  {}", "-".repeat(70));
    for &id in graph.leafs() {
        let t = graph.tensor(id);
        println!(
            "  {:<28} {:<6} {:<16} {:>10} {:>5}",
            truncate(t.name(), 28),
            t.dtype().as_str(),
            t.shape().to_string(),
            human_bytes(t.nbytes()),
            graph.consumers(id),
        );
    }
    println!();
    Ok(())
}
