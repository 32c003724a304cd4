// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `galloc alloc` command: run both passes and print every placement.
//!
//! Demonstrates the full type-state pipeline:
//! ```text
//! PlanningSession<Idle> → measure → <Measured> → allocate → <Allocated> → report
//! ```

use super::{human_bytes, load_config, truncate};
use alloc_runtime::PlanningSession;
use anyhow::Context;
use std::path::Path;

pub fn execute(
    config: Option<&Path>,
    graph: &Path,
    schedule: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config, schedule)?;
    let session = PlanningSession::from_manifest(config, graph)
        .with_context(|| format!("failed to load graph '{}'", graph.display()))?
        .measure()?
        .allocate()
        .context("real pass failed")?;
    let report = session.report();

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!("{}", report.summary());
    println!();

    // ── Backends ───────────────────────────────────────────────
    println!(
        "  {:<12} {:>12} {:>12} {:>18} {:>8}",
        "Backend", "Measured", "Used", "Base", "Tensors",
    );
    println!("  {}", "-".repeat(66));
    for b in &report.backends {
        println!(
            "  {:<12} {:>12} {:>12} {:>#18x} {:>8}",
            b.name,
            human_bytes(b.measured_bytes),
            human_bytes(b.used_bytes),
            b.buffer_base,
            b.tensors,
        );
    }
    println!();

    if report.placements.is_empty() {
        return Ok(());
    }

    // ── Placements ─────────────────────────────────────────────
    println!(
        "  {:<28} {:<10} {:<8} {:>10} {:>10}  {}",
        "Tensor", "Op", "Backend", "Offset", "Size", "Notes",
    );
    println!("  {}", "-".repeat(84));
    for p in &report.placements {
        let offset = p
            .offset
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        let mut notes = Vec::new();
        if let Some(root) = &p.view_of {
            notes.push(format!("view of {root}"));
        }
        if p.output {
            notes.push("output".to_string());
        }
        if p.preallocated {
            notes.push("preallocated".to_string());
        }
        println!(
            "  {:<28} {:<10} {:<8} {:>10} {:>10}  {}",
            truncate(&p.name, 28),
            p.op,
            p.backend,
            offset,
            p.size,
            notes.join(", "),
        );
    }
    println!();
    Ok(())
}
