// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `galloc plan` command: run the measure pass only.
//!
//! Prints the buffer size each backend must provide for the real pass.

use super::{human_bytes, load_config};
use alloc_runtime::PlanningSession;
use anyhow::Context;
use std::path::Path;

pub fn execute(config: Option<&Path>, graph: &Path, schedule: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config, schedule)?;
    let session = PlanningSession::from_manifest(config, graph)
        .with_context(|| format!("failed to load graph '{}'", graph.display()))?;

    let total = session.graph().total_tensor_bytes();
    println!("{}", session.graph().summary());
    println!("  Schedule: {}", session.schedule().name());
    if let Some(seq) = session.parse_seq() {
        println!(
            "  Batches:  {}",
            alloc_runtime::schedule::count_batches(seq)
        );
    }
    println!();

    let measured = session.measure()?;

    println!("  {:<16} {:>14} {:>12}", "Backend", "Required", "Bytes");
    println!("  {}", "-".repeat(44));
    for (name, &bytes) in measured.backend_names().zip(measured.measured()) {
        println!("  {:<16} {:>14} {:>12}", name, human_bytes(bytes), bytes);
    }
    println!("  {}", "-".repeat(44));
    let required = measured.total_required();
    println!("  {:<16} {:>14} {:>12}", "total", human_bytes(required), required);
    println!();

    let saved = if total > 0 {
        100.0 * (1.0 - required as f64 / total as f64)
    } else {
        0.0
    };
    println!(
        "  Without reuse: {}  ({saved:.0}% saved)",
        human_bytes(total)
    );
    println!("  {}", measured.measure_stats().summary());
    Ok(())
}
