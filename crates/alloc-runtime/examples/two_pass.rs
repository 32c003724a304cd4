// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare schedules on a synthetic transformer split across a
//! host and a device.
//!
//! Every block runs its matmuls on the device and its norms and residuals
//! on the host. The table shows what each schedule asks from each backend.
//!
//! ```bash
//! cargo run -p alloc-runtime --example two_pass
//! ```

use alloc_runtime::{BackendConfig, PlanningSession, RuntimeConfig};
use backend::ByteSize;
use compute_graph::{ComputeGraph, DType, GraphError, Op, Shape, Validated};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing.
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let graph = build_graph("transformer-like", 12, 512, 32)?;
    println!("{}\n", graph.summary());

    println!(
        "{:<18} {:>12} {:>12} {:>10} {:>10}",
        "Schedule", "cpu MB", "gpu MB", "Saved", "In-place",
    );
    println!("{}", "-".repeat(66));

    for schedule in ["stored", "backend-grouped"] {
        let config = RuntimeConfig {
            backends: vec![
                BackendConfig::cpu("cpu"),
                BackendConfig::device("gpu", ByteSize::from_gb(1)),
            ],
            schedule: schedule.to_string(),
            report_placements: false,
            ..Default::default()
        };
        let report = PlanningSession::new(config, graph.clone())?
            .measure()?
            .allocate()?
            .report();

        let mb = |i: usize| report.backends[i].measured_bytes as f64 / (1024.0 * 1024.0);
        println!(
            "{:<18} {:>12.2} {:>12.2} {:>9.0}% {:>10}",
            schedule,
            mb(0),
            mb(1),
            report.savings_ratio() * 100.0,
            report.pass.inplace_reused,
        );
    }

    Ok(())
}

fn build_graph(
    name: &str,
    blocks: usize,
    dim: usize,
    tokens: usize,
) -> Result<ComputeGraph<Validated>, GraphError> {
    let act = Shape::matrix(dim, tokens);
    let mut g = ComputeGraph::new(name);
    let mut x = g.new_tensor("tokens", DType::F32, act.clone())?;

    for b in 0..blocks {
        let wq = g.new_tensor(format!("blk.{b}.wq"), DType::Q8_0, Shape::matrix(dim, dim))?;
        let w1 = g.new_tensor(format!("blk.{b}.w1"), DType::Q4_0, Shape::matrix(dim, dim * 4))?;
        let w2 = g.new_tensor(format!("blk.{b}.w2"), DType::Q4_0, Shape::matrix(dim * 4, dim))?;

        let n1 = g.op(format!("blk.{b}.norm1"), Op::RmsNorm, &[x], DType::F32, act.clone())?;
        let q = g.op(format!("blk.{b}.q"), Op::MulMat, &[wq, n1], DType::F32, act.clone())?;
        g.set_backend(q, "gpu")?;
        let attn = g.op(format!("blk.{b}.attn"), Op::SoftMax, &[q], DType::F32, act.clone())?;
        g.set_backend(attn, "gpu")?;
        let r1 = g.op(format!("blk.{b}.res1"), Op::Add, &[x, attn], DType::F32, act.clone())?;

        let n2 = g.op(format!("blk.{b}.norm2"), Op::RmsNorm, &[r1], DType::F32, act.clone())?;
        let up = g.op(
            format!("blk.{b}.up"),
            Op::MulMat,
            &[w1, n2],
            DType::F32,
            Shape::matrix(dim * 4, tokens),
        )?;
        g.set_backend(up, "gpu")?;
        let gate = g.op(
            format!("blk.{b}.gelu"),
            Op::Gelu,
            &[up],
            DType::F32,
            Shape::matrix(dim * 4, tokens),
        )?;
        g.set_backend(gate, "gpu")?;
        let down = g.op(format!("blk.{b}.down"), Op::MulMat, &[w2, gate], DType::F32, act.clone())?;
        g.set_backend(down, "gpu")?;
        x = g.op(format!("blk.{b}.res2"), Op::Add, &[r1, down], DType::F32, act.clone())?;
    }

    g.mark_output(x)?;
    g.validate()
}
