// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end planning pipeline.
//!
//! These tests exercise the complete flow from manifest or graph
//! construction → measure pass → backend buffers → real pass → report,
//! proving that the crates compose correctly and that the real pass
//! reproduces the measured layout.

use alloc_runtime::{
    BackendConfig, PlanningSession, RuntimeConfig, RuntimeError, Schedule,
};
use backend::ByteSize;
use compute_graph::{ComputeGraph, DType, Op, Shape, TensorId, Validated};
use std::collections::HashMap;

// ── Helpers ────────────────────────────────────────────────────

fn two_backends(schedule: &str) -> RuntimeConfig {
    RuntimeConfig {
        backends: vec![
            BackendConfig::cpu("cpu"),
            BackendConfig::device("gpu", ByteSize::from_mb(256)),
        ],
        schedule: schedule.to_string(),
        ..Default::default()
    }
}

/// Small deterministic generator for graph shapes.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

/// A random DAG of ops that never run in place, with some views and a
/// random backend per node. The first node always runs on `gpu`.
fn random_graph(seed: u64, n_nodes: usize) -> ComputeGraph<Validated> {
    let mut rng = Lcg(seed);
    let mut g = ComputeGraph::new(format!("random-{seed}"));
    let mut ids: Vec<TensorId> = (0..3)
        .map(|i| {
            let len = 16 * (1 + rng.below(32));
            g.new_tensor(format!("in{i}"), DType::F32, Shape::vector(len))
                .unwrap()
        })
        .collect();

    let ops = [Op::Dup, Op::Cont, Op::Concat, Op::GetRows, Op::MulMat];
    for n in 0..n_nodes {
        let name = format!("n{n}");
        let id = if n > 0 && rng.below(5) == 0 {
            let src = ids[ids.len() - 1 - rng.below(ids.len().min(4))];
            let src_len = g.tensor(src).shape().num_elements();
            if src_len >= 32 && !g.tensor(src).is_view() {
                g.view(name, src, 0, Shape::vector(src_len / 2)).unwrap()
            } else {
                g.op(name, Op::Dup, &[src], DType::F32, Shape::vector(src_len))
                    .unwrap()
            }
        } else {
            let n_src = 1 + rng.below(2);
            let src: Vec<TensorId> = (0..n_src)
                .map(|_| ids[ids.len() - 1 - rng.below(ids.len().min(6))])
                .collect();
            let len = 16 * (1 + rng.below(64));
            let op = ops[rng.below(ops.len())];
            g.op(name, op, &src, DType::F32, Shape::vector(len)).unwrap()
        };
        if n == 0 || rng.below(2) == 0 {
            g.set_backend(id, "gpu").unwrap();
        }
        ids.push(id);
    }
    let last = *ids.last().unwrap();
    g.mark_output(last).unwrap();
    g.validate().unwrap()
}

/// Node positions during which each non-view tensor must keep its bytes,
/// for the stored schedule.
fn live_intervals(g: &ComputeGraph<Validated>) -> HashMap<TensorId, (usize, usize)> {
    let root = |id: TensorId| g.tensor(id).view_src().unwrap_or(id);
    let mut intervals: HashMap<TensorId, (usize, usize)> = HashMap::new();
    let end = usize::MAX;

    for (p, &id) in g.nodes().iter().enumerate() {
        let t = g.tensor(id);
        if !t.is_view() {
            intervals.entry(id).or_insert((p, p));
        }
        for &s in t.src() {
            let r = root(s);
            let entry = intervals.entry(r).or_insert((p, p));
            entry.1 = entry.1.max(p);
        }
    }
    for (&id, interval) in intervals.iter_mut() {
        let t = g.tensor(id);
        let unread = g.consumers(id) == 0;
        // A root whose view nobody reads keeps that view alive.
        let pinned_by_view = g
            .nodes()
            .iter()
            .any(|&n| g.tensor(n).view_src() == Some(id) && g.consumers(n) == 0);
        if t.is_output() || unread || pinned_by_view {
            interval.1 = end;
        }
    }
    intervals
}

// ── Full Pipeline Tests ────────────────────────────────────────

#[test]
fn test_end_to_end_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("graph.json");
    std::fs::write(
        &graph_path,
        r#"{
  "name": "mlp",
  "tensors": [
    { "name": "x",   "shape": [64, 8] },
    { "name": "w1",  "shape": [64, 64], "dtype": "f16" },
    { "name": "h",   "op": "mul_mat", "src": ["w1", "x"], "shape": [64, 8], "backend": "gpu" },
    { "name": "a",   "op": "gelu", "src": ["h"], "shape": [64, 8], "backend": "gpu" },
    { "name": "row", "op": "view", "src": ["a"], "view_offset": 256, "shape": [64] },
    { "name": "out", "op": "scale", "src": ["row"], "shape": [64], "output": true }
  ]
}"#,
    )
    .unwrap();
    let config_path = dir.path().join("galloc.toml");
    std::fs::write(
        &config_path,
        r#"
schedule = "backend-grouped"

[[backends]]
name = "cpu"
kind = "cpu"

[[backends]]
name = "gpu"
kind = "device"
capacity = "16M"
"#,
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&config_path).unwrap();
    let session = PlanningSession::from_manifest(config, &graph_path)
        .unwrap()
        .measure()
        .unwrap();
    assert_eq!(session.schedule(), Schedule::BackendGrouped);
    // out is the only cpu tensor.
    assert_eq!(session.required("cpu"), Some(256));
    let gpu = session.required("gpu").unwrap();
    assert!(gpu > 0);

    let session = session.allocate().unwrap();
    let report = session.report();
    assert_eq!(report.backends[1].used_bytes, gpu);
    // a reuses h in place.
    assert_eq!(report.pass.inplace_reused, 1);

    let g = session.graph();
    let a = g.find("a").unwrap();
    let h = g.find("h").unwrap();
    let row = g.find("row").unwrap();
    assert_eq!(session.address_of(a), session.address_of(h));
    assert_eq!(
        session.address_of(row),
        session.address_of(a).map(|addr| addr + 256)
    );
}

#[test]
fn test_real_pass_matches_measure() {
    for schedule in ["stored", "backend-grouped"] {
        for seed in 1..=8 {
            let graph = random_graph(seed, 40);
            let session = PlanningSession::new(two_backends(schedule), graph)
                .unwrap()
                .measure()
                .unwrap();
            let measured = session.measured().to_vec();
            let session = session.allocate().unwrap();

            for (alloc, &m) in session.allocators().iter().zip(&measured) {
                assert_eq!(alloc.size(), m, "seed {seed} ({schedule})");
                assert_eq!(alloc.max_size(), m, "seed {seed} ({schedule})");
            }

            // Every placement lies inside its backend buffer.
            let g = session.graph();
            for t in g.tensors() {
                let Some(data) = t.data() else {
                    assert!(t.is_leaf() && g.consumers(t.id()) == 0);
                    continue;
                };
                let alloc = session
                    .allocators()
                    .iter()
                    .find(|a| a.owns(&data))
                    .expect("placed in a session buffer");
                assert!(data.offset + t.nbytes() <= alloc.size());
            }
        }
    }
}

#[test]
fn test_live_tensors_never_overlap() {
    for seed in 1..=12 {
        let graph = random_graph(seed, 48);
        let session = PlanningSession::new(two_backends("stored"), graph)
            .unwrap()
            .measure()
            .unwrap()
            .allocate()
            .unwrap();
        let g = session.graph();
        let intervals = live_intervals(g);

        let regions: Vec<(TensorId, &str, usize, usize)> = intervals
            .keys()
            .map(|&id| {
                let start = session.address_of(id).unwrap();
                let backend = session.backend_of(id).unwrap();
                (id, backend, start, start + g.tensor(id).nbytes())
            })
            .collect();

        for (i, &(a, ba, sa, ea)) in regions.iter().enumerate() {
            for &(b, bb, sb, eb) in &regions[i + 1..] {
                if ba != bb {
                    continue;
                }
                let (la, ha) = intervals[&a];
                let (lb, hb) = intervals[&b];
                let live_together = la <= hb && lb <= ha;
                let overlap = sa < eb && sb < ea;
                assert!(
                    !(live_together && overlap),
                    "seed {seed}: '{}' and '{}' overlap while both live",
                    g.tensor(a).name(),
                    g.tensor(b).name()
                );
            }
        }
    }
}

#[test]
fn test_grouped_schedule_batches_backends() {
    let graph = random_graph(7, 32);
    let session = PlanningSession::new(two_backends("backend-grouped"), graph).unwrap();
    let seq = session.parse_seq().unwrap();

    // Within a batch every node shares one backend.
    let g = session.graph();
    let mut batch_backend: Option<&str> = None;
    for step in seq {
        match *step {
            tensor_alloc::ParseStep::Node(i) => {
                let b = session.backend_of(g.node(i).unwrap()).unwrap();
                if let Some(current) = batch_backend {
                    assert_eq!(current, b);
                }
                batch_backend = Some(b);
            }
            tensor_alloc::ParseStep::Barrier => batch_backend = None,
        }
    }
    session.measure().unwrap().allocate().unwrap();
}

// ── Backends ───────────────────────────────────────────────────

#[test]
fn test_device_row_padding_counts_in_measure() {
    let mut g = ComputeGraph::new("quant");
    // 96 q4_0 elements per row: not a multiple of the padding.
    let w = g.new_tensor("w", DType::Q4_0, Shape::matrix(96, 4)).unwrap();
    let x = g.new_tensor("x", DType::F32, Shape::matrix(96, 1)).unwrap();
    let y = g
        .op("y", Op::MulMat, &[w, x], DType::F32, Shape::matrix(4, 1))
        .unwrap();
    g.mark_output(y).unwrap();
    g.set_backend(y, "gpu").unwrap();
    let g = g.validate().unwrap();

    let mut gpu = BackendConfig::device("gpu", ByteSize::from_mb(1));
    gpu.row_padding = Some(512);
    let config = RuntimeConfig {
        backends: vec![BackendConfig::cpu("cpu"), gpu],
        default_backend: "gpu".into(),
        ..Default::default()
    };

    let session = PlanningSession::new(config, g).unwrap().measure().unwrap();
    let unpadded = DType::Q4_0.row_size(96) * 4;
    let padded = unpadded + DType::Q4_0.row_size(512);
    // w and x are live together, each rounded to the device alignment.
    let align = |n: usize| n.div_ceil(256) * 256;
    assert!(session.required("gpu").unwrap() >= align(padded));
    assert_eq!(session.required("cpu"), Some(0));
    session.allocate().unwrap();
}

#[test]
fn test_device_too_small_fails_real_pass() {
    let mut g = ComputeGraph::new("big");
    let w = g.new_tensor("w", DType::F32, Shape::matrix(64, 64)).unwrap();
    let x = g.new_tensor("x", DType::F32, Shape::matrix(64, 1)).unwrap();
    let y = g
        .op("y", Op::MulMat, &[w, x], DType::F32, Shape::matrix(64, 1))
        .unwrap();
    g.set_backend(y, "gpu").unwrap();
    g.mark_output(y).unwrap();

    let config = RuntimeConfig {
        backends: vec![
            BackendConfig::cpu("cpu"),
            BackendConfig::device("gpu", ByteSize::from_kb(1)),
        ],
        ..Default::default()
    };
    let session = PlanningSession::new(config, g.validate().unwrap())
        .unwrap()
        .measure()
        .unwrap();
    // The measure pass only sizes; it needs no device memory.
    assert!(session.required("gpu").unwrap() > 64 * 64 * 4);
    assert!(matches!(
        session.allocate(),
        Err(RuntimeError::AllocError(_))
    ));
}

// ── Errors ─────────────────────────────────────────────────────

#[test]
fn test_missing_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let err = PlanningSession::from_manifest(RuntimeConfig::default(), &dir.path().join("none.json"))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::GraphError(_)));
}

#[test]
fn test_unknown_backend_label() {
    let err = PlanningSession::new(RuntimeConfig::default(), random_graph(2, 16)).unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownBackend { .. }));
}

// ── Config Roundtrip ───────────────────────────────────────────

#[test]
fn test_config_toml_roundtrip() {
    let config = two_backends("backend-grouped");
    let toml = config.to_toml().unwrap();
    let back = RuntimeConfig::from_toml(&toml).unwrap();
    assert_eq!(back.backends.len(), 2);
    assert_eq!(back.parse_schedule().unwrap(), Schedule::BackendGrouped);
    assert!(back.validate().is_ok());
}
