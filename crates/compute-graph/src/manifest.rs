// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph manifests.
//!
//! A manifest lists tensors in definition order; every source must be
//! defined before the tensor that reads it.
//!
//! # Format
//! ```json
//! {
//!   "name": "mlp-block",
//!   "dtype": "f32",
//!   "tensors": [
//!     { "name": "x",   "shape": [64, 8] },
//!     { "name": "w",   "shape": [64, 64] },
//!     { "name": "h",   "op": "mul_mat", "src": ["w", "x"], "shape": [64, 8] },
//!     { "name": "row", "op": "view", "src": ["h"], "view_offset": 256, "shape": [64] },
//!     { "name": "out", "op": "gelu", "src": ["h"], "shape": [64, 8],
//!       "output": true, "backend": "gpu" }
//!   ]
//! }
//! ```

use crate::graph::Validated;
use crate::{ComputeGraph, DType, GraphError, Op, Shape, TensorId};
use std::collections::HashMap;
use std::path::Path;

/// Top-level graph manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphManifest {
    /// Graph name.
    pub name: String,
    /// Default dtype for tensors that do not name one.
    #[serde(default = "default_dtype")]
    pub dtype: String,
    /// Tensor definitions in dependency order.
    pub tensors: Vec<ManifestTensor>,
}

fn default_dtype() -> String {
    "f32".to_string()
}

/// One tensor entry in a manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestTensor {
    pub name: String,
    /// Producing op; absent for leafs.
    #[serde(default)]
    pub op: Option<String>,
    /// Names of source tensors.
    #[serde(default)]
    pub src: Vec<String>,
    /// Element type; views default to their source's, others to the
    /// manifest default.
    #[serde(default)]
    pub dtype: Option<String>,
    /// Dimensions, innermost first.
    pub shape: Vec<usize>,
    /// Byte offset into the source, for view ops.
    #[serde(default)]
    pub view_offset: Option<usize>,
    /// Keep this tensor alive after execution.
    #[serde(default)]
    pub output: bool,
    /// Backend expected to produce this tensor.
    #[serde(default)]
    pub backend: Option<String>,
}

impl GraphManifest {
    /// Loads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Builds and validates the graph described by this manifest.
    pub fn build(&self) -> Result<ComputeGraph<Validated>, GraphError> {
        let default_dtype: DType = self.dtype.parse()?;
        let mut graph = ComputeGraph::new(self.name.clone());
        let mut ids: HashMap<&str, TensorId> = HashMap::new();

        for entry in &self.tensors {
            if ids.contains_key(entry.name.as_str()) {
                return Err(GraphError::DuplicateTensor {
                    name: entry.name.clone(),
                });
            }

            let src = entry
                .src
                .iter()
                .map(|s| {
                    ids.get(s.as_str())
                        .copied()
                        .ok_or_else(|| GraphError::UnknownTensor { name: s.clone() })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let op: Op = match &entry.op {
                Some(name) => name.parse()?,
                None => Op::None,
            };
            let explicit_dtype = entry.dtype.as_deref().map(str::parse::<DType>).transpose()?;
            let shape = Shape::new(&entry.shape);

            let id = if op == Op::None {
                if !src.is_empty() {
                    return Err(GraphError::InvalidGraph(format!(
                        "leaf '{}' lists sources but has no op",
                        entry.name
                    )));
                }
                graph.new_tensor(entry.name.clone(), explicit_dtype.unwrap_or(default_dtype), shape)?
            } else if op.is_view() {
                let &[parent] = src.as_slice() else {
                    return Err(GraphError::InvalidView {
                        tensor: entry.name.clone(),
                        detail: format!("view ops take exactly one source, got {}", src.len()),
                    });
                };
                let dtype = explicit_dtype.unwrap_or_else(|| graph.tensor(parent).dtype());
                graph.view_op(
                    entry.name.clone(),
                    op,
                    parent,
                    entry.view_offset.unwrap_or(0),
                    dtype,
                    shape,
                )?
            } else {
                graph.op(
                    entry.name.clone(),
                    op,
                    &src,
                    explicit_dtype.unwrap_or(default_dtype),
                    shape,
                )?
            };

            if entry.output {
                graph.mark_output(id)?;
            }
            if let Some(backend) = &entry.backend {
                graph.set_backend(id, backend.clone())?;
            }
            ids.insert(entry.name.as_str(), id);
        }

        tracing::debug!(
            "manifest '{}' built: {} tensors",
            self.name,
            self.tensors.len()
        );
        graph.validate()
    }
}
