// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Planning configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! alignment = 64
//! default_backend = "cpu"
//! schedule = "backend-grouped"
//! report_placements = true
//!
//! [[backends]]
//! name = "cpu"
//! kind = "cpu"
//!
//! [[backends]]
//! name = "gpu"
//! kind = "device"
//! capacity = "2G"
//! row_padding = 512
//! ```

use crate::RuntimeError;
use backend::{BackendRef, ByteSize, CpuBackend, DeviceBackend};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Kind of memory a configured backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host heap memory.
    Cpu,
    /// A simulated, capacity-bounded accelerator.
    Device,
}

/// One backend entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BackendConfig {
    /// Name tensors use to select this backend.
    pub name: String,
    pub kind: BackendKind,
    /// Device capacity; required for `device` backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<ByteSize>,
    /// Quantised row padding in elements, `device` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_padding: Option<usize>,
    /// Overrides the global alignment for this backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<usize>,
}

impl BackendConfig {
    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Cpu,
            capacity: None,
            row_padding: None,
            alignment: None,
        }
    }

    pub fn device(name: impl Into<String>, capacity: ByteSize) -> Self {
        Self {
            name: name.into(),
            kind: BackendKind::Device,
            capacity: Some(capacity),
            row_padding: None,
            alignment: None,
        }
    }
}

/// Node ordering used by planning passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// The graph's stored topological order, one node per barrier.
    Stored,
    /// Consecutive nodes of one backend batched between barriers.
    BackendGrouped,
}

impl Schedule {
    pub fn name(self) -> &'static str {
        match self {
            Schedule::Stored => "stored",
            Schedule::BackendGrouped => "backend-grouped",
        }
    }
}

/// Configuration for a planning session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Alignment applied to backends that do not set their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<usize>,
    /// Backends available to the graph, in allocator order.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
    /// Node ordering: `"stored"` or `"backend-grouped"`.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Backend for tensors that do not name one.
    #[serde(default = "default_backend")]
    pub default_backend: String,
    /// Whether reports list every tensor placement.
    #[serde(default = "default_true")]
    pub report_placements: bool,
}

fn default_backends() -> Vec<BackendConfig> {
    vec![BackendConfig::cpu("cpu")]
}

fn default_schedule() -> String {
    "stored".to_string()
}

fn default_backend() -> String {
    "cpu".to_string()
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.backends.is_empty() {
            return Err(RuntimeError::ConfigError(
                "at least one backend must be configured".into(),
            ));
        }
        let mut seen = HashSet::new();
        for b in &self.backends {
            if !seen.insert(b.name.as_str()) {
                return Err(RuntimeError::ConfigError(format!(
                    "backend '{}' is configured twice",
                    b.name
                )));
            }
            if b.kind == BackendKind::Device && b.capacity.is_none() {
                return Err(RuntimeError::ConfigError(format!(
                    "device backend '{}' needs a capacity",
                    b.name
                )));
            }
        }
        if !seen.contains(self.default_backend.as_str()) {
            return Err(RuntimeError::ConfigError(format!(
                "default backend '{}' is not configured",
                self.default_backend
            )));
        }
        self.parse_schedule()?;
        Ok(())
    }

    /// Parses the schedule name.
    pub fn parse_schedule(&self) -> Result<Schedule, RuntimeError> {
        match self.schedule.to_lowercase().as_str() {
            "stored" | "sequential" => Ok(Schedule::Stored),
            "backend-grouped" | "grouped" => Ok(Schedule::BackendGrouped),
            other => Err(RuntimeError::ConfigError(format!(
                "unknown schedule '{other}'; expected 'stored' or 'backend-grouped'"
            ))),
        }
    }

    /// Instantiates the configured backends, in order.
    pub fn create_backends(&self) -> Result<Vec<(String, BackendRef)>, RuntimeError> {
        self.backends
            .iter()
            .map(|b| -> Result<(String, BackendRef), RuntimeError> {
                let alignment = b.alignment.or(self.alignment);
                let backend: BackendRef = match b.kind {
                    BackendKind::Cpu => match alignment {
                        Some(a) => Arc::new(CpuBackend::with_alignment(a)?),
                        None => Arc::new(CpuBackend::new()),
                    },
                    BackendKind::Device => {
                        let capacity = b.capacity.ok_or_else(|| {
                            RuntimeError::ConfigError(format!(
                                "device backend '{}' needs a capacity",
                                b.name
                            ))
                        })?;
                        let mut device = DeviceBackend::new(b.name.clone(), capacity);
                        if let Some(a) = alignment {
                            device = device.with_alignment(a)?;
                        }
                        if let Some(p) = b.row_padding {
                            device = device.with_row_padding(p);
                        }
                        Arc::new(device)
                    }
                };
                Ok((b.name.clone(), backend))
            })
            .collect()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            alignment: None,
            backends: default_backends(),
            schedule: default_schedule(),
            default_backend: default_backend(),
            report_placements: true,
        }
    }
}
