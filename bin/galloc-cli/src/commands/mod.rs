// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared helpers.

pub mod alloc;
pub mod inspect;
pub mod plan;

use alloc_runtime::RuntimeConfig;
use anyhow::Context;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration file if one was given, applying a schedule
/// override.
pub fn load_config(path: Option<&Path>, schedule: Option<String>) -> anyhow::Result<RuntimeConfig> {
    let mut config = match path {
        Some(p) => RuntimeConfig::from_file(p)
            .with_context(|| format!("failed to load config '{}'", p.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(s) = schedule {
        config.schedule = s;
    }
    config.validate()?;
    tracing::debug!(
        "{} backend(s), schedule '{}', default '{}'",
        config.backends.len(),
        config.schedule,
        config.default_backend
    );
    Ok(config)
}

/// Formats a byte count for tables.
pub fn human_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB * KB {
        format!("{:.2} GB", b / (KB * KB * KB))
    } else if b >= KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Truncates a string to `max_len` with ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
