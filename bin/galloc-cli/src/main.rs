// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # galloc
//!
//! Command-line interface for planning tensor memory of computation graphs.
//!
//! ## Usage
//! ```bash
//! # Measure how much memory each backend needs
//! galloc plan graph.json
//!
//! # Allocate real buffers and print every placement
//! galloc --config galloc.toml alloc graph.json --json
//!
//! # Inspect graph structure and liveness inputs
//! galloc inspect graph.json
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "galloc",
    about = "Ahead-of-time memory planner for tensor computation graphs",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the measure pass and print the bytes each backend needs.
    Plan {
        /// Path to a JSON graph manifest.
        graph: PathBuf,

        /// Override the configured schedule: stored, backend-grouped.
        #[arg(short, long)]
        schedule: Option<String>,
    },

    /// Run both passes and print where every tensor lands.
    Alloc {
        /// Path to a JSON graph manifest.
        graph: PathBuf,

        /// Override the configured schedule: stored, backend-grouped.
        #[arg(short, long)]
        schedule: Option<String>,

        /// Print the full plan report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print nodes, leafs, consumer counts and views of a graph.
    Inspect {
        /// Path to a JSON graph manifest.
        graph: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Plan { graph, schedule } => {
            commands::plan::execute(cli.config.as_deref(), &graph, schedule)
        }
        Commands::Alloc {
            graph,
            schedule,
            json,
        } => commands::alloc::execute(cli.config.as_deref(), &graph, schedule, json),
        Commands::Inspect { graph } => commands::inspect::execute(&graph),
    }
}
