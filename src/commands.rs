//! CLI command definitions
//!
//! Defines the clap commands for the fleet CLI.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format of a run report
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Colored summary table
    #[default]
    Table,
    /// Aggregated JSON document
    Json,
    /// JUnit XML for CI ingestion
    Junit,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run test scenarios against the resource CLI
    Run {
        /// Scenario files or directories (default: runner.scenario_dirs from config)
        paths: Vec<PathBuf>,

        /// Only run the scenario with this id (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Only run scenarios carrying this tag (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,

        /// Only run scenarios from this file, directory or `module:<group>` (repeatable)
        #[arg(long = "source", short = 's')]
        sources: Vec<String>,

        /// Load a registered scenario module, e.g. `smoke` (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,

        /// Concurrent scenarios and collaborator calls
        #[arg(long, short = 'j')]
        workers: Option<usize>,

        /// Keep running later batches after a failure
        #[arg(long)]
        continue_on_failure: bool,

        /// Do not delete anything after the run
        #[arg(long)]
        skip_cleanup: bool,

        /// Keep created resources when any scenario failed
        #[arg(long, conflicts_with = "skip_cleanup")]
        keep_on_failure: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
        format: ReportFormat,

        /// Write the report to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Re-run failed scenarios with a verbose collaborator
        #[arg(long)]
        diagnose: bool,

        /// Rehearse against an in-memory collaborator
        #[arg(long)]
        dry_run: bool,
    },

    /// List scenarios without running them
    #[command(alias = "ls")]
    List {
        /// Scenario files or directories
        paths: Vec<PathBuf>,

        /// Include a registered scenario module (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
    },

    /// Check scenario files for load and validation errors
    Validate {
        /// Scenario files or directories
        paths: Vec<PathBuf>,

        /// Include a registered scenario module (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
    },

    /// Show execution batches and cleanup order
    Plan {
        /// Scenario files or directories
        paths: Vec<PathBuf>,

        /// Only plan the scenario with this id (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Only plan scenarios carrying this tag (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,

        /// Only plan scenarios from this file, directory or `module:<group>` (repeatable)
        #[arg(long = "source", short = 's')]
        sources: Vec<String>,

        /// Include a registered scenario module (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
    },

    /// Show the entity dependency table
    Entities,
}
