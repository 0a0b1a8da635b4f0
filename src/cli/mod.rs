//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `scan`: Index directories of Terraform files and report what was found
//! - `graph`: Export the block dependency graph
//! - `watch`: Keep an index live while files change
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Index a workspace and print a summary
//! terracarta scan ./terraform
//!
//! # Machine-readable report
//! terracarta scan ./terraform --format json --output report.json
//!
//! # Export the dependency graph
//! terracarta graph ./terraform --format dot --output deps.dot
//!
//! # Keep the index live
//! terracarta watch ./terraform
//!
//! # Initialize configuration
//! terracarta init
//!
//! # Validate configuration
//! terracarta validate terracarta.yaml
//! ```

use crate::types::{GraphFormat, ReportFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Terracarta - Terraform/OpenTofu configuration indexer and reference mapper.
#[derive(Parser, Debug)]
#[command(
    name = "terracarta",
    author,
    version,
    about = "Terraform/OpenTofu configuration indexer and block reference mapper",
    long_about = "Terracarta indexes every declared block in a tree of Terraform/OpenTofu \
                  files and infers the dependency graph between them by scanning block \
                  bodies for symbolic references."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TERRACARTA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index directories of Terraform/OpenTofu files
    #[command(visible_alias = "s")]
    Scan(ScanArgs),

    /// Export the block dependency graph
    #[command(visible_alias = "g")]
    Graph(GraphArgs),

    /// Keep an index live while files change
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the scan command.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Paths to scan (directories containing Terraform files)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_enum)]
    pub format: ReportFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Treat parse diagnostics as failures (exit code 1)
    #[arg(long)]
    pub strict: bool,

    /// Stop at the first file that fails to parse
    #[arg(long)]
    pub fail_fast: bool,

    /// Bypass the parse cache
    #[arg(long)]
    pub no_cache: bool,

    /// Include the .terraform module cache in discovery
    #[arg(long)]
    pub include_terraform_cache: bool,

    /// Glob patterns to exclude from discovery
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Override the worker offload threshold (file count)
    #[arg(long, value_name = "N")]
    pub offload_threshold: Option<usize>,
}

/// Arguments for the graph command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Paths to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output format for the graph
    #[arg(short, long, default_value = "dot", value_enum)]
    pub format: GraphFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the watch command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Path to watch
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Override the debounce quiet period in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "terracarta.yaml")]
    pub config: PathBuf,
}
