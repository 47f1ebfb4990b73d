//! dbseed: declarative SQL database seeding.
//!
//! Command-line front end over `dbseed-lib`:
//! - `validate` checks stack file preconditions without declaring anything
//! - `synth` declares the stack and emits the synthesized manifest
//! - `stage` runs the script stager and reports content fingerprints

mod cmd;
mod output;
mod stackfile;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{cmd_stage, cmd_synth, cmd_validate};
use crate::output::OutputFormat;

/// dbseed - declarative SQL database seeding
#[derive(Parser)]
#[command(name = "dbseed")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Check stack file preconditions without declaring resources
  Validate {
    /// Path to the stack file
    #[arg(default_value = "dbseed.toml")]
    config: PathBuf,
  },
  /// Declare the stack and emit the synthesized manifest
  Synth {
    /// Path to the stack file
    #[arg(default_value = "dbseed.toml")]
    config: PathBuf,

    /// Write the manifest JSON to this path
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Output format for the summary
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
  },
  /// Run the script stager and report content fingerprints
  Stage {
    /// Path to the stack file
    #[arg(default_value = "dbseed.toml")]
    config: PathBuf,

    /// Copy the staged layout into this directory for inspection
    #[arg(short, long)]
    keep: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Validate { config } => cmd_validate(&config),
    Commands::Synth { config, out, format } => cmd_synth(&config, out.as_deref(), format, cli.verbose),
    Commands::Stage { config, keep } => cmd_stage(&config, keep.as_deref()),
  }
}
