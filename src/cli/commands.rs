//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - config: print the effective configuration
//! - plan: validate a work plan and print its execution layers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentmesh - tool-using agents coordinated over a shared bus
#[derive(Parser, Debug)]
#[command(name = "agentmesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration as YAML
    Config,

    /// Validate a work plan and print its execution layers
    Plan {
        /// Path to a YAML work plan
        file: PathBuf,

        /// Print each item's task under its id
        #[arg(short, long)]
        detailed: bool,
    },
}
