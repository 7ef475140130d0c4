//! CLI module for agentmesh - command-line interface and subcommands.
//!
//! Provides inspection commands for configuration and work plans.

pub mod commands;
pub mod plan;

pub use commands::Cli;
