use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use agentmesh::config::Config;
use agentmesh::error::MeshError;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use cli::plan::PlanFile;

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentmesh")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("agentmesh.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Config => handle_config_command(config),
        Commands::Plan { file, detailed } => handle_plan_command(file, *detailed, config),
    }
}

fn handle_config_command(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn handle_plan_command(file: &Path, detailed: bool, config: &Config) -> Result<()> {
    info!("Validating plan: {}", file.display());
    let plan = PlanFile::load(file)?;
    let graph = plan.graph().context("Invalid plan")?;

    let layers = match graph.execution_layers() {
        Ok(layers) => layers,
        Err(MeshError::CyclicDependency(cycle)) => {
            println!("{} {}", "Cycle:".red(), cycle.join(" -> "));
            eyre::bail!("Plan contains a dependency cycle");
        }
        Err(e) => return Err(e).context("Invalid plan"),
    };

    println!(
        "{} {} items in {} layers (max {} concurrent)",
        "Plan:".green(),
        plan.items.len(),
        layers.len(),
        config.pool.max_concurrent
    );
    for (index, layer) in layers.iter().enumerate() {
        println!("{} {}", format!("Layer {}:", index + 1).cyan(), layer.join(", "));
        if detailed {
            for id in layer {
                if let Some(item) = plan.get(id) {
                    println!("  {} ({}): {}", id.bold(), item.kind(), item.task);
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
