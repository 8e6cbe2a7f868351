//! Cablebus CLI - Audio Routing Engine
//!
//! Command-line interface for the cablebus routing engine.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cablebus::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Cablebus v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Cablebus v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &cablebus::Config) -> Result<()> {
    match cmd {
        Commands::Devices { hardware } => commands::list_devices(config, hardware),
        Commands::Effects => commands::list_effects(),
        Commands::Simulate {
            routes,
            effects,
            blocks,
            master,
            hardware,
        } => commands::simulate(config, &routes, &effects, blocks, master, hardware),
    }
}
