//! Vigil CLI entry point

use anyhow::{Context, Result};
use clap::Parser;

use vigil::cli::{commands, Cli, Commands};
use vigil::infrastructure::config::ConfigLoader;
use vigil::infrastructure::logging::Logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };

    let _logger = Logger::init(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Start => commands::start::handle_start(&config).await,
        Commands::Migrate => commands::migrate::handle_migrate(&config).await,
        Commands::AddTarget {
            name,
            address,
            kind,
            owner,
            plan,
            priority,
            frequency_minutes,
            emails,
        } => {
            commands::add_target::handle_add_target(
                &config,
                name,
                address,
                kind,
                owner,
                plan,
                priority,
                frequency_minutes,
                emails,
            )
            .await
        }
        Commands::Probe { target_id, force } => {
            commands::probe::handle_probe(&config, target_id, force).await
        }
        Commands::Retention => commands::retention::handle_retention(&config).await,
    }
}
