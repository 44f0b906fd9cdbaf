//! burrow-poller - Kafka consumer lag poller for Burrow
//!
#![doc = "burrow-poller - Kafka consumer lag poller for Burrow"]
#![doc = "Main entry point for the burrow-poller application."]

use anyhow::Result;

use burrow_poller::cli::{Cli, Commands};
use burrow_poller::commands;
use burrow_poller::config::Config;
use burrow_poller::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(&cli.config, &cli)?;

    // Initialize tracing
    init_logging(&config.logging)?;
    if !std::path::Path::new(&cli.config).exists() {
        tracing::warn!("Config file not found at {}, using defaults", cli.config);
    }

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Run { output } => {
            tracing::info!("Starting scheduled polling");
            if let Some(path) = &output {
                tracing::debug!("Appending records to: {}", path.display());
            }
            commands::r#run::run_poller(config, output).await?;
            Ok(())
        }
        Commands::Once { output } => {
            tracing::info!("Running a single poll cycle");
            commands::once::run_once(config, output).await?;
            Ok(())
        }
        Commands::Check => {
            commands::check::check_config(&config)?;
            Ok(())
        }
    }
}
