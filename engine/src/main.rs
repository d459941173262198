// Valet multi-agent assistant
// Main entry point for the valet binary

use clap::Parser;
use valet_engine::cli::{Cli, Command};
use valet_engine::config::Config;
use valet_engine::handlers::{
    handle_ask, handle_chat, handle_cleanup, handle_history, handle_sessions, handle_stats,
    OutputFormat,
};
use valet_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Log level priority: RUST_LOG env var > --log flag > config
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Valet v{}", env!("CARGO_PKG_VERSION"));

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Chat { resume } => handle_chat(&config, format, resume).await,

        Command::Ask { query } => handle_ask(query, &config, format).await,

        Command::History { session, limit } => {
            handle_history(session, limit, &config, format).await
        }

        Command::Sessions { days, limit } => handle_sessions(days, limit, &config, format).await,

        Command::Stats => handle_stats(&config, format).await,

        Command::Cleanup { older_than_days } => {
            handle_cleanup(older_than_days, &config, format).await
        }
    }
}
