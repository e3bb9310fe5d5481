// Kiosk conversation orchestrator
// Main entry point for the kiosk binary

use clap::Parser;
use kiosk_engine::cli::{Cli, Command};
use kiosk_engine::config::Config;
use kiosk_engine::handlers::{
    handle_doctor, handle_housekeeping, handle_memory, handle_replay, handle_run, OutputFormat,
};
use kiosk_engine::telemetry::init_telemetry_with_level;
use kiosk_sdk::errors::{EngineError, KioskErrorExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Replay is pure and needs no configuration
    if let Command::Replay { file } = &cli.command {
        init_telemetry_with_level(cli.log.as_deref().unwrap_or("info"));
        return handle_replay(file, format).await;
    }

    let config = match &cli.config {
        Some(config_path) => Config::load_from_path(config_path),
        None => Config::load_or_create(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_telemetry_with_level(cli.log.as_deref().unwrap_or("info"));
            eprintln!("{}", e.user_hint());
            return Err(e.into());
        }
    };

    // RUST_LOG > --log > config
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!(
        "Kiosk v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let result = match cli.command {
        Command::Run { stub } => handle_run(stub, &config, format).await,
        Command::Replay { .. } => Ok(()),
        Command::Memory { action } => handle_memory(action, &config, format).await,
        Command::Housekeeping => handle_housekeeping(&config, format).await,
        Command::Doctor => handle_doctor(&config, format).await,
    };

    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("{}", engine_error.user_hint());
        }
    }
    result
}
