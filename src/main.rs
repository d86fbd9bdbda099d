// vatransfer - Verbal autopsy to DHIS2 transfer
// Copyright (c) 2025 vatransfer Contributors
// Licensed under the MIT License

use clap::Parser;
use std::process;
use vatransfer::cli::{Cli, Commands};
use vatransfer::config::{load_config, LoggingConfig};
use vatransfer::logging::init_logging;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Only a run writes file logs; other commands log to the console
    let file_config = match &cli.command {
        Commands::Run(_) => load_config(&cli.config).ok(),
        _ => None,
    };
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| file_config.as_ref().map(|c| c.application.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let logging_config = file_config
        .map(|c| c.logging)
        .unwrap_or(LoggingConfig {
            local_enabled: false,
            ..LoggingConfig::default()
        });

    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(e.category().exit_code());
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "vatransfer - Verbal autopsy to DHIS2 transfer"
    );

    let exit_code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5
        }
    };

    // Flush file logs before exiting
    drop(guard);
    process::exit(exit_code);
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Run(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Status(args) => args.execute(&cli.config).await,
        Commands::Repair(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    }
}
