//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for vatransfer using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// vatransfer - verbal autopsy to DHIS2 transfer
#[derive(Parser, Debug)]
#[command(name = "vatransfer")]
#[command(version, about, long_about = None)]
#[command(author = "vatransfer Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vatransfer.toml", env = "VATRANSFER_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "VATRANSFER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one transfer pass
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show outcome counts, quarantine and the last run
    Status(commands::status::StatusArgs),

    /// Release a quarantined record for the next run
    Repair(commands::repair::RepairArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["vatransfer", "run"]);
        assert_eq!(cli.config, "vatransfer.toml");
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::parse_from(["vatransfer", "run", "--dry-run", "--yes"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.dry_run);
        assert!(args.yes);
    }

    #[test]
    fn test_cli_parse_with_config_and_log_level() {
        let cli = Cli::parse_from([
            "vatransfer",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
            "status",
        ]);
        assert_eq!(cli.config, "custom.toml");
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["vatransfer", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_repair() {
        let cli = Cli::parse_from([
            "vatransfer",
            "repair",
            "uuid:0b3c",
            "--org-unit",
            "ouDistrict1",
        ]);
        let Commands::Repair(args) = cli.command else {
            panic!("expected repair");
        };
        assert_eq!(args.instance_id, "uuid:0b3c");
        assert_eq!(args.org_unit.as_deref(), Some("ouDistrict1"));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["vatransfer", "init", "--force"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
