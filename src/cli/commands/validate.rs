//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the vatransfer configuration file.

use crate::config::{load_config, TransferConfig};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        match load_config(config_path) {
            Ok(config) => {
                println!("✅ Configuration is valid");
                println!();
                print_summary(&config);
                Ok(0)
            }
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                println!();
                Ok(e.category().exit_code())
            }
        }
    }
}

fn print_summary(config: &TransferConfig) {
    println!("Configuration Summary:");
    println!("  Environment: {:?}", config.environment);
    println!("  Log Level: {}", config.application.log_level);
    println!("  Dry Run: {}", config.application.dry_run);
    println!("  DHIS2 Server: {}", config.dhis.base_url);
    println!("  DHIS2 User: {}", config.dhis.username);
    println!("  Program: {}", config.dhis.program_name);
    println!("  TLS Verify: {}", config.dhis.tls_verify);
    println!("  Discover Org Units: {}", config.dhis.discover_org_units);
    for (name, uid) in config.dhis.attributes.entries() {
        println!("  Attribute {name}: {uid}");
    }
    println!("  Working Directory: {}", config.transfer.working_dir);
    println!("  New Export: {}", config.transfer.new_export_path().display());
    println!("  Carry-over: {}", config.transfer.carry_over_path().display());
    println!("  COD Results: {}", config.transfer.cod_results_path().display());
    println!("  Org Unit Field: {}", config.org_unit.field_name);
    println!(
        "  Org Unit Fallback: {}",
        config.org_unit.fallback.as_deref().unwrap_or("none")
    );
    println!(
        "  Org Unit Mapping: {} inline, file {}",
        config.org_unit.mapping.len(),
        config.org_unit.mapping_file.as_deref().unwrap_or("none")
    );
    println!("  Cause Codes: {}", config.cod.codes.len());
    println!("  Transfer Store: {}", config.store.path);
    println!("  Store Encrypted: {}", config.store.key.is_some());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_returns_configuration_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[dhis]\nbase_url = \"not a url\"\n").unwrap();

        let code = ValidateArgs {}
            .execute(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
