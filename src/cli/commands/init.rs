//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "vatransfer.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing vatransfer configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        match fs::write(&self.output, Self::sample_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your DHIS2 program and UIDs", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - VATRANSFER_DHIS_PASSWORD");
                println!("     - VATRANSFER_STORE_KEY (only with the sqlcipher build)");
                println!("  3. Validate configuration: vatransfer validate-config");
                println!("  4. Try a dry run: vatransfer run --dry-run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(3)
            }
        }
    }

    /// Sample configuration with every section and its defaults
    fn sample_config() -> &'static str {
        r#"# vatransfer Configuration File
# Verbal autopsy records and cause-of-death results to DHIS2

# Runtime environment (development, staging, production)
# Production refuses tls_verify = false
environment = "development"

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Stop after reconciliation; nothing is posted or recorded
dry_run = false

# ============================================================================
# DHIS2 Server
# ============================================================================
[dhis]
base_url = "https://dhis.example.org"
username = "va_bot"
password = "${VATRANSFER_DHIS_PASSWORD}"
timeout_seconds = 60
tls_verify = true

# Tracker program receiving the records; must match exactly one program
program_name = "Verbal Autopsy"

# Optional; taken from the program when omitted
# tracked_entity_type = "MCPQUTHX1Ze"
# stored_by = "va_bot"

# Only accept organisation units that exist on the server
discover_org_units = false

# Tracked entity attribute UIDs
[dhis.attributes]
serial_no = "htm6PixLJNy"
instance_id = "YLRvi4xkBbV"
# sex = "e96GB4CXyd3"
# date_of_birth = "gNqAzmNpTyz"
# age = "XLHIBoLtjGt"

# Event data element UIDs
[dhis.data_elements]
cause_of_death = "sfpqAeqKeyQ"
algorithm_metadata = "sXweI1lqUYP"
blob = "DMzuLjJVXsv"
# instance_id = "oaKpxeDrWwQ"
# age = "rwfuVQHnZJL"
# sex = "BwAXgRAOwmb"

# ============================================================================
# Working Files
# ============================================================================
[transfer]
working_dir = "./va-transfer"
new_export_file = "new_export.csv"
carry_over_file = "carry_over.csv"
cod_results_file = "cod_results.csv"
new_storage_file = "new_storage.csv"
blob_dir = "blobs"

# Export columns
instance_id_column = "meta-instanceID"
serial_no_column = "id"
sex_column = "Id10019"
dob_column = "Id10021"
dod_column = "Id10023"
age_column = "ageInYears"

# Cause-of-death results columns
cod_id_column = "ID"
cod_cause_column = "Cause"
cod_metadata_column = "Metadata"

# Code posted for an undetermined cause
undetermined_code = "99"

# ============================================================================
# Organisation Unit Resolution
# ============================================================================
[org_unit]
# Column holding the organisation unit; values that are not unit ids
# (or not among the discovered units) are looked up in the mapping table
field_name = "Id10057"

# Column whose prefix keys the mapping table (defaults to field_name)
# code_field = "Id10057"

# Unit used when the record carries none
# fallback = "DiszpKrYNg8"

prefix_length = 3

# CSV with columns code,org_unit (relative to working_dir)
# mapping_file = "org_units.csv"

[org_unit.mapping]
# "KAM" = "O6uvpzGd5pu"

# ============================================================================
# Cause-of-death codes (label = code); unlisted labels are posted as-is
# ============================================================================
[cod.codes]
# "Malaria" = "01.04"

# ============================================================================
# Transfer Store
# ============================================================================
[store]
path = "./va-transfer/transfer.db"
# SQLCipher key; requires the sqlcipher build feature
# key = "${VATRANSFER_STORE_KEY}"

# ============================================================================
# Logging
# ============================================================================
[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use tempfile::TempDir;

    #[test]
    fn test_sample_config_is_valid() {
        let config: TransferConfig = toml::from_str(InitArgs::sample_config()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.dhis.program_name, "Verbal Autopsy");
        assert_eq!(config.org_unit.prefix_length, 3);
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("vatransfer.toml");
        fs::write(&output, "# existing").unwrap();

        let args = InitArgs {
            output: output.to_string_lossy().into_owned(),
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "# existing");

        let args = InitArgs { force: true, ..args };
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(fs::read_to_string(&output).unwrap().contains("[dhis]"));
    }
}
