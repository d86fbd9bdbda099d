//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::TransferConfig;
use super::secret::secret_string;
use crate::domain::errors::TransferError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`TransferConfig`]
/// 4. Applies environment variable overrides (`VATRANSFER_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Every failure is a [`TransferError::Configuration`].
///
/// # Examples
///
/// ```no_run
/// use vatransfer::config::loader::load_config;
///
/// let config = load_config("vatransfer.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TransferConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TransferError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        TransferError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(contents: &str) -> Result<TransferConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: TransferConfig = toml::from_str(&contents)
        .map_err(|e| TransferError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        TransferError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TransferError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(TransferError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

/// Applies environment variable overrides using the `VATRANSFER_*` prefix
///
/// Variables follow the pattern `VATRANSFER_<SECTION>_<KEY>`, for example
/// `VATRANSFER_DHIS_BASE_URL` or `VATRANSFER_STORE_KEY`. Values that fail to
/// parse leave the file value in place.
fn apply_env_overrides(config: &mut TransferConfig) {
    // Application overrides
    if let Ok(val) = std::env::var("VATRANSFER_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("VATRANSFER_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(config.application.dry_run);
    }

    // DHIS2 overrides
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_BASE_URL") {
        config.dhis.base_url = val;
    }
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_USERNAME") {
        config.dhis.username = val;
    }
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_PASSWORD") {
        config.dhis.password = secret_string(val);
    }
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_PROGRAM_NAME") {
        config.dhis.program_name = val;
    }
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_TLS_VERIFY") {
        config.dhis.tls_verify = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("VATRANSFER_DHIS_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.dhis.timeout_seconds = timeout;
        }
    }

    // Transfer overrides
    if let Ok(val) = std::env::var("VATRANSFER_TRANSFER_WORKING_DIR") {
        config.transfer.working_dir = val;
    }

    // Organisation unit overrides
    if let Ok(val) = std::env::var("VATRANSFER_ORG_UNIT_FALLBACK") {
        config.org_unit.fallback = Some(val);
    }
    if let Ok(val) = std::env::var("VATRANSFER_ORG_UNIT_MAPPING_FILE") {
        config.org_unit.mapping_file = Some(val);
    }

    // Store overrides
    if let Ok(val) = std::env::var("VATRANSFER_STORE_PATH") {
        config.store.path = val;
    }
    if let Ok(val) = std::env::var("VATRANSFER_STORE_KEY") {
        config.store.key = Some(secret_string(val));
    }

    // Logging overrides
    if let Ok(val) = std::env::var("VATRANSFER_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("VATRANSFER_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
}
