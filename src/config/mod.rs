//! Configuration management for vatransfer.
//!
//! vatransfer reads one TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `VATRANSFER_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`DhisConfig`] - DHIS2 connection, program, attribute and data element UIDs
//! - [`TransferSettings`] - working files and export column names
//! - [`OrgUnitConfig`] - organisation unit field, fallback and prefix mapping
//! - [`CodConfig`] - cause label to code table
//! - [`StoreConfig`] - transfer store path and encryption key
//! - [`LoggingConfig`] - local JSON log files
//!
//! # Example Configuration
//!
//! ```toml
//! [dhis]
//! base_url = "https://dhis.example.org"
//! username = "va_bot"
//! password = "${VATRANSFER_DHIS_PASSWORD}"
//! program_name = "Verbal Autopsy"
//!
//! [dhis.attributes]
//! serial_no = "htm6PixLJNy"
//! instance_id = "YLRvi4xkBbV"
//!
//! [dhis.data_elements]
//! cause_of_death = "htm6PixLJNy"
//! algorithm_metadata = "sXweI1lqUYP"
//! blob = "XLHIBoLtjGt"
//!
//! [transfer]
//! working_dir = "/var/lib/vatransfer"
//!
//! [org_unit]
//! field_name = "Id10057"
//! fallback = "DiszpKrYNg8"
//!
//! [store]
//! path = "/var/lib/vatransfer/transfer.db"
//! key = "${VATRANSFER_STORE_KEY}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, AttributeMap, CodConfig, DataElementMap, DhisConfig, Environment,
    LoggingConfig, OrgUnitConfig, StoreConfig, TransferConfig, TransferSettings,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
