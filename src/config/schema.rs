//! Configuration schema types

use crate::config::SecretString;
use crate::domain::ColumnSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    Production,
}

/// Root configuration, mapping one-to-one onto the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,

    /// Destination DHIS2 server
    pub dhis: DhisConfig,

    /// Working files and export column names
    #[serde(default)]
    pub transfer: TransferSettings,

    /// Organisation unit resolution
    #[serde(default)]
    pub org_unit: OrgUnitConfig,

    /// Cause-of-death code table
    #[serde(default)]
    pub cod: CodConfig,

    /// Local transfer store
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TransferConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value found
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.dhis.validate(&self.environment)?;
        self.transfer.validate()?;
        self.org_unit.validate()?;
        self.store.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stop after reconciliation without posting or writing outcomes
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// DHIS2 server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhisConfig {
    /// Server root, e.g. `https://play.dhis2.org/2.39`
    pub base_url: String,

    pub username: String,

    /// Stored securely in memory and zeroized on drop
    pub password: SecretString,

    /// Transport timeout for every destination call
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification
    ///
    /// Cannot be disabled in production environments.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Name of the tracker program; exactly one program must match
    pub program_name: String,

    /// Tracked entity type; taken from the program when absent
    #[serde(default)]
    pub tracked_entity_type: Option<String>,

    /// Value of `storedBy` on created events
    #[serde(default)]
    pub stored_by: Option<String>,

    /// Fetch the server's organisation units at connect time and treat
    /// unknown ids as unresolved
    #[serde(default)]
    pub discover_org_units: bool,

    pub attributes: AttributeMap,

    pub data_elements: DataElementMap,
}

impl DhisConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        use secrecy::ExposeSecret;

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| format!("dhis.base_url '{}' is not a valid URL: {}", self.base_url, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err("dhis.base_url must start with http:// or https://".to_string());
        }

        if self.username.trim().is_empty() {
            return Err("dhis.username cannot be empty".to_string());
        }
        if self.password.expose_secret().is_empty() {
            return Err("dhis.password cannot be empty".to_string());
        }
        if self.program_name.trim().is_empty() {
            return Err("dhis.program_name cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("dhis.timeout_seconds must be > 0".to_string());
        }

        if *environment == Environment::Production && !self.tls_verify {
            return Err(
                "TLS certificate verification cannot be disabled in production environments. \
                Set 'tls_verify = true', or use environment = \"development\" or \"staging\" for testing."
                    .to_string(),
            );
        }

        self.attributes.validate()?;
        self.data_elements.validate()?;
        Ok(())
    }
}

/// Logical identity attribute name to destination attribute UID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMap {
    pub serial_no: String,
    pub instance_id: String,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl AttributeMap {
    fn validate(&self) -> Result<(), String> {
        if self.serial_no.trim().is_empty() {
            return Err("dhis.attributes.serial_no cannot be empty".to_string());
        }
        if self.instance_id.trim().is_empty() {
            return Err("dhis.attributes.instance_id cannot be empty".to_string());
        }
        Ok(())
    }

    /// `(logical name, attribute UID)` for every configured attribute
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = vec![
            ("serial_no", self.serial_no.as_str()),
            ("instance_id", self.instance_id.as_str()),
        ];
        if let Some(uid) = &self.sex {
            entries.push(("sex", uid));
        }
        if let Some(uid) = &self.date_of_birth {
            entries.push(("date_of_birth", uid));
        }
        if let Some(uid) = &self.age {
            entries.push(("age", uid));
        }
        entries
    }
}

/// Data element UIDs used on the cause-of-death event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataElementMap {
    pub cause_of_death: String,
    pub algorithm_metadata: String,
    /// File-resource data element holding the uploaded blob
    pub blob: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
}

impl DataElementMap {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cause_of_death", &self.cause_of_death),
            ("algorithm_metadata", &self.algorithm_metadata),
            ("blob", &self.blob),
        ] {
            if value.trim().is_empty() {
                return Err(format!("dhis.data_elements.{name} cannot be empty"));
            }
        }
        Ok(())
    }
}

/// `[transfer]` section: working files and column names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Directory the relative file names below are resolved against
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    #[serde(default = "default_new_export_file")]
    pub new_export_file: String,

    #[serde(default = "default_carry_over_file")]
    pub carry_over_file: String,

    #[serde(default = "default_cod_results_file")]
    pub cod_results_file: String,

    #[serde(default = "default_new_storage_file")]
    pub new_storage_file: String,

    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,

    #[serde(default = "default_instance_id_column")]
    pub instance_id_column: String,

    #[serde(default = "default_serial_no_column")]
    pub serial_no_column: String,

    #[serde(default = "default_sex_column")]
    pub sex_column: String,

    #[serde(default = "default_dob_column")]
    pub dob_column: String,

    #[serde(default = "default_dod_column")]
    pub dod_column: String,

    #[serde(default = "default_age_column")]
    pub age_column: String,

    #[serde(default = "default_cod_id_column")]
    pub cod_id_column: String,

    #[serde(default = "default_cod_cause_column")]
    pub cod_cause_column: String,

    #[serde(default = "default_cod_metadata_column")]
    pub cod_metadata_column: String,

    /// Code posted for records whose cause is `Undetermined`
    #[serde(default = "default_undetermined_code")]
    pub undetermined_code: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            new_export_file: default_new_export_file(),
            carry_over_file: default_carry_over_file(),
            cod_results_file: default_cod_results_file(),
            new_storage_file: default_new_storage_file(),
            blob_dir: default_blob_dir(),
            instance_id_column: default_instance_id_column(),
            serial_no_column: default_serial_no_column(),
            sex_column: default_sex_column(),
            dob_column: default_dob_column(),
            dod_column: default_dod_column(),
            age_column: default_age_column(),
            cod_id_column: default_cod_id_column(),
            cod_cause_column: default_cod_cause_column(),
            cod_metadata_column: default_cod_metadata_column(),
            undetermined_code: default_undetermined_code(),
        }
    }
}

impl TransferSettings {
    fn validate(&self) -> Result<(), String> {
        if self.working_dir.trim().is_empty() {
            return Err("transfer.working_dir cannot be empty".to_string());
        }
        if self.instance_id_column == self.serial_no_column {
            return Err(
                "transfer.instance_id_column and transfer.serial_no_column must differ".to_string(),
            );
        }
        if self.undetermined_code.trim().is_empty() {
            return Err("transfer.undetermined_code cannot be empty".to_string());
        }
        Ok(())
    }

    /// Resolve a configured file name against the working directory
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.working_dir).join(path)
        }
    }

    pub fn new_export_path(&self) -> PathBuf {
        self.resolve(&self.new_export_file)
    }

    pub fn carry_over_path(&self) -> PathBuf {
        self.resolve(&self.carry_over_file)
    }

    pub fn cod_results_path(&self) -> PathBuf {
        self.resolve(&self.cod_results_file)
    }

    pub fn new_storage_path(&self) -> PathBuf {
        self.resolve(&self.new_storage_file)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.resolve(&self.blob_dir)
    }

    /// Export column names feeding the typed record fields
    pub fn column_schema(&self) -> ColumnSchema {
        ColumnSchema {
            instance_id: self.instance_id_column.clone(),
            serial_no: self.serial_no_column.clone(),
            sex: self.sex_column.clone(),
            date_of_birth: self.dob_column.clone(),
            date_of_death: self.dod_column.clone(),
            age: self.age_column.clone(),
        }
    }
}

/// `[org_unit]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnitConfig {
    /// Name of the literal organisation unit column
    #[serde(default = "default_org_unit_field")]
    pub field_name: String,

    /// Column whose prefix keys the mapping table; defaults to `field_name`
    #[serde(default)]
    pub code_field: Option<String>,

    /// Literal unit used when the record carries none
    #[serde(default)]
    pub fallback: Option<String>,

    /// Number of leading characters of the code used as mapping key
    #[serde(default = "default_prefix_length")]
    pub prefix_length: usize,

    /// Inline prefix → unit id table
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// CSV mapping file with columns `code,org_unit`
    #[serde(default)]
    pub mapping_file: Option<String>,
}

impl Default for OrgUnitConfig {
    fn default() -> Self {
        Self {
            field_name: default_org_unit_field(),
            code_field: None,
            fallback: None,
            prefix_length: default_prefix_length(),
            mapping: BTreeMap::new(),
            mapping_file: None,
        }
    }
}

impl OrgUnitConfig {
    fn validate(&self) -> Result<(), String> {
        if self.field_name.trim().is_empty() {
            return Err("org_unit.field_name cannot be empty".to_string());
        }
        if self.prefix_length == 0 {
            return Err("org_unit.prefix_length must be > 0".to_string());
        }
        if let Some(fallback) = &self.fallback {
            if fallback.trim().is_empty() {
                return Err("org_unit.fallback cannot be blank when set".to_string());
            }
        }
        Ok(())
    }

    pub fn code_field(&self) -> &str {
        self.code_field.as_deref().unwrap_or(&self.field_name)
    }
}

/// `[cod]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodConfig {
    /// Cause label → destination code
    #[serde(default)]
    pub codes: HashMap<String, String>,
}

/// `[store]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,

    /// SQLCipher key; requires the `sqlcipher` build feature
    #[serde(default)]
    pub key: Option<SecretString>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            key: None,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("store.path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local JSON file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_working_dir() -> String {
    "./va-transfer".to_string()
}

fn default_new_export_file() -> String {
    "new_export.csv".to_string()
}

fn default_carry_over_file() -> String {
    "carry_over.csv".to_string()
}

fn default_cod_results_file() -> String {
    "cod_results.csv".to_string()
}

fn default_new_storage_file() -> String {
    "new_storage.csv".to_string()
}

fn default_blob_dir() -> String {
    "blobs".to_string()
}

fn default_instance_id_column() -> String {
    "meta-instanceID".to_string()
}

fn default_serial_no_column() -> String {
    "id".to_string()
}

fn default_sex_column() -> String {
    "Id10019".to_string()
}

fn default_dob_column() -> String {
    "Id10021".to_string()
}

fn default_dod_column() -> String {
    "Id10023".to_string()
}

fn default_age_column() -> String {
    "ageInYears".to_string()
}

fn default_cod_id_column() -> String {
    "ID".to_string()
}

fn default_cod_cause_column() -> String {
    "Cause".to_string()
}

fn default_cod_metadata_column() -> String {
    "Metadata".to_string()
}

fn default_undetermined_code() -> String {
    "99".to_string()
}

fn default_org_unit_field() -> String {
    "Id10057".to_string()
}

fn default_prefix_length() -> usize {
    3
}

fn default_store_path() -> String {
    "./va-transfer/transfer.db".to_string()
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn dhis_config() -> DhisConfig {
        DhisConfig {
            base_url: "https://dhis.example.org".to_string(),
            username: "admin".to_string(),
            password: secret_string("district".to_string()),
            timeout_seconds: 60,
            tls_verify: true,
            program_name: "Verbal Autopsy".to_string(),
            tracked_entity_type: None,
            stored_by: None,
            discover_org_units: false,
            attributes: AttributeMap {
                serial_no: "attrSerial01".to_string(),
                instance_id: "attrInstance".to_string(),
                sex: Some("attrSex0001".to_string()),
                date_of_birth: None,
                age: None,
            },
            data_elements: DataElementMap {
                cause_of_death: "deCause0001".to_string(),
                algorithm_metadata: "deAlgMeta01".to_string(),
                blob: "deBlob00001".to_string(),
                instance_id: None,
                age: None,
                sex: None,
            },
        }
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dhis_config_validation() {
        let config = dhis_config();
        assert!(config.validate(&Environment::Development).is_ok());
        assert!(config.validate(&Environment::Production).is_ok());
    }

    #[test]
    fn test_dhis_config_rejects_malformed_url() {
        let mut config = dhis_config();
        config.base_url = "not a url".to_string();
        assert!(config.validate(&Environment::Development).is_err());

        config.base_url = "ftp://dhis.example.org".to_string();
        assert!(config.validate(&Environment::Development).is_err());
    }

    #[test]
    fn test_dhis_config_requires_identity_attributes() {
        let mut config = dhis_config();
        config.attributes.instance_id = "".to_string();
        let err = config.validate(&Environment::Development).unwrap_err();
        assert!(err.contains("instance_id"));
    }

    #[test]
    fn test_tls_verification_in_production() {
        let mut config = dhis_config();
        config.tls_verify = false;

        let result = config.validate(&Environment::Production);
        assert!(result
            .unwrap_err()
            .contains("TLS certificate verification cannot be disabled in production"));
        assert!(config.validate(&Environment::Development).is_ok());
        assert!(config.validate(&Environment::Staging).is_ok());
    }

    #[test]
    fn test_attribute_entries() {
        let config = dhis_config();
        let entries = config.attributes.entries();
        assert_eq!(entries[0], ("serial_no", "attrSerial01"));
        assert_eq!(entries[1], ("instance_id", "attrInstance"));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_transfer_settings_resolve() {
        let settings = TransferSettings {
            working_dir: "/srv/va".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.carry_over_path(),
            PathBuf::from("/srv/va/carry_over.csv")
        );
        assert_eq!(settings.resolve("/tmp/x.csv"), PathBuf::from("/tmp/x.csv"));
    }

    #[test]
    fn test_column_schema_from_settings() {
        let settings = TransferSettings {
            serial_no_column: "sid".to_string(),
            ..Default::default()
        };
        let schema = settings.column_schema();
        assert_eq!(schema.serial_no, "sid");
        assert_eq!(schema.instance_id, "meta-instanceID");
    }

    #[test]
    fn test_org_unit_config_validation() {
        let mut config = OrgUnitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.code_field(), "Id10057");

        config.prefix_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(config.local_enabled);
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_undetermined_code(), "99");
        assert_eq!(default_instance_id_column(), "meta-instanceID");
        assert_eq!(default_prefix_length(), 3);
    }
}
