//! Shared fixtures for integration tests
//!
//! `Workspace` owns a temporary working directory, its configuration and a
//! SQLite transfer store. The destination is the crate's `FakeServer`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vatransfer::adapters::sqlite::SqliteTransferStore;
use vatransfer::config::{
    ApplicationConfig, CodConfig, Environment, LoggingConfig, OrgUnitConfig, StoreConfig,
    TransferConfig, TransferSettings,
};
use vatransfer::core::ingest::export::write_rows;
use vatransfer::core::state::StateManager;
use vatransfer::core::transfer::TransferCoordinator;
use vatransfer::test_support::dhis_config;

pub use vatransfer::test_support::{FakeServer, INSTANCE_ATTR, SERIAL_ATTR};

pub const ORG_UNIT_FIELD: &str = "facility";

/// Temporary working directory with matching configuration
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn config(&self) -> TransferConfig {
        TransferConfig {
            application: ApplicationConfig::default(),
            environment: Environment::default(),
            dhis: dhis_config("http://fake.dhis"),
            transfer: TransferSettings {
                working_dir: self.dir.path().to_string_lossy().into_owned(),
                ..TransferSettings::default()
            },
            org_unit: OrgUnitConfig {
                field_name: ORG_UNIT_FIELD.to_string(),
                ..OrgUnitConfig::default()
            },
            cod: CodConfig::default(),
            store: StoreConfig {
                path: self.path("transfer.db").to_string_lossy().into_owned(),
                key: None,
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Write the new export; each row is `(instance id, serial, facility)`
    pub fn write_export(&self, rows: &[(&str, &str, &str)]) {
        write_csv(
            &self.path("new_export.csv"),
            &["meta-instanceID", "id", ORG_UNIT_FIELD],
            rows.iter().map(|(i, s, f)| vec![*i, *s, *f]),
        );
    }

    /// Write the cause-of-death results; each row is `(instance id, cause)`
    pub fn write_cod(&self, rows: &[(&str, &str)]) {
        write_csv(
            &self.path("cod_results.csv"),
            &["ID", "Cause", "Metadata"],
            rows.iter().map(|(i, c)| vec![*i, *c, "InterVA5|5.1"]),
        );
    }

    pub async fn state(&self) -> StateManager {
        let store = SqliteTransferStore::open(self.path("transfer.db"), None)
            .await
            .unwrap();
        StateManager::new(Arc::new(store))
    }

    pub async fn coordinator(&self, server: Arc<FakeServer>) -> TransferCoordinator {
        self.coordinator_with(self.config(), server).await
    }

    pub async fn coordinator_with(
        &self,
        config: TransferConfig,
        server: Arc<FakeServer>,
    ) -> TransferCoordinator {
        TransferCoordinator::new(config, self.state().await, server)
    }
}

pub fn write_csv<'a, I>(path: &Path, headers: &[&str], rows: I)
where
    I: IntoIterator<Item = Vec<&'a str>>,
{
    let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rows = rows
        .into_iter()
        .map(|r| r.into_iter().map(str::to_string).collect::<Vec<_>>());
    write_rows(path, &headers, rows).unwrap();
}
