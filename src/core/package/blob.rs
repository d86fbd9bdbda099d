//! Blob packager
//!
//! Each posted record travels with a small SQLite file holding its
//! attributes as entity-attribute-value rows. The file is uploaded as a DHIS2
//! file resource and referenced from the event.

use super::checksum::calculate_file_checksum;
use crate::domain::{CauseAssignment, Result, TransferError, VaRecord};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

const EAV_SCHEMA: &str = "CREATE TABLE EAV (
    ID INTEGER PRIMARY KEY,
    Entity TEXT,
    Attribute TEXT,
    Value TEXT
)";

/// A packaged record on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPackage {
    pub path: PathBuf,
    /// Hex SHA-256 of the file
    pub checksum: String,
}

/// Writes record blobs into one directory
#[derive(Debug, Clone)]
pub struct BlobPackager {
    dir: PathBuf,
}

impl BlobPackager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for a record
    pub fn blob_path(&self, record: &VaRecord) -> PathBuf {
        self.dir
            .join(format!("{}.db", record.instance_id.file_stem()))
    }

    /// Write the blob for `record`, replacing any earlier one
    ///
    /// # Errors
    ///
    /// Returns a local I/O error if the directory or file cannot be written.
    pub async fn package(&self, record: &VaRecord) -> Result<BlobPackage> {
        let path = self.blob_path(record);
        let rows = eav_rows(record);
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || write_blob(&dir, path, rows))
            .await
            .map_err(|e| TransferError::Other(format!("Blob task failed: {e}")))?
    }
}

fn eav_rows(record: &VaRecord) -> Vec<(String, String, String)> {
    let entity = record.instance_id.to_string();
    let mut pairs = record.attribute_pairs();
    match &record.cause {
        CauseAssignment::Assigned { label, code } => {
            pairs.push(("cause".to_string(), label.clone()));
            pairs.push(("cause_code".to_string(), code.clone()));
        }
        CauseAssignment::Undetermined => {
            pairs.push(("cause".to_string(), "Undetermined".to_string()));
        }
        CauseAssignment::Missing => {}
    }
    if let Some(metadata) = &record.algorithm_metadata {
        pairs.push(("algorithm_metadata".to_string(), metadata.as_str().to_string()));
    }

    pairs
        .into_iter()
        .map(|(attribute, value)| (entity.clone(), attribute, value))
        .collect()
}

fn write_blob(dir: &Path, path: PathBuf, rows: Vec<(String, String, String)>) -> Result<BlobPackage> {
    std::fs::create_dir_all(dir).map_err(|e| {
        TransferError::Io(format!("Failed to create blob directory {}: {}", dir.display(), e))
    })?;
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| {
            TransferError::Io(format!("Failed to replace blob {}: {}", path.display(), e))
        })?;
    }

    let blob_error =
        |e: rusqlite::Error| TransferError::Io(format!("Failed to write blob {}: {}", path.display(), e));
    {
        let mut conn = Connection::open(&path).map_err(blob_error)?;
        let tx = conn.transaction().map_err(blob_error)?;
        tx.execute(EAV_SCHEMA, []).map_err(blob_error)?;
        {
            let mut insert = tx
                .prepare("INSERT INTO EAV (Entity, Attribute, Value) VALUES (?1, ?2, ?3)")
                .map_err(blob_error)?;
            for (entity, attribute, value) in &rows {
                insert
                    .execute(params![entity, attribute, value])
                    .map_err(blob_error)?;
            }
        }
        tx.commit().map_err(blob_error)?;
    }

    let checksum = calculate_file_checksum(&path)?;
    tracing::debug!(path = %path.display(), rows = rows.len(), checksum = %checksum, "Packaged blob");
    Ok(BlobPackage { path, checksum })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_package_writes_eav_rows() {
        let dir = TempDir::new().unwrap();
        let packager = BlobPackager::new(dir.path().join("blobs"));
        let mut r = record("uuid:1/a", "S1", &[("Id10057", "Bo")]);
        r.cause = CauseAssignment::Assigned {
            label: "Malaria".to_string(),
            code: "01.06".to_string(),
        };

        let package = packager.package(&r).await.unwrap();
        assert_eq!(package.path, dir.path().join("blobs").join("uuid_1_a.db"));
        assert_eq!(package.checksum.len(), 64);

        let conn = Connection::open(&package.path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM EAV WHERE Entity = 'uuid:1/a'", [], |row| row.get(0))
            .unwrap();
        // instance_id, serial_no, Id10057, cause, cause_code
        assert_eq!(count, 5);
        let code: String = conn
            .query_row("SELECT Value FROM EAV WHERE Attribute = 'cause_code'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(code, "01.06");
    }

    #[tokio::test]
    async fn test_package_replaces_existing_blob() {
        let dir = TempDir::new().unwrap();
        let packager = BlobPackager::new(dir.path());
        let r = record("uuid:2", "S2", &[]);

        let first = packager.package(&r).await.unwrap();
        let second = packager.package(&r).await.unwrap();
        assert_eq!(first.path, second.path);

        let conn = Connection::open(&second.path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM EAV", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
