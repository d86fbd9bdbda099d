//! Export CSV files
//!
//! Raw exports, the carry-over file and the repair path all share one
//! header-row CSV layout. Writes go to a sibling temporary file that is then
//! renamed over the target, so a crash never leaves a half-written export.

use crate::domain::{ColumnSchema, Result, TransferError, VaBatch, VaRecord};
use std::fs;
use std::path::Path;

/// Header row and data rows of one export file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExport {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A data row that could not become a [`VaRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based data row number within its file
    pub row: usize,
    pub reason: String,
}

/// Read an export file
///
/// Short rows are padded with empty values so every row lines up with the
/// header.
///
/// # Errors
///
/// Returns a local I/O error if the file cannot be opened or is not valid CSV.
pub fn read_raw(path: &Path) -> Result<RawExport> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| TransferError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "Read export file");
    Ok(RawExport { headers, rows })
}

/// Convert raw rows into records, collecting the rows that fail validation
pub fn parse_rows(raw: &RawExport, schema: &ColumnSchema) -> (Vec<VaRecord>, Vec<RejectedRow>) {
    let mut records = Vec::with_capacity(raw.rows.len());
    let mut rejected = Vec::new();

    for (index, row) in raw.rows.iter().enumerate() {
        match VaRecord::from_row(&raw.headers, row, schema) {
            Ok(record) => records.push(record),
            Err(reason) => rejected.push(RejectedRow {
                row: index + 1,
                reason,
            }),
        }
    }
    (records, rejected)
}

/// Read an export file straight into a batch
///
/// Used for files this crate wrote itself; duplicate ids keep the first row.
pub fn read_batch(path: &Path, schema: &ColumnSchema) -> Result<(VaBatch, Vec<RejectedRow>)> {
    let raw = read_raw(path)?;
    let (records, rejected) = parse_rows(&raw, schema);

    let mut seen = std::collections::HashSet::new();
    let records = records
        .into_iter()
        .filter(|r| seen.insert(r.instance_id.clone()))
        .collect();

    Ok((VaBatch::new(raw.headers, records), rejected))
}

/// Write a batch with its header row, replacing the file
///
/// Joined causes travel in trailing carried-cause columns so a record that
/// is retried later keeps them.
pub fn write_batch(path: &Path, batch: &VaBatch, schema: &ColumnSchema) -> Result<()> {
    let headers = batch.write_headers();
    let rows = batch.records.iter().map(|r| r.to_row(&headers, schema));
    write_rows(path, &headers, rows)
}

/// Write a header row and data rows atomically
pub fn write_rows<I>(path: &Path, headers: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                TransferError::Io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| {
            TransferError::Io(format!("Failed to create {}: {}", tmp.display(), e))
        })?;
        writer.write_record(headers)?;
        for row in rows {
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path).map_err(|e| {
        TransferError::Io(format!(
            "Failed to replace {} with {}: {}",
            path.display(),
            tmp.display(),
            e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_raw_pads_short_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "export.csv", "meta-instanceID,id,Id10057\nuuid:1,S1\n");

        let raw = read_raw(&path).unwrap();
        assert_eq!(raw.headers, vec!["meta-instanceID", "id", "Id10057"]);
        assert_eq!(raw.rows[0], vec!["uuid:1", "S1", ""]);
    }

    #[test]
    fn test_parse_rows_rejects_rows_without_serial() {
        let raw = RawExport {
            headers: vec!["meta-instanceID".to_string(), "id".to_string()],
            rows: vec![
                vec!["uuid:1".to_string(), "S1".to_string()],
                vec!["uuid:2".to_string(), "".to_string()],
            ],
        };

        let (records, rejected) = parse_rows(&raw, &ColumnSchema::default());
        assert_eq!(records.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].row, 2);
    }

    #[test]
    fn test_write_then_read_batch() {
        let dir = TempDir::new().unwrap();
        let schema = ColumnSchema::default();
        let path = write_file(
            &dir,
            "in.csv",
            "meta-instanceID,id,Id10057\nuuid:1,S1,\"Bo, East\"\nuuid:2,S2,Kenema\n",
        );
        let (batch, rejected) = read_batch(&path, &schema).unwrap();
        assert!(rejected.is_empty());

        let out = dir.path().join("nested").join("out.csv");
        write_batch(&out, &batch, &schema).unwrap();

        let (reread, _) = read_batch(&out, &schema).unwrap();
        assert_eq!(reread, batch);
        assert!(!out.with_extension("csv.tmp").exists());
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_raw(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
