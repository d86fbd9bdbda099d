//! New-storage file
//!
//! Every record that went through a run is written here with its original
//! columns followed by the destination ids, the checksum of the uploaded blob
//! and the outcome. The commit step reads the file back and persists terminal
//! outcomes. A run that stops after writing the file leaves it behind, and the
//! next run commits it before merging.

use crate::core::ingest::export::{read_raw, write_rows};
use crate::core::state::StateManager;
use crate::domain::{
    ColumnSchema, DestinationIds, OrgUnitId, OutcomeLabel, Result, TransferError, VaRecord,
};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DESTINATION_ID_COLUMN: &str = "destination_id";
pub const EVENT_ID_COLUMN: &str = "destination_event_id";
pub const ORG_UNIT_COLUMN: &str = "destination_org_unit";
pub const BLOB_CHECKSUM_COLUMN: &str = "blob_sha256";
pub const OUTCOME_COLUMN: &str = "outcome";

const TRAILER: [&str; 5] = [
    DESTINATION_ID_COLUMN,
    EVENT_ID_COLUMN,
    ORG_UNIT_COLUMN,
    BLOB_CHECKSUM_COLUMN,
    OUTCOME_COLUMN,
];

/// Outcome column value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Outcome(OutcomeLabel),
    /// Accepted by the destination but not yet confirmed
    Pending,
}

impl StorageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageStatus::Outcome(label) => label.as_str(),
            StorageStatus::Pending => "pending",
        }
    }

    /// Whether the commit step persists this status
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            StorageStatus::Outcome(
                OutcomeLabel::Pushed | OutcomeLabel::Error | OutcomeLabel::NoCauseAssigned
            )
        )
    }
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StorageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim() == "pending" {
            return Ok(StorageStatus::Pending);
        }
        s.parse::<OutcomeLabel>().map(StorageStatus::Outcome)
    }
}

/// One row of the new-storage file
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEntry {
    pub record: VaRecord,
    pub org_unit: OrgUnitId,
    pub ids: DestinationIds,
    /// SHA-256 of the blob uploaded for the record, if one was
    pub blob_checksum: Option<String>,
    pub status: StorageStatus,
}

/// Writer for the new-storage file
pub struct StorageFile;

impl StorageFile {
    /// Write all entries, replacing the file
    pub fn write(
        path: &Path,
        headers: &[String],
        entries: &[StorageEntry],
        schema: &ColumnSchema,
    ) -> Result<()> {
        let mut all_headers = headers.to_vec();
        all_headers.extend(TRAILER.iter().map(|h| h.to_string()));

        let rows = entries.iter().map(|entry| {
            let mut row = entry.record.to_row(headers, schema);
            row.push(entry.ids.tracked_entity_id.clone().unwrap_or_default());
            row.push(entry.ids.event_id.clone().unwrap_or_default());
            row.push(entry.org_unit.to_string());
            row.push(entry.blob_checksum.clone().unwrap_or_default());
            row.push(entry.status.to_string());
            row
        });
        write_rows(path, &all_headers, rows)?;

        tracing::debug!(path = %path.display(), rows = entries.len(), "Wrote new-storage file");
        Ok(())
    }
}

/// Counters of one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Outcome rows inserted
    pub committed: usize,
    /// Rows whose record already had an outcome
    pub already_recorded: usize,
    /// Quarantined and pending rows
    pub skipped: usize,
    /// Rows that could not be parsed or written
    pub failed: usize,
}

/// Persist the terminal outcomes listed in a new-storage file
///
/// Rows are committed one by one; a failing row is logged and the rest are
/// still written.
///
/// # Errors
///
/// Returns a local I/O error if the file cannot be read or lacks the trailer
/// columns.
pub async fn commit_storage_file(
    path: &Path,
    state: &StateManager,
    schema: &ColumnSchema,
) -> Result<CommitReport> {
    let raw = read_raw(path)?;
    let split = raw.headers.len().checked_sub(TRAILER.len()).ok_or_else(|| {
        TransferError::Io(format!("{} is not a new-storage file", path.display()))
    })?;
    if raw.headers[split..] != TRAILER {
        return Err(TransferError::Io(format!(
            "{} is missing the destination columns",
            path.display()
        )));
    }
    let record_headers = &raw.headers[..split];

    let mut report = CommitReport::default();
    for (index, row) in raw.rows.iter().enumerate() {
        match commit_row(record_headers, row, split, state, schema).await {
            Ok(Some(true)) => report.committed += 1,
            Ok(Some(false)) => report.already_recorded += 1,
            Ok(None) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                tracing::error!(row = index + 1, error = %e, "Failed to commit outcome");
            }
        }
    }

    tracing::info!(
        committed = report.committed,
        already_recorded = report.already_recorded,
        skipped = report.skipped,
        failed = report.failed,
        "Committed new-storage file"
    );
    Ok(report)
}

/// `None` when the row is not committed, otherwise whether it was inserted
async fn commit_row(
    headers: &[String],
    row: &[String],
    split: usize,
    state: &StateManager,
    schema: &ColumnSchema,
) -> Result<Option<bool>> {
    let status: StorageStatus = row[split + 4].parse().map_err(TransferError::Validation)?;
    let label = match status {
        StorageStatus::Outcome(label) if status.is_committed() => label,
        _ => return Ok(None),
    };

    let record =
        VaRecord::from_row(headers, &row[..split], schema).map_err(TransferError::Validation)?;
    let org_unit = OrgUnitId::new(row[split + 2].as_str()).map_err(TransferError::Validation)?;
    let ids = DestinationIds {
        tracked_entity_id: non_empty(&row[split]),
        event_id: non_empty(&row[split + 1]),
    };

    state.record_outcome(&record, label, &org_unit, &ids).await.map(Some)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
