//! Duplicate filter
//!
//! Drops every record the store already knows, either as a recorded outcome
//! or as a quarantined record, and rewrites the working file without them.

use super::export::write_batch;
use crate::core::state::StateManager;
use crate::domain::{ColumnSchema, Result, VaBatch};
use std::path::Path;

/// Counters of one duplicate-filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub received: usize,
    pub duplicates_removed: usize,
    pub forwarded: usize,
}

/// Remove already-transferred and quarantined records from `batch`
///
/// Appends one `Warning` event per removed record, then writes the filtered
/// batch to `working_file`. Running it twice on the same batch removes
/// nothing the second time.
///
/// # Errors
///
/// Returns a store error if the identifier sets cannot be read and a local
/// I/O error if the working file cannot be written.
pub async fn filter_duplicates(
    batch: &mut VaBatch,
    state: &StateManager,
    working_file: &Path,
    schema: &ColumnSchema,
) -> Result<DedupReport> {
    let received = batch.len();
    let known = state.known_identifiers().await?;

    let removed = batch.retain_partition(|record| !known.contains(&record.instance_id));
    for record in &removed {
        state
            .warning(format!(
                "Record {} was already transferred or quarantined; skipped",
                record.instance_id
            ))
            .await?;
    }

    write_batch(working_file, batch, schema)?;

    let report = DedupReport {
        received,
        duplicates_removed: removed.len(),
        forwarded: batch.len(),
    };
    tracing::info!(
        received = report.received,
        duplicates_removed = report.duplicates_removed,
        forwarded = report.forwarded,
        "Filtered duplicates"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteTransferStore;
    use crate::domain::{DestinationIds, OrgUnitId, OutcomeLabel, VaRecord};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn batch(ids: &[&str]) -> VaBatch {
        let headers = vec!["meta-instanceID".to_string(), "id".to_string()];
        let records = ids
            .iter()
            .map(|id| {
                VaRecord::from_row(
                    &headers,
                    &[id.to_string(), format!("S-{id}")],
                    &ColumnSchema::default(),
                )
                .unwrap()
            })
            .collect();
        VaBatch::new(headers, records)
    }

    #[tokio::test]
    async fn test_filter_removes_outcomes_and_quarantine() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTransferStore::open(dir.path().join("t.db"), None)
            .await
            .unwrap();
        let state = StateManager::new(Arc::new(store));
        let mut working = batch(&["a", "b", "c"]);

        state
            .record_outcome(
                &working.records[0],
                OutcomeLabel::Pushed,
                &OrgUnitId::new("ou1").unwrap(),
                &DestinationIds::default(),
            )
            .await
            .unwrap();
        state.quarantine(&working.records[1], "").await.unwrap();

        let file = dir.path().join("carry_over.csv");
        let report = filter_duplicates(&mut working, &state, &file, &ColumnSchema::default())
            .await
            .unwrap();

        assert_eq!(
            report,
            DedupReport {
                received: 3,
                duplicates_removed: 2,
                forwarded: 1
            }
        );
        assert_eq!(working.records[0].instance_id.as_str(), "c");

        let warnings = state.store().recent_events(10).await.unwrap();
        assert_eq!(warnings.len(), 2);

        let again = filter_duplicates(&mut working, &state, &file, &ColumnSchema::default())
            .await
            .unwrap();
        assert_eq!(again.duplicates_removed, 0);
        assert_eq!(again.forwarded, 1);
    }
}
