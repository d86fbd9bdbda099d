//! Cause-of-death results
//!
//! The external algorithm step writes one row per record it processed. The
//! join classifies every record once; later stages only read
//! [`CauseAssignment`].

use super::export::read_raw;
use crate::config::TransferSettings;
use crate::domain::{
    AlgorithmMetadata, CauseAssignment, InstanceId, Result, TransferError, VaBatch,
};
use std::collections::HashMap;
use std::path::Path;

/// One row of the results file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodResult {
    pub cause: String,
    pub metadata: Option<AlgorithmMetadata>,
}

/// Counters of the cause-of-death join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodReport {
    pub assigned: usize,
    pub undetermined: usize,
    pub missing: usize,
}

/// Read the cause-of-death results file, keyed by instance id
///
/// # Errors
///
/// Returns a local I/O error if the file is absent, unreadable or lacks the
/// id or cause column.
pub fn read_cod_results(
    path: &Path,
    settings: &TransferSettings,
) -> Result<HashMap<InstanceId, CodResult>> {
    if !path.exists() {
        return Err(TransferError::Io(format!(
            "Cause-of-death results file {} not found",
            path.display()
        )));
    }
    let raw = read_raw(path)?;

    let column = |name: &str| {
        raw.headers.iter().position(|h| h == name).ok_or_else(|| {
            TransferError::Io(format!(
                "Cause-of-death results file {} has no '{}' column",
                path.display(),
                name
            ))
        })
    };
    let id_col = column(&settings.cod_id_column)?;
    let cause_col = column(&settings.cod_cause_column)?;
    let metadata_col = raw
        .headers
        .iter()
        .position(|h| h == &settings.cod_metadata_column);

    let mut results = HashMap::with_capacity(raw.rows.len());
    for row in &raw.rows {
        let Ok(id) = InstanceId::new(row[id_col].as_str()) else {
            tracing::warn!(path = %path.display(), "Skipping cause-of-death row without id");
            continue;
        };
        let metadata = metadata_col.and_then(|c| AlgorithmMetadata::new(row[c].as_str()));
        results.insert(
            id,
            CodResult {
                cause: row[cause_col].clone(),
                metadata,
            },
        );
    }

    tracing::debug!(rows = results.len(), "Read cause-of-death results");
    Ok(results)
}

/// Attach causes to every record in the batch
///
/// A record absent from `results` keeps the cause it carried over from an
/// earlier run, re-mapped against `codes`, and is otherwise
/// [`CauseAssignment::Missing`].
pub fn apply_cod_results(
    batch: &mut VaBatch,
    results: &HashMap<InstanceId, CodResult>,
    codes: &HashMap<String, String>,
) -> CodReport {
    let mut report = CodReport::default();

    for record in &mut batch.records {
        match results.get(&record.instance_id) {
            Some(result) => {
                record.cause = CauseAssignment::from_label(&result.cause, codes);
                record.algorithm_metadata = result.metadata.clone();
            }
            None => {
                record.cause = record.cause.remapped(codes);
                if record.cause.is_missing() {
                    record.algorithm_metadata = None;
                }
            }
        }

        match record.cause {
            CauseAssignment::Assigned { .. } => report.assigned += 1,
            CauseAssignment::Undetermined => report.undetermined += 1,
            CauseAssignment::Missing => report.missing += 1,
        }
    }

    tracing::info!(
        assigned = report.assigned,
        undetermined = report.undetermined,
        missing = report.missing,
        "Joined cause-of-death results"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnSchema, VaRecord};
    use tempfile::TempDir;
    use test_case::test_case;

    fn batch(ids: &[&str]) -> VaBatch {
        let headers = vec!["meta-instanceID".to_string(), "id".to_string()];
        let records = ids
            .iter()
            .map(|id| {
                VaRecord::from_row(
                    &headers,
                    &[id.to_string(), "S".to_string()],
                    &ColumnSchema::default(),
                )
                .unwrap()
            })
            .collect();
        VaBatch::new(headers, records)
    }

    #[test]
    fn test_read_and_apply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cod.csv");
        std::fs::write(
            &path,
            "ID,Cause,Metadata\n\
             a,Malaria,InterVA5|5.0|InterVA|5|2016 WHO Verbal Autopsy Form|v1_4_1\n\
             b,Undetermined,\n\
             c,MISSING,\n",
        )
        .unwrap();

        let results = read_cod_results(&path, &TransferSettings::default()).unwrap();
        assert_eq!(results.len(), 3);

        let mut working = batch(&["a", "b", "c", "d"]);
        let mut codes = HashMap::new();
        codes.insert("Malaria".to_string(), "01.06".to_string());
        let report = apply_cod_results(&mut working, &results, &codes);

        assert_eq!(
            report,
            CodReport {
                assigned: 1,
                undetermined: 1,
                missing: 2
            }
        );
        assert_eq!(working.records[0].cause.posted_code("99"), Some("01.06"));
        assert_eq!(
            working.records[0]
                .algorithm_metadata
                .as_ref()
                .map(|m| m.algorithm()),
            Some("InterVA5")
        );
        assert!(working.records[3].cause.is_missing());
    }

    #[test]
    fn test_carried_cause_kept_when_absent_from_results() {
        let mut working = batch(&["repaired", "fresh"]);
        working.records[0].cause = CauseAssignment::Assigned {
            label: "Malaria".to_string(),
            code: "Malaria".to_string(),
        };
        working.records[0].algorithm_metadata = AlgorithmMetadata::new("InterVA5|5.1");

        let mut results = HashMap::new();
        results.insert(
            InstanceId::new("fresh").unwrap(),
            CodResult {
                cause: "Stroke".to_string(),
                metadata: None,
            },
        );
        let mut codes = HashMap::new();
        codes.insert("Malaria".to_string(), "01.06".to_string());

        let report = apply_cod_results(&mut working, &results, &codes);

        assert_eq!(report.assigned, 2);
        assert_eq!(report.missing, 0);
        assert_eq!(working.records[0].cause.posted_code("99"), Some("01.06"));
        assert!(working.records[0].algorithm_metadata.is_some());
    }

    #[test]
    fn test_results_row_overrides_carried_cause() {
        let mut working = batch(&["a"]);
        working.records[0].cause = CauseAssignment::Undetermined;

        let mut results = HashMap::new();
        results.insert(
            InstanceId::new("a").unwrap(),
            CodResult {
                cause: "Stroke".to_string(),
                metadata: None,
            },
        );
        apply_cod_results(&mut working, &results, &HashMap::new());

        assert_eq!(working.records[0].cause.label(), Some("Stroke"));
    }

    #[test]
    fn test_missing_results_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_cod_results(&dir.path().join("none.csv"), &TransferSettings::default())
            .unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn test_results_file_without_cause_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cod.csv");
        std::fs::write(&path, "ID,Metadata\na,x\n").unwrap();
        assert!(read_cod_results(&path, &TransferSettings::default()).is_err());
    }

    #[test_case("" => true ; "blank")]
    #[test_case("missing" => true ; "lowercase sentinel")]
    #[test_case("MISSING" => true ; "uppercase sentinel")]
    #[test_case("undetermined" => false ; "undetermined")]
    #[test_case("Stroke" => false ; "assigned")]
    fn test_cause_is_missing(label: &str) -> bool {
        CauseAssignment::from_label(label, &HashMap::new()).is_missing()
    }
}
