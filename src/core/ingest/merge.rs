//! Export merger
//!
//! Folds the latest raw export into the carry-over from earlier runs. The
//! merged batch replaces the carry-over file before the raw export is
//! deleted, so a crash between the two steps loses nothing.

use super::export::{parse_rows, read_raw, write_batch, RawExport, RejectedRow};
use crate::domain::{ColumnSchema, InstanceId, Result, TransferError, VaBatch, VaRecord};
use std::collections::HashMap;
use std::path::Path;

/// Result of [`merge_exports`]
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The working set to process this run
    Merged(VaBatch),
    /// Neither input held a valid record
    NoNewRecords,
}

/// Counters of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub carry_over_rows: usize,
    pub new_export_rows: usize,
    /// Records in the merged batch
    pub merged: usize,
    /// Rows folded into an earlier row with the same instance id
    pub collapsed: usize,
    /// Rows rejected for a missing instance id or serial number
    pub rejected: Vec<String>,
}

/// Merge the new export with the carry-over
///
/// Rows sharing an instance id collapse into the first position; the later
/// row's values win. Headers are the union of both files with carry-over
/// columns first.
///
/// # Errors
///
/// Returns a local I/O error if an existing input cannot be read, or if the
/// carry-over cannot be written or the new export removed.
pub fn merge_exports(
    new_export: &Path,
    carry_over: &Path,
    schema: &ColumnSchema,
) -> Result<(MergeOutcome, MergeReport)> {
    let mut report = MergeReport::default();
    let mut merger = BatchMerger::default();

    if carry_over.exists() {
        let raw = read_raw(carry_over)?;
        report.carry_over_rows = raw.rows.len();
        merger.absorb(&raw, schema, "carry-over", &mut report);
    }

    let new_export_present = new_export.exists();
    if new_export_present {
        let raw = read_raw(new_export)?;
        report.new_export_rows = raw.rows.len();
        merger.absorb(&raw, schema, "new export", &mut report);
    } else {
        tracing::info!(path = %new_export.display(), "No new export file");
    }

    let batch = merger.finish();
    report.merged = batch.len();

    if !batch.is_empty() {
        write_batch(carry_over, &batch, schema)?;
    }
    if new_export_present {
        std::fs::remove_file(new_export).map_err(|e| {
            TransferError::Io(format!(
                "Failed to remove merged export {}: {}",
                new_export.display(),
                e
            ))
        })?;
    }

    tracing::info!(
        carry_over_rows = report.carry_over_rows,
        new_export_rows = report.new_export_rows,
        merged = report.merged,
        collapsed = report.collapsed,
        rejected = report.rejected.len(),
        "Merged exports"
    );

    if batch.is_empty() {
        Ok((MergeOutcome::NoNewRecords, report))
    } else {
        Ok((MergeOutcome::Merged(batch), report))
    }
}

/// Add repaired records to the carry-over file
///
/// Records replace any carry-over row with the same instance id; columns the
/// carry-over lacks are appended to its header.
///
/// # Errors
///
/// Returns a local I/O error if the carry-over cannot be read or written.
pub fn append_to_carry_over(
    carry_over: &Path,
    records: Vec<VaRecord>,
    schema: &ColumnSchema,
) -> Result<usize> {
    let mut report = MergeReport::default();
    let mut merger = BatchMerger::default();
    if carry_over.exists() {
        merger.absorb(&read_raw(carry_over)?, schema, "carry-over", &mut report);
    }

    let added = records.len();
    for record in records {
        merger.absorb_record(record, schema);
    }
    let batch = merger.finish();
    write_batch(carry_over, &batch, schema)?;

    tracing::info!(
        path = %carry_over.display(),
        added,
        total = batch.len(),
        "Appended records to carry-over"
    );
    Ok(added)
}

#[derive(Default)]
struct BatchMerger {
    headers: Vec<String>,
    records: Vec<VaRecord>,
    positions: HashMap<InstanceId, usize>,
}

impl BatchMerger {
    fn absorb(
        &mut self,
        raw: &RawExport,
        schema: &ColumnSchema,
        source: &str,
        report: &mut MergeReport,
    ) {
        for header in &raw.headers {
            if !self.headers.contains(header) {
                self.headers.push(header.clone());
            }
        }

        let (records, rejected) = parse_rows(raw, schema);
        for RejectedRow { row, reason } in rejected {
            tracing::warn!(source, row, reason = %reason, "Rejected export row");
            report
                .rejected
                .push(format!("Rejected {source} row {row}: {reason}"));
        }

        for record in records {
            match self.positions.get(&record.instance_id) {
                Some(&index) => {
                    overlay(&mut self.records[index], record);
                    report.collapsed += 1;
                }
                None => {
                    self.positions
                        .insert(record.instance_id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
    }

    fn absorb_record(&mut self, record: VaRecord, schema: &ColumnSchema) {
        let typed = [
            &schema.instance_id,
            &schema.serial_no,
            &schema.sex,
            &schema.date_of_birth,
            &schema.date_of_death,
            &schema.age,
        ];
        let columns: Vec<String> = typed
            .into_iter()
            .filter(|c| record.field(c, schema).is_some())
            .cloned()
            .chain(record.extra.keys().cloned())
            .collect();
        for column in columns {
            if !self.headers.contains(&column) {
                self.headers.push(column);
            }
        }

        match self.positions.get(&record.instance_id) {
            Some(&index) => overlay(&mut self.records[index], record),
            None => {
                self.positions
                    .insert(record.instance_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn finish(self) -> VaBatch {
        VaBatch::new(self.headers, self.records)
    }
}

/// Replace `older`'s values with `newer`'s, keeping columns `newer` lacks
/// and any carried cause `newer` has none of
fn overlay(older: &mut VaRecord, newer: VaRecord) {
    let VaRecord {
        serial_no,
        sex,
        date_of_birth,
        date_of_death,
        age,
        cause,
        algorithm_metadata,
        extra,
        ..
    } = newer;
    if !cause.is_missing() {
        older.cause = cause;
        older.algorithm_metadata = algorithm_metadata;
    }
    older.serial_no = serial_no;
    older.sex = sex;
    older.date_of_birth = date_of_birth;
    older.date_of_death = date_of_death;
    older.age = age;
    older.extra.extend(extra);
}
