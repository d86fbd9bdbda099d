//! Quarantine repair
//!
//! Releases a quarantined record back into the pipeline. The record is
//! appended to the carry-over before it leaves quarantine, so an interrupted
//! repair can simply be repeated.

use crate::core::ingest::append_to_carry_over;
use crate::core::state::StateManager;
use crate::domain::{ColumnSchema, InstanceId, OrgUnitId, Result, TransferError, VaRecord};
use std::path::Path;

/// Where the repaired record's organisation unit is written
#[derive(Debug, Clone, Copy)]
pub struct RepairTarget<'a> {
    pub carry_over: &'a Path,
    pub schema: &'a ColumnSchema,
    /// Column receiving an explicit unit
    pub org_unit_field: &'a str,
}

/// Move `id` from quarantine back to the carry-over file
///
/// When `org_unit` is given it is written into the record first; otherwise
/// the record is retried as-is, e.g. after the mapping table was fixed.
///
/// # Errors
///
/// Returns a validation error if `id` is not quarantined, and passes through
/// store and file errors.
pub async fn repair_quarantined(
    state: &StateManager,
    target: RepairTarget<'_>,
    id: &InstanceId,
    org_unit: Option<&OrgUnitId>,
) -> Result<VaRecord> {
    let quarantined = state
        .store()
        .get_unresolved(id)
        .await?
        .ok_or_else(|| TransferError::Validation(format!("Record {id} is not quarantined")))?;

    let mut record: VaRecord = serde_json::from_str(&quarantined.record)?;
    if let Some(org_unit) = org_unit {
        record.set_extra(target.org_unit_field, org_unit.as_str());
    }

    append_to_carry_over(target.carry_over, vec![record.clone()], target.schema)?;
    state.store().remove_unresolved(id).await?;

    let detail = match org_unit {
        Some(org_unit) => format!(" with organisation unit {org_unit}"),
        None => String::new(),
    };
    state
        .event(format!(
            "Record {id} released from quarantine{detail} (was '{}')",
            quarantined.raw_org_unit
        ))
        .await?;
    Ok(record)
}
