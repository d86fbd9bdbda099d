//! Transfer store trait
//!
//! The store is the durable memory of the pipeline. Its outcome and
//! quarantine tables drive de-duplication; its event table is the audit log.

use crate::core::state::watermark::RunWatermark;
use crate::domain::{
    DestinationIds, EventCategory, EventLogEntry, InstanceId, OrgUnitId, OutcomeLabel,
    QuarantineRecord, Result, VaRecord,
};
use async_trait::async_trait;
use std::collections::HashSet;

/// Durable transfer state
///
/// Every write is its own transaction, so a failure on one record never
/// rolls back another.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert an outcome row for a record
    ///
    /// Outcome rows are immutable; a second call for the same identifier is
    /// ignored and returns `Ok(false)`.
    async fn record_outcome(
        &self,
        record: &VaRecord,
        outcome: OutcomeLabel,
        org_unit: &OrgUnitId,
        destination_ids: &DestinationIds,
    ) -> Result<bool>;

    /// Quarantine a record whose organisation unit could not be resolved
    ///
    /// Returns `Ok(false)` if the record was already quarantined.
    async fn record_unresolved_org_unit(&self, record: &VaRecord, raw_value: &str)
        -> Result<bool>;

    /// Identifiers with an outcome row
    async fn list_outcome_identifiers(&self) -> Result<HashSet<InstanceId>>;

    /// Identifiers currently in quarantine
    async fn list_unresolved_identifiers(&self) -> Result<HashSet<InstanceId>>;

    /// Remove a record from quarantine, returning whether it was present
    async fn remove_unresolved(&self, id: &InstanceId) -> Result<bool>;

    /// Append an entry to the audit log
    async fn append_event(&self, description: &str, category: EventCategory) -> Result<()>;

    /// Load one quarantined record
    async fn get_unresolved(&self, id: &InstanceId) -> Result<Option<QuarantineRecord>>;

    /// All quarantined records, oldest first
    async fn list_unresolved(&self) -> Result<Vec<QuarantineRecord>>;

    /// Number of outcome rows per label
    async fn outcome_counts(&self) -> Result<Vec<(OutcomeLabel, u64)>>;

    /// Most recent audit log entries, newest first
    async fn recent_events(&self, limit: usize) -> Result<Vec<EventLogEntry>>;

    /// Insert or update the bookkeeping row of a run
    async fn save_run_watermark(&self, watermark: &RunWatermark) -> Result<()>;

    /// Bookkeeping row of the most recently started run
    async fn load_last_run(&self) -> Result<Option<RunWatermark>>;
}
