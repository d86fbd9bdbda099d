//! State manager for the transfer store
//!
//! Wraps a [`TransferStore`] so every durable write is mirrored in the
//! operational log and the event log helpers read naturally at call sites.

use crate::adapters::database::traits::TransferStore;
use crate::core::state::watermark::RunWatermark;
use crate::domain::{
    DestinationIds, EventCategory, InstanceId, OrgUnitId, OutcomeLabel, Result, VaRecord,
};
use std::collections::HashSet;
use std::sync::Arc;

/// State manager for outcome, quarantine and event persistence
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn TransferStore>,
}

impl StateManager {
    /// Create a new StateManager with a store backend
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// Underlying store, for read-only queries
    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    /// Identifiers that must never be forwarded again
    ///
    /// The union of recorded outcomes and quarantined records.
    pub async fn known_identifiers(&self) -> Result<HashSet<InstanceId>> {
        let mut ids = self.store.list_outcome_identifiers().await?;
        ids.extend(self.store.list_unresolved_identifiers().await?);
        Ok(ids)
    }

    /// Persist the terminal outcome of a record
    ///
    /// Returns `false` when the record already had an outcome.
    pub async fn record_outcome(
        &self,
        record: &VaRecord,
        outcome: OutcomeLabel,
        org_unit: &OrgUnitId,
        destination_ids: &DestinationIds,
    ) -> Result<bool> {
        let inserted = self
            .store
            .record_outcome(record, outcome, org_unit, destination_ids)
            .await?;

        if inserted {
            tracing::debug!(
                instance_id = %record.instance_id,
                outcome = %outcome,
                org_unit = %org_unit,
                "Recorded outcome"
            );
        } else {
            tracing::debug!(
                instance_id = %record.instance_id,
                "Outcome already recorded, keeping original"
            );
        }
        Ok(inserted)
    }

    /// Move a record whose organisation unit could not be resolved to quarantine
    pub async fn quarantine(&self, record: &VaRecord, raw_value: &str) -> Result<bool> {
        let inserted = self
            .store
            .record_unresolved_org_unit(record, raw_value)
            .await?;
        if inserted {
            tracing::warn!(
                instance_id = %record.instance_id,
                raw_org_unit = %raw_value,
                "Record quarantined: organisation unit unresolved"
            );
        }
        Ok(inserted)
    }

    pub async fn event(&self, description: impl AsRef<str>) -> Result<()> {
        self.append(description.as_ref(), EventCategory::Event).await
    }

    pub async fn warning(&self, description: impl AsRef<str>) -> Result<()> {
        self.append(description.as_ref(), EventCategory::Warning)
            .await
    }

    pub async fn error(&self, description: impl AsRef<str>) -> Result<()> {
        self.append(description.as_ref(), EventCategory::Error).await
    }

    pub async fn summary(&self, description: impl AsRef<str>) -> Result<()> {
        self.append(description.as_ref(), EventCategory::Summary)
            .await
    }

    async fn append(&self, description: &str, category: EventCategory) -> Result<()> {
        match category {
            EventCategory::Error => tracing::error!(category = %category, "{description}"),
            EventCategory::Warning => tracing::warn!(category = %category, "{description}"),
            _ => tracing::info!(category = %category, "{description}"),
        }
        self.store.append_event(description, category).await
    }

    /// Save run bookkeeping
    ///
    /// Watermarks are advisory; a failure here is logged and swallowed.
    pub async fn checkpoint_run(&self, watermark: &RunWatermark) {
        tracing::debug!(
            run_id = %watermark.run_id,
            status = %watermark.status,
            records_pushed = watermark.records_pushed,
            "Checkpointing run"
        );
        if let Err(e) = self.store.save_run_watermark(watermark).await {
            tracing::warn!(run_id = %watermark.run_id, error = %e, "Failed to save run watermark");
        }
    }
}
