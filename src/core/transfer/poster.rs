//! Destination poster
//!
//! Uploads each record's blob, wires the file resource into the event and
//! submits the whole batch in one request.

use crate::adapters::dhis::DestinationServer;
use crate::core::package::BlobPackager;
use crate::domain::{
    ImportStatus, InstanceId, ReconcileAction, Result, SerialNo, TrackedEntityPayload, VaRecord,
};
use std::sync::Arc;

/// What the destination said about one submitted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedRecord {
    pub instance_id: InstanceId,
    pub serial_no: SerialNo,
    pub action: ReconcileAction,
    pub accepted: bool,
    pub tracked_entity_id: Option<String>,
    pub event_id: Option<String>,
    pub blob_checksum: String,
    /// Server message for rejected records
    pub description: Option<String>,
}

/// Result of one batch submission, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReport {
    pub records: Vec<PostedRecord>,
    pub accepted: usize,
    pub rejected: usize,
    /// Server-side import counters
    pub imported: usize,
    pub updated: usize,
    pub ignored: usize,
}

impl PostReport {
    pub fn accepted_records(&self) -> impl Iterator<Item = &PostedRecord> {
        self.records.iter().filter(|r| r.accepted)
    }
}

pub struct DestinationPoster {
    server: Arc<dyn DestinationServer>,
    packager: BlobPackager,
    blob_data_element: String,
}

impl DestinationPoster {
    pub fn new(
        server: Arc<dyn DestinationServer>,
        packager: BlobPackager,
        blob_data_element: impl Into<String>,
    ) -> Self {
        Self {
            server,
            packager,
            blob_data_element: blob_data_element.into(),
        }
    }

    /// Post every `(record, payload)` pair
    ///
    /// Blobs are uploaded first, one per record, then all payloads go out in
    /// a single submission. Import summaries are matched to records by
    /// position; a record without a summary counts as rejected.
    ///
    /// # Errors
    ///
    /// Fails on the first packaging, upload or submission error. Nothing is
    /// submitted if any upload fails.
    pub async fn post(&self, items: Vec<(VaRecord, TrackedEntityPayload)>) -> Result<PostReport> {
        if items.is_empty() {
            return Ok(PostReport::default());
        }

        let mut records = Vec::with_capacity(items.len());
        let mut payloads = Vec::with_capacity(items.len());
        let mut checksums = Vec::with_capacity(items.len());

        for (record, mut payload) in items {
            let blob = self.packager.package(&record).await?;
            let file_resource = self.server.upload_file_resource(&blob.path).await?;
            tracing::debug!(
                instance_id = %record.instance_id,
                file_resource = %file_resource,
                checksum = %blob.checksum,
                "Uploaded blob"
            );
            if let Some(event) = payload.event_mut() {
                event.set_data_value(&self.blob_data_element, file_resource);
            }
            checksums.push(blob.checksum);
            records.push(record);
            payloads.push(payload);
        }

        tracing::info!(
            count = payloads.len(),
            server = %self.server.base_url(),
            "Submitting tracked entities"
        );
        let result = self.server.submit_tracked_entities(&payloads).await?;

        if result.summaries.len() != payloads.len() {
            tracing::warn!(
                submitted = payloads.len(),
                summaries = result.summaries.len(),
                "Import summary count differs from submission"
            );
        }

        let mut report = PostReport {
            imported: result.imported,
            updated: result.updated,
            ignored: result.ignored,
            ..PostReport::default()
        };

        for (index, ((record, payload), checksum)) in records
            .into_iter()
            .zip(payloads.iter())
            .zip(checksums)
            .enumerate()
        {
            let summary = result.summaries.get(index);
            let accepted = summary.map_or(false, |s| s.status.is_accepted());
            let tracked_entity_id = summary
                .and_then(|s| s.reference.clone())
                .or_else(|| {
                    payload
                        .tracked_entity_instance
                        .as_ref()
                        .map(|id| id.to_string())
                });
            let description = match summary {
                Some(s) if s.status == ImportStatus::Error => s
                    .description
                    .clone()
                    .or_else(|| Some("rejected by destination".to_string())),
                Some(_) => None,
                None => Some("no import summary returned".to_string()),
            };

            if accepted {
                report.accepted += 1;
            } else {
                report.rejected += 1;
                tracing::warn!(
                    instance_id = %record.instance_id,
                    reason = description.as_deref().unwrap_or_default(),
                    "Destination rejected record"
                );
            }

            report.records.push(PostedRecord {
                instance_id: record.instance_id,
                serial_no: record.serial_no,
                action: payload.action(),
                accepted,
                tracked_entity_id,
                event_id: summary.and_then(|s| s.event_reference.clone()),
                blob_checksum: checksum,
                description,
            });
        }

        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected,
            imported = report.imported,
            updated = report.updated,
            "Batch submitted"
        );
        Ok(report)
    }
}
