//! Post verifier
//!
//! Re-runs the entity search for every accepted record to confirm the
//! destination really holds it before an outcome is written.

use crate::adapters::dhis::DestinationServer;
use crate::core::transfer::poster::PostedRecord;
use crate::core::verification::report::{VerificationFailure, VerificationReport};
use crate::domain::TransferError;
use std::sync::Arc;
use std::time::Instant;

/// Result of a verification pass
///
/// A query failure stops the pass; `report` still holds everything
/// confirmed before it so those outcomes can be committed.
#[derive(Debug)]
pub struct VerificationRun {
    pub report: VerificationReport,
    pub interrupted: Option<TransferError>,
}

pub struct Verifier {
    server: Arc<dyn DestinationServer>,
    program_id: String,
    serial_attribute: String,
}

impl Verifier {
    pub fn new(
        server: Arc<dyn DestinationServer>,
        program_id: impl Into<String>,
        serial_attribute: impl Into<String>,
    ) -> Self {
        Self {
            server,
            program_id: program_id.into(),
            serial_attribute: serial_attribute.into(),
        }
    }

    /// Verify accepted records
    ///
    /// A record is confirmed when the search returns the entity id the
    /// destination reported; without a reported id any result confirms it.
    pub async fn verify<'a, I>(&self, posted: I) -> VerificationRun
    where
        I: IntoIterator<Item = &'a PostedRecord>,
    {
        let start = Instant::now();
        let mut report = VerificationReport::new();
        let mut interrupted = None;

        for record in posted.into_iter().filter(|r| r.accepted) {
            let found = match self
                .server
                .search_tracked_entities(
                    &self.program_id,
                    &self.serial_attribute,
                    record.serial_no.as_str(),
                )
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!(
                        instance_id = %record.instance_id,
                        error = %e,
                        "Verification query failed"
                    );
                    interrupted = Some(e);
                    break;
                }
            };

            let confirmed = match &record.tracked_entity_id {
                Some(expected) => found
                    .iter()
                    .find(|entity| entity.id.as_str() == expected)
                    .map(|entity| entity.id.to_string()),
                None => found.first().map(|entity| entity.id.to_string()),
            };

            match confirmed {
                Some(tracked_entity_id) => {
                    report.record_confirmed(record.instance_id.clone(), tracked_entity_id);
                }
                None => {
                    tracing::warn!(
                        instance_id = %record.instance_id,
                        "Accepted record not found on destination yet"
                    );
                    report.record_pending(VerificationFailure {
                        instance_id: record.instance_id.clone(),
                        tracked_entity_id: record.tracked_entity_id.clone(),
                        reason: "entity not returned by search".to_string(),
                    });
                }
            }
        }

        report.set_duration(start.elapsed().as_millis() as u64);
        tracing::info!(
            confirmed = report.confirmed,
            pending = report.pending,
            interrupted = interrupted.is_some(),
            "Verification completed"
        );
        VerificationRun {
            report,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceId, ReconcileAction, SerialNo};
    use crate::test_support::FakeServer;

    fn posted(id: &str, serial: &str, tei: Option<&str>, accepted: bool) -> PostedRecord {
        PostedRecord {
            instance_id: InstanceId::new(id).unwrap(),
            serial_no: SerialNo::new(serial).unwrap(),
            action: ReconcileAction::Create,
            accepted,
            tracked_entity_id: tei.map(str::to_string),
            event_id: None,
            blob_checksum: String::new(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_confirmed_and_pending() {
        let server = Arc::new(FakeServer::default());
        server.add_entity("tei1", &[("attrSerial01", "S1")]);
        let verifier = Verifier::new(server.clone(), "prgVA000001", "attrSerial01");

        let records = vec![
            posted("a", "S1", Some("tei1"), true),
            posted("b", "S2", Some("tei2"), true),
            posted("c", "S3", None, false),
        ];
        let run = verifier.verify(&records).await;

        assert!(run.interrupted.is_none());
        assert_eq!(run.report.confirmed, 1);
        assert_eq!(run.report.pending, 1);
        assert_eq!(server.search_count(), 2);
    }

    #[tokio::test]
    async fn test_wrong_entity_id_is_pending() {
        let server = Arc::new(FakeServer::default());
        server.add_entity("tei9", &[("attrSerial01", "S1")]);
        let verifier = Verifier::new(server, "prgVA000001", "attrSerial01");

        let run = verifier.verify(&[posted("a", "S1", Some("tei1"), true)]).await;
        assert_eq!(run.report.pending, 1);
    }

    #[tokio::test]
    async fn test_query_failure_keeps_earlier_confirmations() {
        let server = Arc::new(FakeServer::default());
        server.add_entity("tei1", &[("attrSerial01", "S1")]);
        server.fail_searches_after(1);
        let verifier = Verifier::new(server, "prgVA000001", "attrSerial01");

        let records = vec![
            posted("a", "S1", Some("tei1"), true),
            posted("b", "S2", None, true),
            posted("c", "S3", None, true),
        ];
        let run = verifier.verify(&records).await;

        assert!(run.interrupted.is_some());
        assert_eq!(run.report.confirmed, 1);
        assert_eq!(run.report.total_verified, 1);
    }
}
