//! Test fixtures shared by unit and integration tests
//!
//! [`FakeServer`] stands in for a DHIS2 server. Created entities become
//! searchable, every call is counted, and searches, uploads and submissions
//! can be made to fail.

use crate::adapters::dhis::DestinationServer;
use crate::config::{secret_string, AttributeMap, DataElementMap, DhisConfig};
use crate::domain::{
    AttributeValue, DhisError, ExistingTrackedEntity, ImportStatus, ImportSummary, Program,
    Result, SubmissionResult, TrackedEntityId, TrackedEntityPayload, TransferError,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const SERIAL_ATTR: &str = "attrSerial01";
pub const INSTANCE_ATTR: &str = "attrInstance";

/// Destination settings matching [`FakeServer`]'s program
pub fn dhis_config(base_url: &str) -> DhisConfig {
    DhisConfig {
        base_url: base_url.to_string(),
        username: "admin".to_string(),
        password: secret_string("district".to_string()),
        timeout_seconds: 5,
        tls_verify: true,
        program_name: "Verbal Autopsy".to_string(),
        tracked_entity_type: None,
        stored_by: None,
        discover_org_units: false,
        attributes: AttributeMap {
            serial_no: SERIAL_ATTR.to_string(),
            instance_id: INSTANCE_ATTR.to_string(),
            sex: None,
            date_of_birth: None,
            age: None,
        },
        data_elements: DataElementMap {
            cause_of_death: "deCause0001".to_string(),
            algorithm_metadata: "deAlgMeta01".to_string(),
            blob: "deBlob00001".to_string(),
            instance_id: None,
            age: None,
            sex: None,
        },
    }
}

/// Record with the default schema and the given extra columns
#[cfg(test)]
pub(crate) fn record(
    instance_id: &str,
    serial_no: &str,
    extra: &[(&str, &str)],
) -> crate::domain::VaRecord {
    let mut headers = vec!["meta-instanceID".to_string(), "id".to_string()];
    let mut values = vec![instance_id.to_string(), serial_no.to_string()];
    for (h, v) in extra {
        headers.push(h.to_string());
        values.push(v.to_string());
    }
    crate::domain::VaRecord::from_row(&headers, &values, &crate::domain::ColumnSchema::default())
        .unwrap_or_else(|e| panic!("invalid test record: {e}"))
}

/// In-memory destination server
#[derive(Default)]
pub struct FakeServer {
    entities: Mutex<Vec<ExistingTrackedEntity>>,
    org_units: Mutex<Vec<String>>,
    rejected_serials: Mutex<HashSet<String>>,
    submissions: Mutex<Vec<Vec<TrackedEntityPayload>>>,
    calls: AtomicUsize,
    created: AtomicUsize,
    uploads: AtomicUsize,
    searches: AtomicUsize,
    fail_searches_after: Mutex<Option<usize>>,
    fail_uploads_after: Mutex<Option<usize>>,
    fail_submissions: AtomicBool,
    hide_created: AtomicBool,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a searchable entity; blank ids are ignored
    pub fn add_entity(&self, id: &str, attributes: &[(&str, &str)]) {
        let Ok(id) = TrackedEntityId::new(id) else {
            return;
        };
        lock(&self.entities).push(ExistingTrackedEntity {
            id,
            org_unit: None,
            attributes: attributes
                .iter()
                .map(|(a, v)| AttributeValue::new(*a, *v))
                .collect(),
        });
    }

    pub fn set_org_units(&self, ids: &[&str]) {
        *lock(&self.org_units) = ids.iter().map(|s| s.to_string()).collect();
    }

    /// Submissions carrying this attribute value get an `ERROR` summary
    pub fn reject_serial(&self, serial: &str) {
        lock(&self.rejected_serials).insert(serial.to_string());
    }

    /// Searches beyond the first `n` answer 500
    pub fn fail_searches_after(&self, n: usize) {
        *lock(&self.fail_searches_after) = Some(n);
    }

    /// Uploads beyond the first `n` answer 503
    pub fn fail_uploads_after(&self, n: usize) {
        *lock(&self.fail_uploads_after) = Some(n);
    }

    /// Every batch submission answers 500
    pub fn fail_submissions(&self) {
        self.fail_submissions.store(true, Ordering::SeqCst);
    }

    /// Lift every injected failure
    pub fn heal(&self) {
        *lock(&self.fail_searches_after) = None;
        *lock(&self.fail_uploads_after) = None;
        self.fail_submissions.store(false, Ordering::SeqCst);
    }

    /// Created entities are accepted but never returned by search
    pub fn hide_created_entities(&self) {
        self.hide_created.store(true, Ordering::SeqCst);
    }

    /// Every call made through [`DestinationServer`]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Successful submissions, one entry per batch
    pub fn submissions(&self) -> Vec<Vec<TrackedEntityPayload>> {
        lock(&self.submissions).clone()
    }

    /// All payloads across every successful submission
    pub fn payloads(&self) -> Vec<TrackedEntityPayload> {
        self.submissions().into_iter().flatten().collect()
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn beyond(limit: &Mutex<Option<usize>>, count: usize) -> bool {
    (*lock(limit)).is_some_and(|limit| count > limit)
}

#[async_trait]
impl DestinationServer for FakeServer {
    async fn find_program(&self, name: &str) -> Result<Program> {
        self.count();
        Ok(Program {
            id: "prgVA000001".to_string(),
            name: name.to_string(),
            tracked_entity_type: "tetPerson01".to_string(),
            program_stages: vec!["stgCoD00001".to_string()],
        })
    }

    async fn list_org_units(&self) -> Result<Vec<String>> {
        self.count();
        Ok(lock(&self.org_units).clone())
    }

    async fn search_tracked_entities(
        &self,
        _program_id: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<ExistingTrackedEntity>> {
        self.count();
        let count = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        if beyond(&self.fail_searches_after, count) {
            return Err(DhisError::QueryFailed {
                status: 500,
                message: "search unavailable".to_string(),
            }
            .into());
        }
        Ok(lock(&self.entities)
            .iter()
            .filter(|e| e.attribute(attribute) == Some(value))
            .cloned()
            .collect())
    }

    async fn upload_file_resource(&self, path: &Path) -> Result<String> {
        self.count();
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if beyond(&self.fail_uploads_after, n) {
            return Err(DhisError::UploadFailed {
                status: 503,
                message: "file store unavailable".to_string(),
            }
            .into());
        }
        if !path.exists() {
            return Err(DhisError::UploadFailed {
                status: 400,
                message: format!("{} missing", path.display()),
            }
            .into());
        }
        Ok(format!("fileRes{n:04}"))
    }

    async fn submit_tracked_entities(
        &self,
        payloads: &[TrackedEntityPayload],
    ) -> Result<SubmissionResult> {
        self.count();
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(DhisError::SubmissionFailed {
                status: 500,
                message: "Internal Server Error".to_string(),
            }
            .into());
        }
        lock(&self.submissions).push(payloads.to_vec());
        let rejected = lock(&self.rejected_serials).clone();
        let mut result = SubmissionResult::default();

        for (index, payload) in payloads.iter().enumerate() {
            let serial_rejected = payload
                .attributes
                .iter()
                .any(|a| rejected.contains(&a.value));
            if serial_rejected {
                result.ignored += 1;
                result.summaries.push(ImportSummary {
                    status: ImportStatus::Error,
                    reference: None,
                    event_reference: None,
                    description: Some("Value not unique".to_string()),
                });
                continue;
            }

            let mut entities = lock(&self.entities);
            let id = match &payload.tracked_entity_instance {
                Some(id) => {
                    if let Some(existing) = entities.iter_mut().find(|e| &e.id == id) {
                        existing.attributes = payload.attributes.clone();
                    }
                    result.updated += 1;
                    id.clone()
                }
                None => {
                    let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                    let id = TrackedEntityId::new(format!("teiNew{n:05}"))
                        .map_err(TransferError::Validation)?;
                    if !self.hide_created.load(Ordering::SeqCst) {
                        entities.push(ExistingTrackedEntity {
                            id: id.clone(),
                            org_unit: Some(payload.org_unit.to_string()),
                            attributes: payload.attributes.clone(),
                        });
                    }
                    result.imported += 1;
                    id
                }
            };
            result.summaries.push(ImportSummary {
                status: ImportStatus::Success,
                reference: Some(id.to_string()),
                event_reference: Some(format!("evt{index:05}")),
                description: None,
            });
        }
        Ok(result)
    }

    fn base_url(&self) -> &str {
        "http://fake.dhis"
    }
}
