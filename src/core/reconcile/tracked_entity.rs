//! Tracked-entity reconciliation
//!
//! Decides whether a record creates a new tracked entity or updates an
//! existing one, and builds the payload either way.

use crate::adapters::dhis::DestinationServer;
use crate::config::{AttributeMap, DataElementMap, DhisConfig};
use crate::domain::{
    AttributeValue, Enrollment, Event, ExistingTrackedEntity, OrgUnitId, Program, Result,
    TrackedEntityPayload, TransferError, VaRecord,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

const COMPLETED: &str = "COMPLETED";

/// Pick the entity a record should update
///
/// The first entity carrying the record's instance id wins; otherwise the
/// first entity returned by the server.
pub fn select_match<'a>(
    entities: &'a [ExistingTrackedEntity],
    instance_id: &str,
) -> Option<&'a ExistingTrackedEntity> {
    entities
        .iter()
        .find(|entity| entity.has_value(instance_id))
        .or_else(|| entities.first())
}

/// Builds create or update payloads for records
pub struct TrackedEntityReconciler {
    server: Arc<dyn DestinationServer>,
    program: Program,
    program_stage: String,
    tracked_entity_type: String,
    attributes: AttributeMap,
    data_elements: DataElementMap,
    stored_by: Option<String>,
    undetermined_code: String,
}

impl TrackedEntityReconciler {
    /// # Errors
    ///
    /// Returns a configuration error if the program has no stages or no
    /// tracked entity type is known.
    pub fn new(
        server: Arc<dyn DestinationServer>,
        program: Program,
        config: &DhisConfig,
        undetermined_code: impl Into<String>,
    ) -> Result<Self> {
        let program_stage = program
            .first_stage()
            .map(str::to_string)
            .ok_or_else(|| {
                TransferError::Configuration(format!(
                    "Program '{}' has no program stages",
                    program.name
                ))
            })?;

        let tracked_entity_type = config
            .tracked_entity_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| program.tracked_entity_type.clone());
        if tracked_entity_type.is_empty() {
            return Err(TransferError::Configuration(format!(
                "No tracked entity type configured and program '{}' declares none",
                program.name
            )));
        }

        Ok(Self {
            server,
            program,
            program_stage,
            tracked_entity_type,
            attributes: config.attributes.clone(),
            data_elements: config.data_elements.clone(),
            stored_by: config.stored_by.clone(),
            undetermined_code: undetermined_code.into(),
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Build the payload for one record under `org_unit`
    ///
    /// # Errors
    ///
    /// Passes through any destination failure of the entity search.
    pub async fn reconcile(
        &self,
        record: &VaRecord,
        org_unit: &OrgUnitId,
    ) -> Result<TrackedEntityPayload> {
        let matches = self
            .server
            .search_tracked_entities(
                &self.program.id,
                &self.attributes.serial_no,
                record.serial_no.as_str(),
            )
            .await?;

        let matched = select_match(&matches, record.instance_id.as_str());
        let payload = self.build_payload(record, org_unit, matched);

        tracing::debug!(
            instance_id = %record.instance_id,
            serial_no = %record.serial_no,
            candidates = matches.len(),
            action = %payload.action(),
            "Reconciled tracked entity"
        );
        Ok(payload)
    }

    fn build_payload(
        &self,
        record: &VaRecord,
        org_unit: &OrgUnitId,
        matched: Option<&ExistingTrackedEntity>,
    ) -> TrackedEntityPayload {
        let attributes = self
            .attributes
            .entries()
            .into_iter()
            .map(|(logical, uid)| {
                let value = match matched {
                    Some(entity) => entity.attribute(uid).unwrap_or_default().to_string(),
                    None => local_attribute(record, logical).unwrap_or_default().to_string(),
                };
                AttributeValue::new(uid, value)
            })
            .collect();

        let event_date = event_date(record);
        let event = Event {
            program: self.program.id.clone(),
            program_stage: self.program_stage.clone(),
            org_unit: org_unit.clone(),
            event_date: event_date.clone(),
            status: COMPLETED.to_string(),
            stored_by: self.stored_by.clone(),
            data_values: Vec::new(),
        };
        let mut payload = TrackedEntityPayload {
            tracked_entity_instance: matched.map(|entity| entity.id.clone()),
            tracked_entity_type: self.tracked_entity_type.clone(),
            org_unit: org_unit.clone(),
            attributes,
            enrollments: vec![Enrollment {
                program: self.program.id.clone(),
                org_unit: org_unit.clone(),
                enrollment_date: event_date.clone(),
                incident_date: event_date,
                status: COMPLETED.to_string(),
                events: vec![event],
            }],
        };

        if let Some(event) = payload.event_mut() {
            self.fill_data_values(event, record);
        }
        payload
    }

    fn fill_data_values(&self, event: &mut Event, record: &VaRecord) {
        let elements = &self.data_elements;
        if let Some(code) = record.cause.posted_code(&self.undetermined_code) {
            event.set_data_value(&elements.cause_of_death, code);
        }
        if let Some(metadata) = &record.algorithm_metadata {
            event.set_data_value(&elements.algorithm_metadata, metadata.as_str());
        }
        if let Some(uid) = &elements.instance_id {
            event.set_data_value(uid, record.instance_id.as_str());
        }
        if let (Some(uid), Some(age)) = (&elements.age, &record.age) {
            event.set_data_value(uid, age.as_str());
        }
        if let (Some(uid), Some(sex)) = (&elements.sex, &record.sex) {
            event.set_data_value(uid, sex.as_str());
        }
    }
}

fn local_attribute<'a>(record: &'a VaRecord, logical: &str) -> Option<&'a str> {
    match logical {
        "serial_no" => Some(record.serial_no.as_str()),
        "instance_id" => Some(record.instance_id.as_str()),
        "sex" => record.sex.as_deref(),
        "date_of_birth" => record.date_of_birth.as_deref(),
        "age" => record.age.as_deref(),
        _ => None,
    }
}

/// Date of death as `YYYY-MM-DD`, or today when absent or unparseable
fn event_date(record: &VaRecord) -> String {
    record
        .date_of_death
        .as_deref()
        .and_then(|raw| raw.get(..10))
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive())
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CauseAssignment, ColumnSchema, ReconcileAction, SubmissionResult, TrackedEntityId,
    };
    use async_trait::async_trait;
    use std::path::Path;

    struct StaticServer {
        entities: Vec<ExistingTrackedEntity>,
    }

    #[async_trait]
    impl DestinationServer for StaticServer {
        async fn find_program(&self, _name: &str) -> Result<Program> {
            unreachable!()
        }
        async fn list_org_units(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn search_tracked_entities(
            &self,
            _program_id: &str,
            _attribute: &str,
            _value: &str,
        ) -> Result<Vec<ExistingTrackedEntity>> {
            Ok(self.entities.clone())
        }
        async fn upload_file_resource(&self, _path: &Path) -> Result<String> {
            unreachable!()
        }
        async fn submit_tracked_entities(
            &self,
            _payloads: &[TrackedEntityPayload],
        ) -> Result<SubmissionResult> {
            unreachable!()
        }
        fn base_url(&self) -> &str {
            "http://static"
        }
    }

    fn entity(id: &str, serial: &str, instance: &str) -> ExistingTrackedEntity {
        ExistingTrackedEntity {
            id: TrackedEntityId::new(id).unwrap(),
            org_unit: Some("ouOld000001".to_string()),
            attributes: vec![
                AttributeValue::new("attrSerial01", serial),
                AttributeValue::new("attrInstance", instance),
            ],
        }
    }

    fn dhis_config() -> DhisConfig {
        crate::test_support::dhis_config("http://static")
    }

    fn program() -> Program {
        Program {
            id: "prgVA000001".to_string(),
            name: "Verbal Autopsy".to_string(),
            tracked_entity_type: "tetPerson01".to_string(),
            program_stages: vec!["stgCoD00001".to_string()],
        }
    }

    fn record() -> VaRecord {
        let headers: Vec<String> = ["meta-instanceID", "id", "Id10019", "Id10023"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let values: Vec<String> = ["uuid:1", "S1", "female", "2024-02-29T10:00:00"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut record = VaRecord::from_row(&headers, &values, &ColumnSchema::default()).unwrap();
        record.cause = CauseAssignment::Assigned {
            label: "Malaria".to_string(),
            code: "01.06".to_string(),
        };
        record
    }

    fn reconciler(entities: Vec<ExistingTrackedEntity>) -> TrackedEntityReconciler {
        TrackedEntityReconciler::new(
            Arc::new(StaticServer { entities }),
            program(),
            &dhis_config(),
            "99",
        )
        .unwrap()
    }

    #[test]
    fn test_select_match_prefers_instance_id() {
        let entities = vec![entity("tei1", "S1", "uuid:9"), entity("tei2", "S1", "uuid:1")];
        assert_eq!(select_match(&entities, "uuid:1").unwrap().id.as_str(), "tei2");
        assert_eq!(select_match(&entities, "uuid:5").unwrap().id.as_str(), "tei1");
        assert!(select_match(&[], "uuid:1").is_none());
    }

    #[tokio::test]
    async fn test_no_match_creates_from_local_values() {
        let ou = OrgUnitId::new("ouKenema001").unwrap();
        let payload = reconciler(vec![]).reconcile(&record(), &ou).await.unwrap();

        assert_eq!(payload.action(), ReconcileAction::Create);
        assert_eq!(payload.tracked_entity_type, "tetPerson01");
        assert_eq!(payload.attribute("attrSerial01"), Some("S1"));
        assert_eq!(payload.attribute("attrInstance"), Some("uuid:1"));

        let event = payload.event().unwrap();
        assert_eq!(event.event_date, "2024-02-29");
        assert_eq!(event.program_stage, "stgCoD00001");
        assert_eq!(event.data_value("deCause0001"), Some("01.06"));
        assert_eq!(event.org_unit, ou);
    }

    #[tokio::test]
    async fn test_match_updates_with_server_attributes() {
        let mut existing = entity("tei2", "S1", "uuid:1");
        existing.attributes.retain(|a| a.attribute != "attrInstance");
        let payload = reconciler(vec![existing])
            .reconcile(&record(), &OrgUnitId::new("ouKenema001").unwrap())
            .await
            .unwrap();

        assert_eq!(payload.action(), ReconcileAction::Update);
        assert_eq!(
            payload.tracked_entity_instance.as_ref().map(|t| t.as_str()),
            Some("tei2")
        );
        assert_eq!(payload.attribute("attrInstance"), Some(""));
    }

    #[tokio::test]
    async fn test_undetermined_posts_configured_code() {
        let mut r = record();
        r.cause = CauseAssignment::Undetermined;
        let payload = reconciler(vec![])
            .reconcile(&r, &OrgUnitId::new("ou1").unwrap())
            .await
            .unwrap();
        assert_eq!(payload.event().unwrap().data_value("deCause0001"), Some("99"));
    }

    #[test]
    fn test_program_without_stages_is_configuration_error() {
        let mut p = program();
        p.program_stages.clear();
        let err = TrackedEntityReconciler::new(
            Arc::new(StaticServer { entities: vec![] }),
            p,
            &dhis_config(),
            "99",
        )
        .err()
        .unwrap();
        assert!(matches!(err, TransferError::Configuration(_)));
    }

    #[test]
    fn test_event_date_falls_back_to_today() {
        let mut r = record();
        r.date_of_death = Some("unknown".to_string());
        assert_eq!(event_date(&r), Utc::now().date_naive().format("%Y-%m-%d").to_string());
    }
}
