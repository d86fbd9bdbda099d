//! Tracked entity payloads and destination-side entity views
//!
//! The payload types serialize directly into the DHIS2 tracker JSON shape
//! (`trackedEntityInstances` → `enrollments` → `events` → `dataValues`).

use super::ids::{OrgUnitId, TrackedEntityId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracker program the records are enrolled into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub tracked_entity_type: String,
    /// Program stage ids in server order; events go to the first one
    pub program_stages: Vec<String>,
}

impl Program {
    pub fn first_stage(&self) -> Option<&str> {
        self.program_stages.first().map(String::as_str)
    }
}

/// One attribute value, used for both payloads and search results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub attribute: String,
    pub value: String,
}

impl AttributeValue {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// An entity already present on the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingTrackedEntity {
    pub id: TrackedEntityId,
    pub org_unit: Option<String>,
    pub attributes: Vec<AttributeValue>,
}

impl ExistingTrackedEntity {
    /// Value of an attribute by destination UID
    pub fn attribute(&self, uid: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute == uid)
            .map(|a| a.value.as_str())
    }

    /// Whether any attribute carries exactly `value`
    pub fn has_value(&self, value: &str) -> bool {
        self.attributes.iter().any(|a| a.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub data_element: String,
    pub value: String,
}

impl DataValue {
    pub fn new(data_element: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_element: data_element.into(),
            value: value.into(),
        }
    }
}

/// Event carrying the cause-of-death data values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub program: String,
    pub program_stage: String,
    pub org_unit: OrgUnitId,
    pub event_date: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_by: Option<String>,
    pub data_values: Vec<DataValue>,
}

impl Event {
    /// Set a data value, replacing an existing one for the same element
    pub fn set_data_value(&mut self, data_element: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .data_values
            .iter_mut()
            .find(|dv| dv.data_element == data_element)
        {
            Some(dv) => dv.value = value,
            None => self.data_values.push(DataValue::new(data_element, value)),
        }
    }

    pub fn data_value(&self, data_element: &str) -> Option<&str> {
        self.data_values
            .iter()
            .find(|dv| dv.data_element == data_element)
            .map(|dv| dv.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub program: String,
    pub org_unit: OrgUnitId,
    pub enrollment_date: String,
    pub incident_date: String,
    pub status: String,
    pub events: Vec<Event>,
}

/// Create or update request for one tracked entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityPayload {
    /// Absent for a create, present for an update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_entity_instance: Option<TrackedEntityId>,
    pub tracked_entity_type: String,
    pub org_unit: OrgUnitId,
    pub attributes: Vec<AttributeValue>,
    pub enrollments: Vec<Enrollment>,
}

impl TrackedEntityPayload {
    pub fn action(&self) -> ReconcileAction {
        if self.tracked_entity_instance.is_some() {
            ReconcileAction::Update
        } else {
            ReconcileAction::Create
        }
    }

    /// The single event of the single enrollment
    pub fn event(&self) -> Option<&Event> {
        self.enrollments.first().and_then(|e| e.events.first())
    }

    pub fn event_mut(&mut self) -> Option<&mut Event> {
        self.enrollments
            .first_mut()
            .and_then(|e| e.events.first_mut())
    }

    pub fn attribute(&self, uid: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute == uid)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    Create,
    Update,
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::Create => write!(f, "create"),
            ReconcileAction::Update => write!(f, "update"),
        }
    }
}

/// Per-item status reported by the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Success,
    Warning,
    Error,
}

impl ImportStatus {
    /// Parse a DHIS2 status string; unknown values count as errors
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" | "OK" => ImportStatus::Success,
            "WARNING" => ImportStatus::Warning,
            _ => ImportStatus::Error,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, ImportStatus::Success | ImportStatus::Warning)
    }
}

/// Per-item result of a batch submission, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub status: ImportStatus,
    pub reference: Option<String>,
    pub event_reference: Option<String>,
    pub description: Option<String>,
}

/// Whole-batch result of a submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionResult {
    pub imported: usize,
    pub updated: usize,
    pub ignored: usize,
    pub summaries: Vec<ImportSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: Option<&str>) -> TrackedEntityPayload {
        let ou = OrgUnitId::new("ou1").unwrap();
        TrackedEntityPayload {
            tracked_entity_instance: id.map(|i| TrackedEntityId::new(i).unwrap()),
            tracked_entity_type: "tet1".to_string(),
            org_unit: ou.clone(),
            attributes: vec![AttributeValue::new("attrSerial", "S1")],
            enrollments: vec![Enrollment {
                program: "prog1".to_string(),
                org_unit: ou.clone(),
                enrollment_date: "2024-01-01".to_string(),
                incident_date: "2024-01-01".to_string(),
                status: "COMPLETED".to_string(),
                events: vec![Event {
                    program: "prog1".to_string(),
                    program_stage: "stage1".to_string(),
                    org_unit: ou,
                    event_date: "2024-01-01".to_string(),
                    status: "COMPLETED".to_string(),
                    stored_by: None,
                    data_values: vec![],
                }],
            }],
        }
    }

    #[test]
    fn test_create_payload_omits_entity_id() {
        let json = serde_json::to_value(payload(None)).unwrap();
        assert!(json.get("trackedEntityInstance").is_none());
        assert_eq!(json["orgUnit"], "ou1");
        assert_eq!(json["enrollments"][0]["events"][0]["programStage"], "stage1");
        assert_eq!(payload(None).action(), ReconcileAction::Create);
    }

    #[test]
    fn test_update_payload_carries_entity_id() {
        let p = payload(Some("tei9"));
        assert_eq!(p.action(), ReconcileAction::Update);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["trackedEntityInstance"], "tei9");
    }

    #[test]
    fn test_set_data_value_replaces() {
        let mut p = payload(None);
        let event = p.event_mut().unwrap();
        event.set_data_value("deBlob", "file1");
        event.set_data_value("deBlob", "file2");
        assert_eq!(event.data_values.len(), 1);
        assert_eq!(p.event().unwrap().data_value("deBlob"), Some("file2"));
    }

    #[test]
    fn test_import_status_parse() {
        assert!(ImportStatus::parse("SUCCESS").is_accepted());
        assert!(ImportStatus::parse("warning").is_accepted());
        assert!(!ImportStatus::parse("ERROR").is_accepted());
        assert!(!ImportStatus::parse("something").is_accepted());
    }
}
