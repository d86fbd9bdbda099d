//! DHIS2 Web API response models
//!
//! These structs mirror the JSON the server returns and are converted into
//! domain types at the adapter boundary.

use crate::domain::{
    AttributeValue, DhisError, ExistingTrackedEntity, ImportStatus, ImportSummary, Program,
    SubmissionResult, TrackedEntityId, TrackedEntityPayload,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramsResponse {
    #[serde(default)]
    pub programs: Vec<ProgramDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracked_entity_type: Option<IdRef>,
    #[serde(default)]
    pub program_stages: Vec<IdRef>,
}

impl ProgramDto {
    pub fn into_domain(self) -> Program {
        Program {
            id: self.id,
            name: self.name,
            tracked_entity_type: self
                .tracked_entity_type
                .map(|t| t.id)
                .unwrap_or_default(),
            program_stages: self.program_stages.into_iter().map(|s| s.id).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationUnitsResponse {
    #[serde(default)]
    pub organisation_units: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntitySearchResponse {
    #[serde(default)]
    pub tracked_entity_instances: Vec<TrackedEntityDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityDto {
    pub tracked_entity_instance: String,
    #[serde(default)]
    pub org_unit: Option<String>,
    #[serde(default)]
    pub attributes: Vec<TrackedEntityAttributeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityAttributeDto {
    pub attribute: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl TrackedEntityDto {
    pub fn into_domain(self) -> Result<ExistingTrackedEntity, DhisError> {
        let id = TrackedEntityId::new(self.tracked_entity_instance)
            .map_err(DhisError::InvalidResponse)?;
        Ok(ExistingTrackedEntity {
            id,
            org_unit: self.org_unit,
            attributes: self
                .attributes
                .into_iter()
                .map(|a| AttributeValue::new(a.attribute, a.value.unwrap_or_default()))
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResourceResponse {
    pub response: FileResourceEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResourceEnvelope {
    pub file_resource: IdRef,
}

/// Request body of a batch submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityBatch<'a> {
    pub tracked_entity_instances: &'a [TrackedEntityPayload],
}

/// `importSummaries` container; nests for enrollments and events
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummariesDto {
    #[serde(default)]
    pub imported: usize,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub ignored: usize,
    #[serde(default)]
    pub import_summaries: Vec<ImportSummaryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummaryDto {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enrollments: Option<Box<ImportSummariesDto>>,
    #[serde(default)]
    pub events: Option<Box<ImportSummariesDto>>,
}

impl ImportSummaryDto {
    /// Reference of the first event of the first enrollment
    fn event_reference(&self) -> Option<String> {
        let enrollment = self.enrollments.as_ref()?.import_summaries.first()?;
        let event = enrollment.events.as_ref()?.import_summaries.first()?;
        event.reference.clone()
    }

    fn into_domain(self) -> ImportSummary {
        let event_reference = self.event_reference();
        ImportSummary {
            status: ImportStatus::parse(&self.status),
            reference: self.reference,
            event_reference,
            description: self.description,
        }
    }
}

impl ImportSummariesDto {
    /// Parse a submission response body
    ///
    /// Newer servers wrap the summaries in a `response` envelope; older ones
    /// return them at the top level.
    pub fn from_body(body: &serde_json::Value) -> Result<Self, DhisError> {
        let inner = body.get("response").unwrap_or(body);
        serde_json::from_value(inner.clone())
            .map_err(|e| DhisError::InvalidResponse(format!("Unreadable import summary: {e}")))
    }

    pub fn into_domain(self) -> SubmissionResult {
        SubmissionResult {
            imported: self.imported,
            updated: self.updated,
            ignored: self.ignored,
            summaries: self
                .import_summaries
                .into_iter()
                .map(ImportSummaryDto::into_domain)
                .collect(),
        }
    }
}
