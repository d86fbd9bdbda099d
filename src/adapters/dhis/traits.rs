//! Destination server trait
//!
//! Abstracts the DHIS2 Web API so the reconciler, poster and verifier can run
//! against an in-memory server in tests.

use crate::domain::{ExistingTrackedEntity, Program, Result, SubmissionResult, TrackedEntityPayload};
use async_trait::async_trait;
use std::path::Path;

/// Operations the pipeline needs from the destination server
///
/// Implementations must map HTTP 401/403 to
/// [`DhisError::AuthenticationFailed`](crate::domain::DhisError::AuthenticationFailed)
/// and any other non-2xx status to the matching delivery error.
#[async_trait]
pub trait DestinationServer: Send + Sync {
    /// Find the single program with this name
    ///
    /// # Errors
    ///
    /// `ProgramNotFound` when nothing matches, `AmbiguousProgram` when more
    /// than one program matches.
    async fn find_program(&self, name: &str) -> Result<Program>;

    /// Identifiers of every organisation unit on the server
    async fn list_org_units(&self) -> Result<Vec<String>>;

    /// Entities in `program` whose `attribute` equals `value`, in any
    /// organisation unit
    async fn search_tracked_entities(
        &self,
        program_id: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<ExistingTrackedEntity>>;

    /// Upload a file and return the file resource id
    async fn upload_file_resource(&self, path: &Path) -> Result<String>;

    /// Submit all payloads in one request
    ///
    /// Import summaries are returned in submission order.
    async fn submit_tracked_entities(
        &self,
        payloads: &[TrackedEntityPayload],
    ) -> Result<SubmissionResult>;

    /// Base URL of the server
    fn base_url(&self) -> &str;
}
