//! DHIS2 Web API client
//!
//! JSON over HTTP(S) with Basic authentication. Every call is a single
//! attempt bounded by the configured transport timeout.

use super::models::{
    FileResourceResponse, ImportSummariesDto, OrganisationUnitsResponse, ProgramsResponse,
    TrackedEntityBatch, TrackedEntitySearchResponse,
};
use super::traits::DestinationServer;
use crate::config::{DhisConfig, SecretString};
use crate::domain::{
    DhisError, ExistingTrackedEntity, Program, Result, SubmissionResult, TrackedEntityPayload,
    TransferError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use std::path::Path;
use std::time::Duration;

const PROGRAM_FIELDS: &str = "id,name,trackedEntityType[id],programStages[id]";
const TRACKED_ENTITY_FIELDS: &str =
    "trackedEntityInstance,orgUnit,attributes[attribute,displayName,value]";
const MAX_ERROR_BODY: usize = 512;

/// Client for one DHIS2 server
///
/// # Example
///
/// ```no_run
/// use vatransfer::adapters::dhis::{Dhis2Client, DestinationServer};
/// use vatransfer::config::load_config;
///
/// # async fn example() -> vatransfer::domain::Result<()> {
/// let config = load_config("vatransfer.toml")?;
/// let client = Dhis2Client::new(&config.dhis)?;
/// let program = client.find_program(&config.dhis.program_name).await?;
/// println!("Program {} has {} stages", program.id, program.program_stages.len());
/// # Ok(())
/// # }
/// ```
pub struct Dhis2Client {
    base_url: String,
    client: Client,
    username: String,
    password: SecretString,
}

impl Dhis2Client {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &DhisConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)));

        if !config.tls_verify {
            tracing::warn!(base_url = %config.base_url, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            TransferError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn auth_header_value(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password.expose_secret().as_str());
        format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()))
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, DhisError> {
        request
            .header(AUTHORIZATION, self.auth_header_value())
            .send()
            .await
            .map_err(|e| DhisError::ConnectionFailed(e.to_string()))
    }
}

/// Pass 2xx responses through; map everything else to a [`DhisError`]
async fn check_status<F>(resp: Response, on_error: F) -> std::result::Result<Response, DhisError>
where
    F: FnOnce(u16, String) -> DhisError,
{
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DhisError::AuthenticationFailed(format!(
            "server returned {status}"
        )));
    }
    Err(on_error(status.as_u16(), body))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: Response,
) -> std::result::Result<T, DhisError> {
    resp.json::<T>()
        .await
        .map_err(|e| DhisError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl DestinationServer for Dhis2Client {
    async fn find_program(&self, name: &str) -> Result<Program> {
        let request = self.client.get(self.api_url("programs")).query(&[
            ("filter", format!("name:eq:{name}")),
            ("fields", PROGRAM_FIELDS.to_string()),
            ("paging", "false".to_string()),
        ]);

        let resp = self.send(request).await?;
        let resp = check_status(resp, |status, message| DhisError::QueryFailed {
            status,
            message,
        })
        .await?;
        let body: ProgramsResponse = read_json(resp).await?;

        let mut matches: Vec<_> = body
            .programs
            .into_iter()
            .filter(|p| p.name == name)
            .collect();

        match matches.len() {
            0 => Err(DhisError::ProgramNotFound(name.to_string()).into()),
            1 => {
                let program = matches.remove(0).into_domain();
                tracing::info!(
                    program_id = %program.id,
                    stages = program.program_stages.len(),
                    "Resolved tracker program"
                );
                Ok(program)
            }
            count => Err(DhisError::AmbiguousProgram {
                name: name.to_string(),
                count,
            }
            .into()),
        }
    }

    async fn list_org_units(&self) -> Result<Vec<String>> {
        let request = self
            .client
            .get(self.api_url("organisationUnits"))
            .query(&[("fields", "id"), ("paging", "false")]);

        let resp = self.send(request).await?;
        let resp = check_status(resp, |status, message| {
            DhisError::OrgUnitDiscoveryFailed { status, message }
        })
        .await?;
        let body: OrganisationUnitsResponse = read_json(resp).await?;

        tracing::debug!(count = body.organisation_units.len(), "Discovered organisation units");
        Ok(body.organisation_units.into_iter().map(|ou| ou.id).collect())
    }

    async fn search_tracked_entities(
        &self,
        program_id: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<ExistingTrackedEntity>> {
        let request = self
            .client
            .get(self.api_url("trackedEntityInstances"))
            .query(&[
                ("ouMode", "ALL".to_string()),
                ("program", program_id.to_string()),
                ("filter", format!("{attribute}:EQ:{value}")),
                ("fields", TRACKED_ENTITY_FIELDS.to_string()),
                ("paging", "false".to_string()),
            ]);

        let resp = self.send(request).await?;
        let resp = check_status(resp, |status, message| DhisError::QueryFailed {
            status,
            message,
        })
        .await?;
        let body: TrackedEntitySearchResponse = read_json(resp).await?;

        let entities = body
            .tracked_entity_instances
            .into_iter()
            .map(|dto| dto.into_domain())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    async fn upload_file_resource(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            TransferError::Io(format!("Failed to read blob {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "blob.db".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-sqlite3")
            .map_err(|e| TransferError::Other(format!("Invalid blob content type: {e}")))?;
        let form = Form::new().part("file", part);

        let request = self.client.post(self.api_url("fileResources")).multipart(form);
        let resp = self.send(request).await?;
        let resp = check_status(resp, |status, message| DhisError::UploadFailed {
            status,
            message,
        })
        .await?;
        let body: FileResourceResponse = read_json(resp).await?;

        tracing::debug!(
            path = %path.display(),
            file_resource = %body.response.file_resource.id,
            "Uploaded blob"
        );
        Ok(body.response.file_resource.id)
    }

    async fn submit_tracked_entities(
        &self,
        payloads: &[TrackedEntityPayload],
    ) -> Result<SubmissionResult> {
        let request = self
            .client
            .post(self.api_url("trackedEntityInstances"))
            .query(&[("strategy", "CREATE_AND_UPDATE")])
            .json(&TrackedEntityBatch {
                tracked_entity_instances: payloads,
            });

        let resp = self.send(request).await?;
        let resp = check_status(resp, |status, message| DhisError::SubmissionFailed {
            status,
            message,
        })
        .await?;
        let body: serde_json::Value = read_json(resp).await?;

        Ok(ImportSummariesDto::from_body(&body)?.into_domain())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dhis_config;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = Dhis2Client::new(&dhis_config("https://dhis.example.org/")).unwrap();
        assert_eq!(client.base_url(), "https://dhis.example.org");
        assert_eq!(
            client.api_url("programs"),
            "https://dhis.example.org/api/programs"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let client = Dhis2Client::new(&dhis_config("https://dhis.example.org")).unwrap();
        // base64("admin:district")
        assert_eq!(client.auth_header_value(), "Basic YWRtaW46ZGlzdHJpY3Q=");
    }
}
