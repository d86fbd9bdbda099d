//! Transfer coordinator - runs one pipeline pass
//!
//! Stages run strictly in order: merge, duplicate filter, cause-of-death
//! join, destination discovery, per-record resolution and reconciliation,
//! posting, verification and the outcome commit. A fatal error in any stage
//! stops the run; outcomes committed before it are kept.

use crate::adapters::database::create_transfer_store;
use crate::adapters::dhis::{DestinationServer, Dhis2Client};
use crate::config::TransferConfig;
use crate::core::ingest::export::write_batch;
use crate::core::ingest::{
    apply_cod_results, filter_duplicates, merge_exports, read_cod_results, MergeOutcome,
};
use crate::core::package::{
    commit_storage_file, BlobPackager, StorageEntry, StorageFile, StorageStatus,
};
use crate::core::reconcile::{OrgUnitResolver, TrackedEntityReconciler};
use crate::core::state::{RunWatermark, StateManager};
use crate::core::transfer::poster::{DestinationPoster, PostReport};
use crate::core::transfer::summary::{PlannedTransfer, RunOutcome, RunSummary};
use crate::core::verification::{VerificationRun, Verifier};
use crate::domain::{
    DestinationIds, OrgUnitId, OrgUnitResolution, OutcomeLabel, Result, TrackedEntityPayload,
    TransferError, VaRecord,
};
use crate::{log_record_skipped, log_stage_complete};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Pipeline stage, named in the event log when a run fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Merge,
    Dedup,
    CauseOfDeath,
    Discovery,
    Reconcile,
    Post,
    Verify,
    Commit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Merge => "export merge",
            PipelineStage::Dedup => "duplicate filtering",
            PipelineStage::CauseOfDeath => "cause-of-death join",
            PipelineStage::Discovery => "destination discovery",
            PipelineStage::Reconcile => "reconciliation",
            PipelineStage::Post => "posting",
            PipelineStage::Verify => "verification",
            PipelineStage::Commit => "outcome commit",
        };
        f.write_str(s)
    }
}

struct StageFailure {
    stage: PipelineStage,
    error: TransferError,
}

type StageResult<T> = std::result::Result<T, StageFailure>;

fn at(stage: PipelineStage) -> impl FnOnce(TransferError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

pub struct TransferCoordinator {
    config: TransferConfig,
    state: StateManager,
    server: Arc<dyn DestinationServer>,
    dry_run: bool,
}

impl TransferCoordinator {
    pub fn new(
        config: TransferConfig,
        state: StateManager,
        server: Arc<dyn DestinationServer>,
    ) -> Self {
        let dry_run = config.application.dry_run;
        Self {
            config,
            state,
            server,
            dry_run,
        }
    }

    /// Open the configured store and build the DHIS2 client
    ///
    /// No request is sent here; the destination is first contacted after
    /// duplicate filtering.
    pub async fn from_config(config: TransferConfig) -> Result<Self> {
        let store = create_transfer_store(&config.store).await?;
        let server: Arc<dyn DestinationServer> = Arc::new(Dhis2Client::new(&config.dhis)?);
        Ok(Self::new(config, StateManager::new(store), server))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Execute one run
    ///
    /// # Errors
    ///
    /// Returns the first fatal error after recording it in the event log and
    /// marking the run watermark failed.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let mut watermark = RunWatermark::new();
        watermark.mark_started();
        self.state.checkpoint_run(&watermark).await;
        self.state
            .event(format!(
                "Run {} started{}",
                watermark.run_id,
                if self.dry_run { " (dry run)" } else { "" }
            ))
            .await?;

        let mut summary = RunSummary::new(watermark.run_id);
        match self.execute(&mut summary).await {
            Ok(()) => {
                let summary = summary.with_duration(start.elapsed());
                summary.log_summary();
                watermark.records_pushed = summary.pushed() as u64;
                watermark.mark_completed();
                self.state.checkpoint_run(&watermark).await;
                self.state.summary(summary.describe()).await?;
                Ok(summary)
            }
            Err(StageFailure { stage, error }) => {
                let message = format!("Run failed during {stage}: {error}");
                if let Err(e) = self.state.error(&message).await {
                    tracing::warn!(error = %e, "Failed to record run failure in event log");
                }
                watermark.records_pushed = summary.pushed() as u64;
                watermark.mark_failed(message);
                self.state.checkpoint_run(&watermark).await;
                Err(error)
            }
        }
    }

    async fn execute(&self, summary: &mut RunSummary) -> StageResult<()> {
        let settings = &self.config.transfer;
        let schema = settings.column_schema();
        let carry_over = settings.carry_over_path();

        if !self.dry_run {
            self.recover_leftover_outcomes(summary).await;
        }

        // Merge
        let (merged, merge_report) =
            merge_exports(&settings.new_export_path(), &carry_over, &schema)
                .map_err(at(PipelineStage::Merge))?;
        for reason in &merge_report.rejected {
            self.state
                .warning(reason)
                .await
                .map_err(at(PipelineStage::Merge))?;
        }
        summary.merge = merge_report;
        let mut batch = match merged {
            MergeOutcome::Merged(batch) => batch,
            MergeOutcome::NoNewRecords => {
                summary.outcome = RunOutcome::NoNewRecords;
                self.state
                    .event("No new records to transfer")
                    .await
                    .map_err(at(PipelineStage::Merge))?;
                return Ok(());
            }
        };
        log_stage_complete!("merge", batch.len());

        // Duplicate filter
        summary.dedup = filter_duplicates(&mut batch, &self.state, &carry_over, &schema)
            .await
            .map_err(at(PipelineStage::Dedup))?;
        if summary.dedup.forwarded == 0 {
            summary.outcome = RunOutcome::NothingToForward;
            self.state
                .event("No records left to forward after duplicate filtering")
                .await
                .map_err(at(PipelineStage::Dedup))?;
            return Ok(());
        }
        log_stage_complete!("dedup", summary.dedup.forwarded);

        // Cause of death
        let results = read_cod_results(&settings.cod_results_path(), settings)
            .map_err(at(PipelineStage::CauseOfDeath))?;
        summary.cod = apply_cod_results(&mut batch, &results, &self.config.cod.codes);
        // Records still in flight keep their causes for the next run
        write_batch(&carry_over, &batch, &schema).map_err(at(PipelineStage::CauseOfDeath))?;

        // Discovery
        let program = self
            .server
            .find_program(&self.config.dhis.program_name)
            .await
            .map_err(at(PipelineStage::Discovery))?;
        let mut resolver = OrgUnitResolver::from_config(&self.config.org_unit, settings)
            .map_err(at(PipelineStage::Discovery))?;
        if self.config.dhis.discover_org_units {
            let known = self
                .server
                .list_org_units()
                .await
                .map_err(at(PipelineStage::Discovery))?;
            tracing::info!(count = known.len(), "Discovered organisation units");
            resolver = resolver.with_known_org_units(known);
        }
        let program_id = program.id.clone();
        let reconciler = TrackedEntityReconciler::new(
            self.server.clone(),
            program,
            &self.config.dhis,
            settings.undetermined_code.as_str(),
        )
        .map_err(at(PipelineStage::Discovery))?;

        // Resolution and reconciliation
        let mut entries = Vec::new();
        let mut to_post: Vec<(VaRecord, TrackedEntityPayload)> = Vec::new();
        for record in std::mem::take(&mut batch.records) {
            let resolution = resolver.resolve(&record);
            summary.resolution.record(&resolution);

            let org_unit = match resolution {
                OrgUnitResolution::Resolved { org_unit, .. } => org_unit,
                OrgUnitResolution::Unresolved { raw_value } => {
                    log_record_skipped!(record.instance_id, "no destination");
                    if !self.dry_run {
                        self.quarantine(&record, &raw_value, summary).await;
                    }
                    entries.push(StorageEntry {
                        record,
                        org_unit: OrgUnitId::unresolved(),
                        ids: DestinationIds::default(),
                        blob_checksum: None,
                        status: StorageStatus::Outcome(OutcomeLabel::NoDestination),
                    });
                    continue;
                }
            };

            if record.cause.is_missing() {
                log_record_skipped!(record.instance_id, "no cause assigned");
                summary.no_cause += 1;
                entries.push(StorageEntry {
                    record,
                    org_unit,
                    ids: DestinationIds::default(),
                    blob_checksum: None,
                    status: StorageStatus::Outcome(OutcomeLabel::NoCauseAssigned),
                });
                continue;
            }

            let payload = reconciler
                .reconcile(&record, &org_unit)
                .await
                .map_err(at(PipelineStage::Reconcile))?;
            if self.dry_run {
                summary.planned.push(PlannedTransfer {
                    instance_id: record.instance_id.clone(),
                    serial_no: record.serial_no.clone(),
                    action: payload.action(),
                    org_unit,
                    tracked_entity_id: payload
                        .tracked_entity_instance
                        .as_ref()
                        .map(|id| id.to_string()),
                });
            }
            to_post.push((record, payload));
        }
        log_stage_complete!("reconcile", to_post.len());

        if self.dry_run {
            summary.outcome = RunOutcome::DryRun;
            return Ok(());
        }

        // Post
        let submitted: Vec<(VaRecord, OrgUnitId)> = to_post
            .iter()
            .map(|(record, payload)| (record.clone(), payload.org_unit.clone()))
            .collect();
        let poster = DestinationPoster::new(
            self.server.clone(),
            BlobPackager::new(settings.blob_path()),
            self.config.dhis.data_elements.blob.as_str(),
        );
        summary.post = poster
            .post(to_post)
            .await
            .map_err(at(PipelineStage::Post))?;
        self.log_rejections(&summary.post)
            .await
            .map_err(at(PipelineStage::Post))?;

        // Verify
        let VerificationRun {
            report,
            interrupted,
        } = if summary.post.accepted > 0 {
            Verifier::new(
                self.server.clone(),
                program_id,
                self.config.dhis.attributes.serial_no.as_str(),
            )
            .verify(summary.post.accepted_records())
            .await
        } else {
            VerificationRun {
                report: Default::default(),
                interrupted: None,
            }
        };

        for (posted, (record, org_unit)) in summary.post.records.iter().zip(submitted) {
            let mut ids = DestinationIds {
                tracked_entity_id: posted.tracked_entity_id.clone(),
                event_id: posted.event_id.clone(),
            };
            let status = if !posted.accepted {
                StorageStatus::Outcome(OutcomeLabel::Error)
            } else if let Some(confirmed) = report.is_confirmed(&posted.instance_id) {
                ids.tracked_entity_id = Some(confirmed.tracked_entity_id.clone());
                StorageStatus::Outcome(OutcomeLabel::Pushed)
            } else {
                StorageStatus::Pending
            };
            entries.push(StorageEntry {
                record,
                org_unit,
                ids,
                blob_checksum: Some(posted.blob_checksum.clone()).filter(|c| !c.is_empty()),
                status,
            });
        }
        summary.verification = Some(report);

        // Commit
        let storage = settings.new_storage_path();
        StorageFile::write(&storage, &batch.headers, &entries, &schema)
            .map_err(at(PipelineStage::Commit))?;
        summary.commit = commit_storage_file(&storage, &self.state, &schema)
            .await
            .map_err(at(PipelineStage::Commit))?;
        log_stage_complete!("commit", summary.commit.committed);

        if let Some(error) = interrupted {
            return Err(StageFailure {
                stage: PipelineStage::Verify,
                error,
            });
        }

        summary.outcome = RunOutcome::Completed;
        Ok(())
    }

    /// Commit the new-storage file an earlier run left behind
    ///
    /// Outcomes already in the store are skipped, so a file from a completed
    /// run commits nothing. An unreadable file is logged and left in place;
    /// its records are reconciled again as updates.
    async fn recover_leftover_outcomes(&self, summary: &mut RunSummary) {
        let path = self.config.transfer.new_storage_path();
        if !path.exists() {
            return;
        }
        let schema = self.config.transfer.column_schema();
        match commit_storage_file(&path, &self.state, &schema).await {
            Ok(report) => {
                summary.recovered = report.committed;
                if report.committed > 0 {
                    tracing::warn!(
                        path = %path.display(),
                        committed = report.committed,
                        "Committed outcomes left by an interrupted run"
                    );
                    if let Err(e) = self
                        .state
                        .warning(format!(
                            "Recovered {} outcomes from {}",
                            report.committed,
                            path.display()
                        ))
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to record recovery in event log");
                    }
                }
            }
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not commit leftover new-storage file"
            ),
        }
    }

    /// Quarantine write failures are logged; the record is retried next run
    async fn quarantine(&self, record: &VaRecord, raw_value: &str, summary: &mut RunSummary) {
        match self.state.quarantine(record, raw_value).await {
            Ok(true) => summary.quarantined += 1,
            Ok(false) => {}
            Err(e) => tracing::error!(
                instance_id = %record.instance_id,
                error = %e,
                "Failed to quarantine record"
            ),
        }
    }

    async fn log_rejections(&self, report: &PostReport) -> Result<()> {
        for posted in report.records.iter().filter(|r| !r.accepted) {
            self.state
                .error(format!(
                    "Record {} rejected by destination: {}",
                    posted.instance_id,
                    posted.description.as_deref().unwrap_or("no reason given")
                ))
                .await?;
        }
        Ok(())
    }
}
