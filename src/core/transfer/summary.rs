//! Run summary and reporting
//!
//! Every stage returns its own report; [`RunSummary`] collects them so the
//! CLI and the event log can describe a run without shared counters.

use crate::core::ingest::{CodReport, DedupReport, MergeReport};
use crate::core::package::CommitReport;
use crate::core::reconcile::ResolutionReport;
use crate::core::transfer::poster::PostReport;
use crate::core::verification::VerificationReport;
use crate::domain::{InstanceId, OrgUnitId, ReconcileAction, SerialNo};
use std::time::Duration;
use uuid::Uuid;

/// How far a run got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Neither the carry-over nor a new export held any record
    NoNewRecords,
    /// Every record was already transferred or quarantined
    NothingToForward,
    /// Stopped after reconciliation; nothing posted or recorded
    DryRun,
    Completed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::NoNewRecords => "no new records",
            RunOutcome::NothingToForward => "nothing to forward",
            RunOutcome::DryRun => "dry run",
            RunOutcome::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A create or update a dry run would have posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub instance_id: InstanceId,
    pub serial_no: SerialNo,
    pub action: ReconcileAction,
    pub org_unit: OrgUnitId,
    pub tracked_entity_id: Option<String>,
}

/// Summary of one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub merge: MergeReport,
    pub dedup: DedupReport,
    pub cod: CodReport,
    pub resolution: ResolutionReport,

    /// Outcomes committed from a new-storage file left by an earlier run
    pub recovered: usize,

    /// Records newly written to quarantine
    pub quarantined: usize,

    /// Resolved records left without a cause
    pub no_cause: usize,

    pub post: PostReport,

    /// Present once verification ran
    pub verification: Option<VerificationReport>,

    pub commit: CommitReport,

    /// Filled by dry runs only
    pub planned: Vec<PlannedTransfer>,

    pub duration: Duration,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcome: RunOutcome::Completed,
            merge: MergeReport::default(),
            dedup: DedupReport::default(),
            cod: CodReport::default(),
            resolution: ResolutionReport::default(),
            recovered: 0,
            quarantined: 0,
            no_cause: 0,
            post: PostReport::default(),
            verification: None,
            commit: CommitReport::default(),
            planned: Vec::new(),
            duration: Duration::from_secs(0),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Records confirmed on the destination this run
    pub fn pushed(&self) -> usize {
        self.verification.as_ref().map_or(0, |v| v.confirmed)
    }

    /// Accepted records not yet visible on the destination
    pub fn pending(&self) -> usize {
        self.verification.as_ref().map_or(0, |v| v.pending)
    }

    /// Planned creates and updates of a dry run
    pub fn planned_counts(&self) -> (usize, usize) {
        let creates = self
            .planned
            .iter()
            .filter(|p| p.action == ReconcileAction::Create)
            .count();
        (creates, self.planned.len() - creates)
    }

    /// True when nothing was rejected and every commit succeeded
    pub fn is_successful(&self) -> bool {
        self.post.rejected == 0 && self.commit.failed == 0
    }

    /// One-line description for the event log
    pub fn describe(&self) -> String {
        match self.outcome {
            RunOutcome::NoNewRecords => "Run finished: no new records".to_string(),
            RunOutcome::NothingToForward => format!(
                "Run finished: {} received, {} already handled, nothing to forward",
                self.dedup.received, self.dedup.duplicates_removed
            ),
            RunOutcome::DryRun => {
                let (creates, updates) = self.planned_counts();
                format!(
                    "Dry run finished: {} creates and {} updates planned, {} unresolved, {} without cause",
                    creates, updates, self.resolution.unresolved, self.no_cause
                )
            }
            RunOutcome::Completed => format!(
                "Run finished: {} forwarded, {} pushed, {} pending, {} rejected, {} quarantined, {} without cause",
                self.dedup.forwarded,
                self.pushed(),
                self.pending(),
                self.post.rejected,
                self.quarantined,
                self.no_cause
            ),
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            outcome = %self.outcome,
            merged = self.merge.merged,
            forwarded = self.dedup.forwarded,
            duplicates_removed = self.dedup.duplicates_removed,
            resolved = self.resolution.resolved(),
            unresolved = self.resolution.unresolved,
            accepted = self.post.accepted,
            rejected = self.post.rejected,
            pushed = self.pushed(),
            pending = self.pending(),
            committed = self.commit.committed,
            recovered = self.recovered,
            duration_secs = self.duration.as_secs(),
            "Transfer run completed"
        );

        if self.commit.failed > 0 {
            tracing::warn!(
                failed = self.commit.failed,
                "Some outcomes could not be committed and will be retried"
            );
        }
    }
}
