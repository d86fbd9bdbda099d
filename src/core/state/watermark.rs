//! Run watermark for per-run bookkeeping
//!
//! One watermark is written per pipeline run. It is advisory: de-duplication
//! reads outcome identifiers, never watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Run status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run was never started
    #[default]
    NotStarted,
    /// Run is in progress, or was interrupted
    InProgress,
    /// Run finished
    Completed,
    /// Run aborted on a fatal error
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(RunStatus::NotStarted),
            "in_progress" => Ok(RunStatus::InProgress),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("Unknown run status: {other}")),
        }
    }
}

/// Bookkeeping for one pipeline run
///
/// # Examples
///
/// ```
/// use vatransfer::core::state::watermark::{RunWatermark, RunStatus};
///
/// let mut watermark = RunWatermark::new();
/// watermark.mark_started();
/// watermark.records_pushed = 3;
/// watermark.mark_completed();
///
/// assert_eq!(watermark.status, RunStatus::Completed);
/// assert!(watermark.duration().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWatermark {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub records_pushed: u64,
    /// Message of the fatal error, for failed runs
    pub last_error: Option<String>,
}

impl RunWatermark {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::NotStarted,
            records_pushed: 0,
            last_error: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.started_at = Utc::now();
        self.status = RunStatus::InProgress;
        self.completed_at = None;
    }

    pub fn mark_completed(&mut self) {
        self.completed_at = Some(Utc::now());
        self.status = RunStatus::Completed;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.completed_at = Some(Utc::now());
        self.status = RunStatus::Failed;
        self.last_error = Some(error.into());
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == RunStatus::InProgress
    }

    /// Duration of the run if it has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|completed| completed - self.started_at)
    }
}

impl Default for RunWatermark {
    fn default() -> Self {
        Self::new()
    }
}
