//! Verification report structures

use crate::domain::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Results of re-reading accepted records from the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    pub total_verified: usize,

    /// Records found on the destination
    pub confirmed: usize,

    /// Accepted records not found yet; retried next run
    pub pending: usize,

    /// Confirmed records with their destination ids
    pub confirmed_records: Vec<ConfirmedRecord>,

    /// Details of pending records
    pub failures: Vec<VerificationFailure>,

    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub instance_id: InstanceId,
    pub tracked_entity_id: String,
}

/// A record the destination accepted but did not return on re-query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub instance_id: InstanceId,
    pub tracked_entity_id: Option<String>,
    pub reason: String,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self {
            verified_at: Utc::now(),
            total_verified: 0,
            confirmed: 0,
            pending: 0,
            confirmed_records: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record_confirmed(&mut self, instance_id: InstanceId, tracked_entity_id: String) {
        self.total_verified += 1;
        self.confirmed += 1;
        self.confirmed_records.push(ConfirmedRecord {
            instance_id,
            tracked_entity_id,
        });
    }

    pub fn record_pending(&mut self, failure: VerificationFailure) {
        self.total_verified += 1;
        self.pending += 1;
        self.failures.push(failure);
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn is_confirmed(&self, instance_id: &InstanceId) -> Option<&ConfirmedRecord> {
        self.confirmed_records
            .iter()
            .find(|c| &c.instance_id == instance_id)
    }

    /// Check if every verified record was confirmed
    pub fn is_success(&self) -> bool {
        self.pending == 0
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Verification Report\n");
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Total verified: {}\n", self.total_verified));
        summary.push_str(&format!("  Confirmed: {}\n", self.confirmed));
        summary.push_str(&format!("  Pending: {}\n", self.pending));

        if !self.failures.is_empty() {
            summary.push_str("\nPending records:\n");
            for failure in &self.failures {
                summary.push_str(&format!("  - {}: {}\n", failure.instance_id, failure.reason));
            }
        }
        summary
    }
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> InstanceId {
        InstanceId::new(s).unwrap()
    }

    #[test]
    fn test_counts() {
        let mut report = VerificationReport::new();
        report.record_confirmed(id("a"), "tei1".to_string());
        report.record_pending(VerificationFailure {
            instance_id: id("b"),
            tracked_entity_id: None,
            reason: "not found".to_string(),
        });

        assert_eq!(report.total_verified, 2);
        assert!(!report.is_success());
        assert!(report.is_confirmed(&id("a")).is_some());
        assert!(report.is_confirmed(&id("b")).is_none());
    }

    #[test]
    fn test_format_summary_lists_pending() {
        let mut report = VerificationReport::new();
        report.record_pending(VerificationFailure {
            instance_id: id("uuid:7"),
            tracked_entity_id: Some("tei7".to_string()),
            reason: "entity not returned by search".to_string(),
        });
        let text = report.format_summary();
        assert!(text.contains("Pending: 1"));
        assert!(text.contains("uuid:7"));
    }
}
