//! Durable transfer outcomes, quarantine entries and audit events

use super::ids::InstanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Terminal outcome of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeLabel {
    #[serde(rename = "pushed")]
    Pushed,
    #[serde(rename = "no destination")]
    NoDestination,
    #[serde(rename = "no cause assigned")]
    NoCauseAssigned,
    #[serde(rename = "error")]
    Error,
}

impl OutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeLabel::Pushed => "pushed",
            OutcomeLabel::NoDestination => "no destination",
            OutcomeLabel::NoCauseAssigned => "no cause assigned",
            OutcomeLabel::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutcomeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pushed" => Ok(OutcomeLabel::Pushed),
            "no destination" => Ok(OutcomeLabel::NoDestination),
            "no cause assigned" => Ok(OutcomeLabel::NoCauseAssigned),
            "error" => Ok(OutcomeLabel::Error),
            other => Err(format!("Unknown outcome label: {other}")),
        }
    }
}

/// Identifiers the destination assigned to a delivered record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationIds {
    pub tracked_entity_id: Option<String>,
    pub event_id: Option<String>,
}

/// One row of the outcome table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: InstanceId,
    pub outcome: OutcomeLabel,
    /// JSON object of attribute name to value
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
    pub org_unit: String,
    pub event_id: Option<String>,
    pub tracked_entity_id: Option<String>,
}

/// A record parked until its organisation unit is repaired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: InstanceId,
    /// JSON of the full record
    pub record: String,
    /// JSON array of `[entity, attribute, value]` triples
    pub attributes: String,
    pub raw_org_unit: String,
    pub inserted_at: DateTime<Utc>,
    pub resolved: bool,
}

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Event,
    Warning,
    Error,
    Summary,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Event => "Event",
            EventCategory::Warning => "Warning",
            EventCategory::Error => "Error",
            EventCategory::Summary => "Summary",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Event" => Ok(EventCategory::Event),
            "Warning" => Ok(EventCategory::Warning),
            "Error" => Ok(EventCategory::Error),
            "Summary" => Ok(EventCategory::Summary),
            other => Err(format!("Unknown event category: {other}")),
        }
    }
}

/// Append-only audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub description: String,
    pub category: EventCategory,
    pub timestamp: DateTime<Utc>,
}
