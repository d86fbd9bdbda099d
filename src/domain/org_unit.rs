//! Organisation unit resolution results

use super::ids::OrgUnitId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which step of the resolution order produced the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// A literal organisation unit field on the record
    RecordField,
    /// The configured fallback identifier
    Fallback,
    /// The prefix mapping table
    Mapping,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionSource::RecordField => "record_field",
            ResolutionSource::Fallback => "fallback",
            ResolutionSource::Mapping => "mapping",
        };
        write!(f, "{s}")
    }
}

/// Result of resolving one record's destination organisation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgUnitResolution {
    Resolved {
        org_unit: OrgUnitId,
        source: ResolutionSource,
    },
    /// No step produced a usable unit; `raw_value` is what the record carried
    Unresolved { raw_value: String },
}

impl OrgUnitResolution {
    /// The resolved unit, or the `unresolved` sentinel
    pub fn org_unit(&self) -> OrgUnitId {
        match self {
            OrgUnitResolution::Resolved { org_unit, .. } => org_unit.clone(),
            OrgUnitResolution::Unresolved { .. } => OrgUnitId::unresolved(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, OrgUnitResolution::Resolved { .. })
    }
}
