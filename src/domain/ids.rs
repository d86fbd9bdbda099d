//! Domain identifier types with validation
//!
//! Newtype wrappers keep the submission identifier, the business key and the
//! destination-server identifiers from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-submission identifier assigned by the data-collection server
///
/// Unique within one merged batch and used as the durable de-duplication key
/// of the transfer store.
///
/// # Examples
///
/// ```
/// use vatransfer::domain::ids::InstanceId;
/// use std::str::FromStr;
///
/// let id = InstanceId::from_str("uuid:0b3c5e8a-2a55-4b0c-9f1a-1d3c0e7a9b11").unwrap();
/// assert_eq!(id.as_str(), "uuid:0b3c5e8a-2a55-4b0c-9f1a-1d3c0e7a9b11");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates a new InstanceId, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Instance ID cannot be empty".to_string());
        }
        Ok(Self(id.trim().to_string()))
    }

    /// Returns the instance ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe form, used to name blob files
    ///
    /// Submission identifiers usually carry a `uuid:` prefix, so characters
    /// other than ASCII alphanumerics, `-` and `_` are replaced by `_`.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Cross-system business key used to match a record to a tracked entity
///
/// Not guaranteed unique across batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNo(String);

impl SerialNo {
    /// Creates a new SerialNo, rejecting blank values
    pub fn new(serial: impl Into<String>) -> Result<Self, String> {
        let serial = serial.into();
        if serial.trim().is_empty() {
            return Err("Serial number cannot be empty".to_string());
        }
        Ok(Self(serial.trim().to_string()))
    }

    /// Returns the serial number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SerialNo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// DHIS2 organisation unit identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgUnitId(String);

impl OrgUnitId {
    const UNRESOLVED: &'static str = "unresolved";

    /// Creates a new OrgUnitId, rejecting blank values and the sentinel
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err("Organisation unit ID cannot be empty".to_string());
        }
        if id.eq_ignore_ascii_case(Self::UNRESOLVED) {
            return Err(format!("'{id}' is reserved for unresolved records"));
        }
        Ok(Self(id.to_string()))
    }

    /// Whether `value` has the shape of a DHIS2 UID
    ///
    /// Eleven ASCII alphanumerics, the first one a letter.
    pub fn is_uid(value: &str) -> bool {
        let mut chars = value.chars();
        value.len() == 11
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric())
    }

    /// The sentinel unit given to records that could not be resolved
    pub fn unresolved() -> Self {
        Self(Self::UNRESOLVED.to_string())
    }

    /// Whether this is the unresolved sentinel
    pub fn is_unresolved(&self) -> bool {
        self.0 == Self::UNRESOLVED
    }

    /// Returns the organisation unit ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrgUnitId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// DHIS2 tracked entity instance identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedEntityId(String);

impl TrackedEntityId {
    /// Creates a new TrackedEntityId, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Tracked entity ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the tracked entity ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackedEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackedEntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
