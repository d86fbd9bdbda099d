//! Verbal autopsy record model
//!
//! A [`VaRecord`] is one questionnaire submission. The handful of fields the
//! transfer logic reads are typed; every other column is kept verbatim in an
//! open map so it round-trips through the carry-over and storage files.

use super::ids::{InstanceId, SerialNo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Column carrying an already joined cause label through the carry-over
pub const CAUSE_COLUMN: &str = "vatransfer_cause";
/// Column carrying the algorithm metadata of [`CAUSE_COLUMN`]
pub const COD_METADATA_COLUMN: &str = "vatransfer_cod_metadata";

/// Export column names feeding the typed record fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub instance_id: String,
    pub serial_no: String,
    pub sex: String,
    pub date_of_birth: String,
    pub date_of_death: String,
    pub age: String,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            instance_id: "meta-instanceID".to_string(),
            serial_no: "id".to_string(),
            sex: "Id10019".to_string(),
            date_of_birth: "Id10021".to_string(),
            date_of_death: "Id10023".to_string(),
            age: "ageInYears".to_string(),
        }
    }
}

/// Outcome of the cause-of-death step for one record
///
/// Computed once when the cause-of-death results are joined to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CauseAssignment {
    /// A cause was assigned; `code` is what gets posted
    Assigned { label: String, code: String },
    /// No result, or the algorithm reported the record as missing
    #[default]
    Missing,
    /// The algorithm ran but could not determine a cause
    Undetermined,
}

impl CauseAssignment {
    /// Classify a raw cause label from the results file
    ///
    /// Blank and `MISSING` labels mean [`CauseAssignment::Missing`],
    /// `Undetermined` means [`CauseAssignment::Undetermined`]; both compare
    /// case-insensitively. Other labels are looked up in `codes` and fall back
    /// to the label itself.
    pub fn from_label(raw: &str, codes: &HashMap<String, String>) -> Self {
        let label = raw.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("missing") {
            return CauseAssignment::Missing;
        }
        if label.eq_ignore_ascii_case("undetermined") {
            return CauseAssignment::Undetermined;
        }
        let code = codes
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string());
        CauseAssignment::Assigned {
            label: label.to_string(),
            code,
        }
    }

    /// Code posted to the destination, if any
    pub fn posted_code<'a>(&'a self, undetermined_code: &'a str) -> Option<&'a str> {
        match self {
            CauseAssignment::Assigned { code, .. } => Some(code),
            CauseAssignment::Undetermined => Some(undetermined_code),
            CauseAssignment::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CauseAssignment::Missing)
    }

    /// Label as written to [`CAUSE_COLUMN`]; `None` when missing
    pub fn label(&self) -> Option<&str> {
        match self {
            CauseAssignment::Assigned { label, .. } => Some(label),
            CauseAssignment::Undetermined => Some("Undetermined"),
            CauseAssignment::Missing => None,
        }
    }

    /// Re-classify the label against the current code table
    pub fn remapped(&self, codes: &HashMap<String, String>) -> Self {
        match self.label() {
            Some(label) => Self::from_label(label, codes),
            None => CauseAssignment::Missing,
        }
    }
}

/// Pipe-delimited algorithm metadata code, e.g.
/// `InterVA5|5.0|InterVA|5|2016 WHO Verbal Autopsy Form|v1_4_1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmMetadata(String);

impl AlgorithmMetadata {
    /// Returns `None` for a blank code
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First field of the code
    pub fn algorithm(&self) -> &str {
        self.0.split('|').next().unwrap_or_default().trim()
    }

    /// Last non-empty field of the code
    pub fn instrument_version(&self) -> Option<&str> {
        self.0
            .split('|')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .last()
    }
}

/// One verbal autopsy submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaRecord {
    pub instance_id: InstanceId,
    pub serial_no: SerialNo,
    pub sex: Option<String>,
    pub date_of_birth: Option<String>,
    pub date_of_death: Option<String>,
    pub age: Option<String>,
    #[serde(default)]
    pub cause: CauseAssignment,
    #[serde(default)]
    pub algorithm_metadata: Option<AlgorithmMetadata>,
    /// Every column not mapped to a typed field, keyed by column name
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl VaRecord {
    /// Build a record from a header-ordered export row
    ///
    /// Fails when the instance id or serial number column is missing or blank.
    /// A carried cause in [`CAUSE_COLUMN`] keeps its label as the code until
    /// the cause-of-death join re-maps it.
    pub fn from_row(
        headers: &[String],
        values: &[String],
        schema: &ColumnSchema,
    ) -> Result<Self, String> {
        let mut instance_id = None;
        let mut serial_no = None;
        let mut sex = None;
        let mut date_of_birth = None;
        let mut date_of_death = None;
        let mut age = None;
        let mut cause = CauseAssignment::Missing;
        let mut algorithm_metadata = None;
        let mut extra = BTreeMap::new();

        for (header, value) in headers.iter().zip(values.iter()) {
            let present = non_blank(value);
            if header == &schema.instance_id {
                instance_id = present;
            } else if header == &schema.serial_no {
                serial_no = present;
            } else if header == &schema.sex {
                sex = present;
            } else if header == &schema.date_of_birth {
                date_of_birth = present;
            } else if header == &schema.date_of_death {
                date_of_death = present;
            } else if header == &schema.age {
                age = present;
            } else if header == CAUSE_COLUMN {
                cause = CauseAssignment::from_label(value, &HashMap::new());
            } else if header == COD_METADATA_COLUMN {
                algorithm_metadata = AlgorithmMetadata::new(value.as_str());
            } else {
                extra.insert(header.clone(), value.clone());
            }
        }

        let instance_id = instance_id
            .ok_or_else(|| format!("missing value for column '{}'", schema.instance_id))
            .and_then(InstanceId::new)?;
        let serial_no = serial_no
            .ok_or_else(|| {
                format!(
                    "record {} has no value for column '{}'",
                    instance_id, schema.serial_no
                )
            })
            .and_then(SerialNo::new)?;

        Ok(Self {
            instance_id,
            serial_no,
            sex,
            date_of_birth,
            date_of_death,
            age,
            cause,
            algorithm_metadata,
            extra,
        })
    }

    /// Render the record as a row following `headers`
    pub fn to_row(&self, headers: &[String], schema: &ColumnSchema) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.field(h, schema).unwrap_or_default().to_string())
            .collect()
    }

    /// Value of a column, typed or free-form
    pub fn field<'a>(&'a self, column: &str, schema: &ColumnSchema) -> Option<&'a str> {
        if column == schema.instance_id {
            Some(self.instance_id.as_str())
        } else if column == schema.serial_no {
            Some(self.serial_no.as_str())
        } else if column == schema.sex {
            self.sex.as_deref()
        } else if column == schema.date_of_birth {
            self.date_of_birth.as_deref()
        } else if column == schema.date_of_death {
            self.date_of_death.as_deref()
        } else if column == schema.age {
            self.age.as_deref()
        } else if column == CAUSE_COLUMN {
            self.cause.label()
        } else if column == COD_METADATA_COLUMN {
            self.algorithm_metadata.as_ref().map(AlgorithmMetadata::as_str)
        } else {
            self.extra.get(column).map(String::as_str)
        }
    }

    /// Set a free-form column, adding it if absent
    pub fn set_extra(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(column.into(), value.into());
    }

    /// Flatten the record into `(attribute, value)` pairs, typed fields first
    pub fn attribute_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("instance_id".to_string(), self.instance_id.to_string()),
            ("serial_no".to_string(), self.serial_no.to_string()),
        ];
        let optional = [
            ("sex", &self.sex),
            ("date_of_birth", &self.date_of_birth),
            ("date_of_death", &self.date_of_death),
            ("age", &self.age),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                pairs.push((name.to_string(), v.clone()));
            }
        }
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// An ordered, duplicate-free set of records sharing one header row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaBatch {
    pub headers: Vec<String>,
    pub records: Vec<VaRecord>,
}

impl VaBatch {
    pub fn new(headers: Vec<String>, records: Vec<VaRecord>) -> Self {
        Self { headers, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Header row for writing, with the carried cause columns appended when
    /// any record has a cause to carry
    pub fn write_headers(&self) -> Vec<String> {
        let mut headers = self.headers.clone();
        let carried = [
            (CAUSE_COLUMN, self.records.iter().any(|r| !r.cause.is_missing())),
            (
                COD_METADATA_COLUMN,
                self.records.iter().any(|r| r.algorithm_metadata.is_some()),
            ),
        ];
        for (column, needed) in carried {
            if needed && !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
        headers
    }

    /// Keep only records for which `keep` returns true, returning the removed ones
    pub fn retain_partition<F>(&mut self, mut keep: F) -> Vec<VaRecord>
    where
        F: FnMut(&VaRecord) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| keep(r));
        self.records = kept;
        removed
    }
}
