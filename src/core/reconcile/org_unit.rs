//! Organisation-unit resolution
//!
//! Order of precedence: the record's literal field, the configured fallback,
//! the prefix mapping table. A field value only counts as a literal when it
//! can be a real unit id; otherwise it is looked up as a code. A record
//! matching none of them is unresolved and goes to quarantine; it is never
//! dropped.

use crate::config::{OrgUnitConfig, TransferSettings};
use crate::core::ingest::export::read_raw;
use crate::domain::{
    OrgUnitId, OrgUnitResolution, ResolutionSource, Result, TransferError, VaRecord,
};
use std::collections::HashSet;
use std::path::Path;

/// One `code -> org unit` row of the mapping table
pub type MappingRow = (String, String);

/// Look up a raw code in the mapping table by truncated prefix
///
/// Both the raw code and every mapping code are cut to `prefix_len`
/// characters and compared case-insensitively. An id is returned only when
/// exactly one row matches.
///
/// # Examples
///
/// ```
/// use vatransfer::core::reconcile::lookup_org_unit;
///
/// let mapping = vec![
///     ("KEN".to_string(), "ouKenema001".to_string()),
///     ("BOD".to_string(), "ouBoDistr01".to_string()),
/// ];
/// let found = lookup_org_unit("ken-042", 3, &mapping).unwrap();
/// assert_eq!(found.as_str(), "ouKenema001");
/// assert!(lookup_org_unit("PUJ-001", 3, &mapping).is_none());
/// ```
pub fn lookup_org_unit(raw: &str, prefix_len: usize, mapping: &[MappingRow]) -> Option<OrgUnitId> {
    let key = prefix(raw, prefix_len);
    if key.is_empty() {
        return None;
    }

    let mut matches = mapping
        .iter()
        .filter(|(code, _)| prefix(code, prefix_len) == key);
    let (_, org_unit) = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    OrgUnitId::new(org_unit.as_str()).ok()
}

fn prefix(code: &str, len: usize) -> String {
    code.trim().chars().take(len).collect::<String>().to_lowercase()
}

/// Read a `code,org_unit` mapping CSV
pub fn load_mapping_file(path: &Path) -> Result<Vec<MappingRow>> {
    let raw = read_raw(path)?;
    let column = |name: &str| {
        raw.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                TransferError::Configuration(format!(
                    "Mapping file {} has no '{}' column",
                    path.display(),
                    name
                ))
            })
    };
    let code_col = column("code")?;
    let unit_col = column("org_unit")?;

    Ok(raw
        .rows
        .iter()
        .map(|row| (row[code_col].trim().to_string(), row[unit_col].trim().to_string()))
        .filter(|(code, unit)| !code.is_empty() && !unit.is_empty())
        .collect())
}

/// Whether a column name refers to the configured field
///
/// Grouped exports prefix field names, e.g. `respondent_backgr-Id10057`.
fn column_matches(column: &str, field: &str) -> bool {
    let column = column.to_lowercase();
    let field = field.to_lowercase();
    column == field
        || column.ends_with(&format!("-{field}"))
        || column.ends_with(&format!("/{field}"))
}

/// Non-empty values of every column matching `field`
fn field_values<'a>(record: &'a VaRecord, field: &str) -> Vec<&'a str> {
    record
        .extra
        .iter()
        .filter(|(column, _)| column_matches(column, field))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Counters of one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub from_record_field: usize,
    pub from_fallback: usize,
    pub from_mapping: usize,
    pub unresolved: usize,
}

impl ResolutionReport {
    pub fn record(&mut self, resolution: &OrgUnitResolution) {
        match resolution {
            OrgUnitResolution::Resolved { source, .. } => match source {
                ResolutionSource::RecordField => self.from_record_field += 1,
                ResolutionSource::Fallback => self.from_fallback += 1,
                ResolutionSource::Mapping => self.from_mapping += 1,
            },
            OrgUnitResolution::Unresolved { .. } => self.unresolved += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.from_record_field + self.from_fallback + self.from_mapping
    }
}

/// Resolves destination organisation units for records
#[derive(Debug, Clone)]
pub struct OrgUnitResolver {
    field_name: String,
    code_field: String,
    fallback: Option<OrgUnitId>,
    prefix_length: usize,
    mapping: Vec<MappingRow>,
    known: Option<HashSet<String>>,
}

impl OrgUnitResolver {
    /// Build a resolver from configuration, loading the mapping file if set
    ///
    /// Inline mapping rows come before file rows. A relative `mapping_file`
    /// resolves against the transfer working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the fallback is not a valid id or the mapping file
    /// cannot be read.
    pub fn from_config(config: &OrgUnitConfig, settings: &TransferSettings) -> Result<Self> {
        let fallback = config
            .fallback
            .as_deref()
            .map(OrgUnitId::new)
            .transpose()
            .map_err(TransferError::Configuration)?;

        let mut mapping: Vec<MappingRow> = config
            .mapping
            .iter()
            .map(|(code, unit)| (code.clone(), unit.clone()))
            .collect();
        if let Some(file) = &config.mapping_file {
            let path = settings.resolve(file);
            let rows = load_mapping_file(&path)?;
            tracing::debug!(path = %path.display(), rows = rows.len(), "Loaded org unit mapping file");
            mapping.extend(rows);
        }

        Ok(Self {
            field_name: config.field_name.clone(),
            code_field: config.code_field().to_string(),
            fallback,
            prefix_length: config.prefix_length,
            mapping,
            known: None,
        })
    }

    /// Restrict results to organisation units known to the destination
    pub fn with_known_org_units(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.known = Some(ids.into_iter().collect());
        self
    }

    fn is_known(&self, id: &OrgUnitId) -> bool {
        self.known
            .as_ref()
            .map_or(true, |known| known.contains(id.as_str()))
    }

    fn accept(&self, candidate: Option<OrgUnitId>, source: ResolutionSource) -> Option<OrgUnitResolution> {
        let org_unit = candidate?;
        if !self.is_known(&org_unit) {
            tracing::debug!(org_unit = %org_unit, source = %source, "Candidate unknown to destination");
            return None;
        }
        Some(OrgUnitResolution::Resolved { org_unit, source })
    }

    /// Whether a raw field value can be used as a unit id as it stands
    ///
    /// Against discovered units it must be one of them; otherwise it must
    /// have the UID shape. Anything else is a code for the mapping table.
    fn is_literal_id(&self, value: &str) -> bool {
        match &self.known {
            Some(known) => known.contains(value),
            None => OrgUnitId::is_uid(value),
        }
    }

    /// Resolve the organisation unit of one record; never fails
    pub fn resolve(&self, record: &VaRecord) -> OrgUnitResolution {
        let literals = field_values(record, &self.field_name);
        let literal = match literals.as_slice() {
            [single] if self.is_literal_id(single) => OrgUnitId::new(*single).ok(),
            _ => None,
        };
        if let Some(resolved) = self.accept(literal, ResolutionSource::RecordField) {
            return resolved;
        }

        if let Some(resolved) = self.accept(self.fallback.clone(), ResolutionSource::Fallback) {
            return resolved;
        }

        let raw_code = field_values(record, &self.code_field)
            .first()
            .or_else(|| literals.first())
            .map(|v| v.to_string())
            .unwrap_or_default();
        let mapped = lookup_org_unit(&raw_code, self.prefix_length, &self.mapping);
        if let Some(resolved) = self.accept(mapped, ResolutionSource::Mapping) {
            return resolved;
        }

        OrgUnitResolution::Unresolved {
            raw_value: raw_code,
        }
    }
}
