//! Reconciliation of records against the destination
//!
//! - [`org_unit`] - where a record belongs
//! - [`tracked_entity`] - which tracked entity it creates or updates

pub mod org_unit;
pub mod tracked_entity;

pub use org_unit::{
    load_mapping_file, lookup_org_unit, MappingRow, OrgUnitResolver, ResolutionReport,
};
pub use tracked_entity::{select_match, TrackedEntityReconciler};
