//! Domain models and types for vatransfer.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`InstanceId`], [`SerialNo`], [`OrgUnitId`], [`TrackedEntityId`])
//! - **Record model** ([`VaRecord`], [`VaBatch`], [`CauseAssignment`])
//! - **Destination payloads** ([`TrackedEntityPayload`] and its enrollment/event parts)
//! - **Transfer state** ([`OutcomeRecord`], [`QuarantineRecord`], [`EventLogEntry`])
//! - **Error types** ([`TransferError`], [`DhisError`], [`ErrorCategory`])
//!
//! # Type Safety
//!
//! Identifiers are newtypes so the submission id and the business key can't be
//! swapped by accident:
//!
//! ```rust
//! use vatransfer::domain::{InstanceId, SerialNo};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let instance_id = InstanceId::new("uuid:0b3c5e8a")?;
//! let serial_no = SerialNo::new("S-1001")?;
//!
//! // let wrong: InstanceId = serial_no;  // Compile error
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod org_unit;
pub mod outcome;
pub mod record;
pub mod result;
pub mod tracked_entity;

// Re-export commonly used types for convenience
pub use errors::{DhisError, ErrorCategory, TransferError};
pub use ids::{InstanceId, OrgUnitId, SerialNo, TrackedEntityId};
pub use org_unit::{OrgUnitResolution, ResolutionSource};
pub use outcome::{
    DestinationIds, EventCategory, EventLogEntry, OutcomeLabel, OutcomeRecord, QuarantineRecord,
};
pub use record::{
    AlgorithmMetadata, CauseAssignment, ColumnSchema, VaBatch, VaRecord, CAUSE_COLUMN,
    COD_METADATA_COLUMN,
};
pub use result::Result;
pub use tracked_entity::{
    AttributeValue, DataValue, Enrollment, Event, ExistingTrackedEntity, ImportStatus,
    ImportSummary, Program, ReconcileAction, SubmissionResult, TrackedEntityPayload,
};
