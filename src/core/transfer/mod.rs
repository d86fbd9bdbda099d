//! Run orchestration and destination posting

pub mod coordinator;
pub mod poster;
pub mod summary;

pub use coordinator::{PipelineStage, TransferCoordinator};
pub use poster::{DestinationPoster, PostReport, PostedRecord};
pub use summary::{PlannedTransfer, RunOutcome, RunSummary};
