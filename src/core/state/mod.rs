// Transfer state: store wrapper, run bookkeeping and quarantine repair

pub mod manager;
pub mod repair;
pub mod watermark;

pub use manager::StateManager;
pub use repair::{repair_quarantined, RepairTarget};
pub use watermark::{RunStatus, RunWatermark};
