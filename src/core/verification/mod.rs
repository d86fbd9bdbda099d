// Post verification of accepted records

pub mod report;
pub mod verify;

pub use report::{ConfirmedRecord, VerificationFailure, VerificationReport};
pub use verify::{VerificationRun, Verifier};
