//! Logging and observability
//!
//! `tracing` is the operational log. The transfer store's event table is the
//! audit trail; pipeline stages write to both.
//!
//! # Example
//!
//! ```no_run
//! use vatransfer::logging::init_logging;
//! use vatransfer::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(stage = "merge", "Pipeline started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the completion of a pipeline stage
///
/// # Example
///
/// ```no_run
/// use vatransfer::log_stage_complete;
///
/// log_stage_complete!("dedup", 12);
/// ```
#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr, $count:expr) => {
        tracing::info!(stage = $stage, records = $count, "Stage completed");
    };
}

/// Log a record that leaves the pipeline without being posted
///
/// # Example
///
/// ```no_run
/// use vatransfer::log_record_skipped;
///
/// log_record_skipped!("uuid:0b3c", "no cause assigned");
/// ```
#[macro_export]
macro_rules! log_record_skipped {
    ($instance_id:expr, $reason:expr) => {
        tracing::warn!(
            instance_id = %$instance_id,
            reason = %$reason,
            "Record skipped"
        );
    };
}

/// Log an error with context
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
