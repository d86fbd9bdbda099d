//! Domain error types
//!
//! This module defines the error hierarchy for vatransfer. Every error maps to
//! one [`ErrorCategory`] of the run-level taxonomy, which decides how the
//! caller reacts (abort before processing, abort mid-run, exit code).
//! Third-party error types are converted to strings at this boundary.

use thiserror::Error;

/// Main vatransfer error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// DHIS2-related errors
    #[error("DHIS2 error: {0}")]
    Dhis(#[from] DhisError),

    /// Transfer store errors
    #[error("Transfer store error: {0}")]
    Store(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Delimited file errors (exports, cause-of-death results, storage file)
    #[error("CSV error: {0}")]
    Csv(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// DHIS2-specific errors
///
/// Errors that occur when talking to the destination server. These errors
/// don't expose the HTTP client's types.
#[derive(Debug, Error)]
pub enum DhisError {
    /// Failed to connect to the DHIS2 server
    #[error("Failed to connect to DHIS2 server: {0}")]
    ConnectionFailed(String),

    /// Credentials were rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No program with the configured name exists
    #[error("Program not found: {0}")]
    ProgramNotFound(String),

    /// More than one program matched the configured name
    #[error("Program name '{name}' is ambiguous: {count} programs matched")]
    AmbiguousProgram { name: String, count: usize },

    /// Organisation unit discovery failed
    #[error("Organisation unit discovery failed: {status} - {message}")]
    OrgUnitDiscoveryFailed { status: u16, message: String },

    /// Tracked entity search failed
    #[error("Tracked entity query failed: {status} - {message}")]
    QueryFailed { status: u16, message: String },

    /// File resource upload failed
    #[error("Blob upload failed: {status} - {message}")]
    UploadFailed { status: u16, message: String },

    /// Tracked entity batch submission failed
    #[error("Tracked entity submission failed: {status} - {message}")]
    SubmissionFailed { status: u16, message: String },

    /// Invalid response from server
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

/// Run-level error taxonomy
///
/// Resolution gaps and verification gaps are not errors and never appear here;
/// they are reported through the run summary instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration or identity problems; fatal before any record is processed
    Configuration,
    /// Local files or directories could not be read or created
    LocalIo,
    /// A destination call failed or returned non-2xx
    Delivery,
    /// The transfer store failed outside a per-record commit
    Store,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Process exit code used by the CLI for this category
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Configuration => 2,
            ErrorCategory::LocalIo => 3,
            ErrorCategory::Delivery => 4,
            ErrorCategory::Store | ErrorCategory::Other => 5,
        }
    }
}

impl TransferError {
    /// Classify this error into the run-level taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransferError::Configuration(_) | TransferError::Validation(_) => {
                ErrorCategory::Configuration
            }
            TransferError::Dhis(e) => e.category(),
            TransferError::Store(_) => ErrorCategory::Store,
            TransferError::Io(_) | TransferError::Csv(_) => ErrorCategory::LocalIo,
            TransferError::Serialization(_) | TransferError::Other(_) => ErrorCategory::Other,
        }
    }
}

impl DhisError {
    /// Identity problems are configuration errors, everything else is delivery
    pub fn category(&self) -> ErrorCategory {
        match self {
            DhisError::AuthenticationFailed(_)
            | DhisError::ProgramNotFound(_)
            | DhisError::AmbiguousProgram { .. } => ErrorCategory::Configuration,
            _ => ErrorCategory::Delivery,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for TransferError {
    fn from(err: serde_json::Error) -> Self {
        TransferError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for TransferError {
    fn from(err: toml::de::Error) -> Self {
        TransferError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<rusqlite::Error> for TransferError {
    fn from(err: rusqlite::Error) -> Self {
        TransferError::Store(err.to_string())
    }
}

impl From<csv::Error> for TransferError {
    fn from(err: csv::Error) -> Self {
        TransferError::Csv(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display() {
        let err = TransferError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_dhis_error_conversion() {
        let dhis_err = DhisError::ConnectionFailed("Network error".to_string());
        let err: TransferError = dhis_err.into();
        assert!(matches!(err, TransferError::Dhis(_)));
    }

    #[test]
    fn test_identity_errors_are_configuration() {
        let err: TransferError = DhisError::AuthenticationFailed("401".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err: TransferError = DhisError::AmbiguousProgram {
            name: "Verbal Autopsy".to_string(),
            count: 2,
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.category().exit_code(), 2);
    }

    #[test]
    fn test_non_2xx_is_delivery() {
        let err: TransferError = DhisError::UploadFailed {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Delivery);
        assert_eq!(err.category().exit_code(), 4);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TransferError = io_err.into();
        assert!(matches!(err, TransferError::Io(_)));
        assert_eq!(err.category(), ErrorCategory::LocalIo);
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TransferError = json_err.into();
        assert!(matches!(err, TransferError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TransferError = toml_err.into();
        assert!(matches!(err, TransferError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_store_error_category() {
        let err = TransferError::Store("disk full".to_string());
        assert_eq!(err.category(), ErrorCategory::Store);
        assert_eq!(err.category().exit_code(), 5);
    }

    #[test]
    fn test_transfer_error_implements_std_error() {
        let err = TransferError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
