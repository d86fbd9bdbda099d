//! Result type alias for vatransfer

use super::errors::TransferError;

/// Result type alias for vatransfer operations
///
/// # Examples
///
/// ```
/// use vatransfer::domain::result::Result;
/// use vatransfer::domain::errors::TransferError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(TransferError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, TransferError>;
