//! Error types for coverage access.

use thiserror::Error;

/// Result type alias using CoverageError.
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Primary error type for coverage read operations.
///
/// `Validation` and `Unsupported` abort a whole read call. `DataUnavailable`
/// and `DecodeFailure` are recovered per slice by the assembler.
#[derive(Debug, Error)]
pub enum CoverageError {
    // === Request Errors ===
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("coverage not found: {0}")]
    NotFound(String),

    // === Data Errors ===
    #[error("data not available: {0}")]
    DataUnavailable(String),

    #[error("failed to decode raster: {0}")]
    DecodeFailure(String),

    // === Collaborator Errors ===
    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoverageError {
    /// Create a Validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a DataUnavailable error.
    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    /// Create a DecodeFailure error.
    pub fn decode_failure(msg: impl Into<String>) -> Self {
        Self::DecodeFailure(msg.into())
    }

    /// Create a Catalog error.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for errors that only invalidate a single slice.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoverageError::DataUnavailable(_) | CoverageError::DecodeFailure(_)
        )
    }
}

impl From<std::io::Error> for CoverageError {
    fn from(err: std::io::Error) -> Self {
        CoverageError::Storage(err.to_string())
    }
}
