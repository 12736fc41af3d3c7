//! Error types shared across the habitloop crates.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Failures inside a single batch or pull step are caught and aggregated
/// by the pipelines; only the outermost entry points surface one of these.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No stable user identity. Public entry points treat this as
    /// "skip, not error"; it only surfaces from internal paths that
    /// require a signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Local store read failure.
    #[error("local fetch failed: {0}")]
    FetchFailed(String),

    /// Remote write or transaction failure.
    #[error("remote write failed: {0}")]
    WriteFailed(String),

    /// Malformed date, id, or document payload.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// One or more batches in a push failed while others succeeded.
    #[error("{failed} of {total} batches failed: {first_error}")]
    PartialBatchFailure {
        failed: usize,
        total: usize,
        first_error: String,
    },
}

impl SyncError {
    /// Create a local fetch error.
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed(message.into())
    }

    /// Create a remote write error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed(message.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// True when the error is the guest-identity sentinel.
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}
