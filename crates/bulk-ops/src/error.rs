//! Error types for bulk operations

/// Errors a bulk operation returns to its caller.
///
/// Per-item throttling and failures are never errors; they are folded into
/// the batch status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected before any network call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("session has been disposed")]
    Disposed,

    /// Aborts the whole operation (timeout, transport failure, malformed
    /// response, exhausted authorization).
    #[error("bulk operation failed: {0}")]
    Fatal(#[from] docstore::Error),
}

/// Result alias for bulk operations.
pub type Result<T> = std::result::Result<T, Error>;
