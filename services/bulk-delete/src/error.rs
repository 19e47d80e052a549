//! Service-specific error types

use thiserror::Error;

/// Failures of one CLI session.
///
/// Configuration problems surface earlier as `common::Error`; these cover
/// connecting to the account and running the delete.
#[derive(Error, Debug)]
pub enum Error {
    #[error("credential resolution failed: {0}")]
    Resolve(#[from] cosmos_auth::Error),

    #[error("bulk delete failed: {0}")]
    Bulk(#[from] bulk_ops::Error),

    #[error("invalid identifiers file: {0}")]
    Identifiers(String),
}

impl Error {
    /// True when the session's cached credentials should be discarded.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::Bulk(bulk_ops::Error::Fatal(e)) => {
                e.status() == Some(401) || matches!(e, docstore::Error::Auth(_))
            }
            _ => false,
        }
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
