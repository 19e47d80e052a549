//! Error types for credential resolution and token acquisition

/// Errors from credential and token operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The caller's identity may not read account keys. Degrades to "no key".
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("key access failed: {0}")]
    KeyAccess(String),

    /// Every credential failed; the message lists each failure in order.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    #[error("identity provider error: {0}")]
    IdentityProvider(String),

    #[error("connectivity probe failed: {0}")]
    Probe(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for docstore::Error {
    fn from(err: Error) -> Self {
        docstore::Error::Auth(err.to_string())
    }
}
