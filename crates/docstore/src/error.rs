//! Error types for document-store calls

use crate::types::BulkItemResult;

/// Call-level failures from the document store.
///
/// Per-item outcomes inside a bulk call never surface here; see
/// `BulkItemResult`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service answered, but rejected the call as a whole.
    #[error("request failed with status {status}: {message}")]
    Response {
        status: u16,
        message: String,
        /// Re-authentication directives from `WWW-Authenticate`, if any.
        challenges: Vec<String>,
    },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("client configuration error: {0}")]
    Config(String),

    /// A call rejected part-way: the service had already processed some
    /// items. `completed` is aligned with the submitted operations; `None`
    /// marks items that were not processed and may be re-sent.
    #[error("bulk call interrupted after {processed} processed item(s): {source}")]
    Incomplete {
        processed: usize,
        completed: Vec<Option<BulkItemResult>>,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap `source` with the per-item results processed before it.
    pub fn incomplete(completed: Vec<Option<BulkItemResult>>, source: Error) -> Self {
        Error::Incomplete {
            processed: completed.iter().flatten().count(),
            completed,
            source: Box::new(source),
        }
    }

    /// HTTP status for structured service responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Response { status, .. } => Some(*status),
            Error::Incomplete { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Items the service processed before the call was rejected, aligned
    /// with the submitted operations.
    pub fn completed_items(&self) -> Option<&[Option<BulkItemResult>]> {
        match self {
            Error::Incomplete { completed, .. } => Some(completed),
            _ => None,
        }
    }

    /// Claims-challenge directives carried by a 401 response.
    ///
    /// Empty for every other error, including a 401 without an extractable
    /// challenge.
    pub fn claims_challenges(&self) -> &[String] {
        match self {
            Error::Response {
                status: 401,
                challenges,
                ..
            } => challenges,
            Error::Incomplete { source, .. } => source.claims_challenges(),
            _ => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Response { status: 401, .. } => "unauthorized",
            Error::Response { .. } => "response",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::Transport(_) => "transport",
            Error::MalformedResponse(_) => "malformed_response",
            Error::Auth(_) => "auth",
            Error::Config(_) => "config",
            Error::Incomplete { source, .. } => source.kind(),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_decode() {
            Error::MalformedResponse(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

/// Result alias for document-store calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized(challenges: &[&str]) -> Error {
        Error::Response {
            status: 401,
            message: "token lacks required claims".into(),
            challenges: challenges.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn challenges_exposed_only_for_401() {
        let err = unauthorized(&["Bearer realm=x"]);
        assert_eq!(err.claims_challenges(), ["Bearer realm=x".to_string()]);

        let forbidden = Error::Response {
            status: 403,
            message: "forbidden".into(),
            challenges: vec!["Bearer realm=x".into()],
        };
        assert!(forbidden.claims_challenges().is_empty());
        assert!(Error::Timeout("60s".into()).claims_challenges().is_empty());
    }

    #[test]
    fn status_only_for_responses() {
        assert_eq!(unauthorized(&[]).status(), Some(401));
        assert_eq!(Error::Cancelled.status(), None);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(unauthorized(&[]).kind(), "unauthorized");
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::MalformedResponse("x".into()).kind(), "malformed_response");
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Timeout("x".into()).is_cancelled());
    }

    #[test]
    fn incomplete_exposes_inner_challenges_and_items() {
        let err = Error::incomplete(
            vec![Some(BulkItemResult::processed(204)), None],
            unauthorized(&["Bearer realm=x"]),
        );
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.claims_challenges(), ["Bearer realm=x".to_string()]);
        assert_eq!(err.kind(), "unauthorized");
        let completed = err.completed_items().unwrap();
        assert_eq!(completed.len(), 2);
        assert!(completed[1].is_none());
        assert!(err.to_string().starts_with("bulk call interrupted after 1 processed item(s)"));
        assert!(unauthorized(&[]).completed_items().is_none());
    }

    #[test]
    fn display_includes_status() {
        let msg = unauthorized(&[]).to_string();
        assert!(msg.contains("401"), "got: {msg}");
    }
}
