//! Per-item result classification

use std::time::Duration;

use docstore::BulkItemResult;

/// Where a per-item result lands in the batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Deleted,
    /// Rate limited; carries the server's suggested delay, if any.
    Throttled(Option<Duration>),
    Failed,
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Deleted => "deleted",
            ItemOutcome::Throttled(_) => "throttled",
            ItemOutcome::Failed => "failed",
        }
    }
}

/// Classify a per-item result by status code.
///
/// 429 is throttled, any other code of 400 or above is failed, and
/// everything below 400 (normally 204) counts as deleted.
pub fn classify(result: &BulkItemResult) -> ItemOutcome {
    match result.status_code() {
        429 => ItemOutcome::Throttled(result.retry_after()),
        code if code >= 400 => ItemOutcome::Failed,
        _ => ItemOutcome::Deleted,
    }
}
