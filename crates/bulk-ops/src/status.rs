//! Batch status, progress snapshots and terminal outcomes

use std::fmt;

use docstore::DocumentIdentifier;

/// Running state of one bulk-delete invocation.
///
/// `valid` always equals the items still pending plus `deleted`,
/// `throttled` and `failed`, with no item in two places. Only the
/// orchestrating task mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteBatchStatus {
    pub valid: Vec<DocumentIdentifier>,
    pub invalid: Vec<DocumentIdentifier>,
    pub deleted: Vec<DocumentIdentifier>,
    pub throttled: Vec<DocumentIdentifier>,
    pub failed: Vec<DocumentIdentifier>,
    pub aborted: bool,
}

impl DeleteBatchStatus {
    /// Split input into valid (non-empty id) and invalid identifiers,
    /// keeping input order within each side.
    pub fn partition(identifiers: Vec<DocumentIdentifier>) -> Self {
        let (valid, invalid): (Vec<_>, Vec<_>) =
            identifiers.into_iter().partition(DocumentIdentifier::is_valid);
        Self {
            valid,
            invalid,
            ..Default::default()
        }
    }

    /// Valid items not yet classified.
    pub fn pending(&self) -> usize {
        self.valid
            .len()
            .saturating_sub(self.deleted.len() + self.throttled.len() + self.failed.len())
    }

    pub fn snapshot(&self) -> DeleteProgress {
        DeleteProgress {
            total: self.valid.len() + self.invalid.len(),
            deleted: self.deleted.len(),
            throttled: self.throttled.len(),
            failed: self.failed.len(),
            invalid: self.invalid.len(),
            pending: self.pending(),
        }
    }
}

/// Counts at one observation point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteProgress {
    pub total: usize,
    pub deleted: usize,
    pub throttled: usize,
    pub failed: usize,
    pub invalid: usize,
    pub pending: usize,
}

/// Summary class of a finished invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Cancelled, declined, disposed, or ended by a session-fatal error.
    Aborted,
    NothingDeleted,
    Partial {
        deleted: usize,
        throttled: usize,
        failed: usize,
    },
    Success {
        deleted: usize,
    },
}

impl DeleteOutcome {
    pub fn classify(status: &DeleteBatchStatus) -> Self {
        let (deleted, throttled, failed) = (
            status.deleted.len(),
            status.throttled.len(),
            status.failed.len(),
        );
        if status.aborted {
            DeleteOutcome::Aborted
        } else if deleted + throttled + failed == 0 {
            DeleteOutcome::NothingDeleted
        } else if throttled + failed > 0 {
            DeleteOutcome::Partial {
                deleted,
                throttled,
                failed,
            }
        } else {
            DeleteOutcome::Success { deleted }
        }
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DeleteOutcome::Aborted => "aborted",
            DeleteOutcome::NothingDeleted => "nothing_deleted",
            DeleteOutcome::Partial { .. } => "partial",
            DeleteOutcome::Success { .. } => "success",
        }
    }
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::Aborted => write!(f, "Delete operation was aborted"),
            DeleteOutcome::NothingDeleted => write!(f, "No documents were deleted"),
            DeleteOutcome::Partial {
                deleted,
                throttled,
                failed,
            } => write!(
                f,
                "Deleted {deleted} document(s); {throttled} throttled and {failed} failed"
            ),
            DeleteOutcome::Success { deleted } => {
                write!(f, "Successfully deleted {deleted} document(s)")
            }
        }
    }
}

/// Events emitted by a bulk-delete invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteEvent {
    /// After each processing round.
    Progress {
        round: u32,
        message: String,
        snapshot: DeleteProgress,
    },
    /// Exactly once per invocation.
    Finished {
        outcome: DeleteOutcome,
        status: DeleteBatchStatus,
    },
}
