//! Resilient bulk document operations
//!
//! Two pieces sit on top of `cosmos-auth` and `docstore`:
//!
//! - `ClaimsChallengeRetry` wraps any document-store call: on a 401 carrying
//!   a claims challenge it rebuilds the client with the challenge attached and
//!   retries exactly once
//! - `BulkDeleteSession` deletes many documents in rounds of concurrent
//!   bulk calls, backing off on throttling, and reports progress and one
//!   final outcome through `DeleteEvent`s
//!
//! Per-item throttling and failures are folded into `DeleteBatchStatus`;
//! only validation problems, disposal and session-fatal call failures are
//! returned as errors.

pub mod classify;
pub mod delete;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod status;

#[cfg(test)]
mod testing;

pub use classify::{ItemOutcome, classify};
pub use delete::{BulkDeleteConfig, BulkDeleteSession};
pub use error::{Error, Result};
pub use retry::{ClaimsChallengeRetry, MAX_ATTEMPTS};
pub use status::{DeleteBatchStatus, DeleteEvent, DeleteOutcome, DeleteProgress};
