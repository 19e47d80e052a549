//! Multi-round bulk delete
//!
//! A `BulkDeleteSession` deletes documents from one container:
//! 1. Validate: split identifiers on empty ids; invalid ones never hit the network
//! 2. Confirm: ask the caller; a refusal or a failed prompt aborts
//! 3. Process in rounds: chunk, submit all chunks concurrently through the
//!    claims-challenge retry, classify every item, emit progress
//! 4. Re-submit throttled items after the largest retry-after of the round
//!
//! Rounds are sequential; only the chunk calls inside a round run
//! concurrently. The batch status has a single writer (this task).
//!
//! Cancellation (caller signal or `dispose()`) ends the run as `Aborted`
//! and drops in-flight calls. Call-level failures other than cancellation
//! are session-fatal: the run finishes as `Aborted` and the error is
//! returned.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use cosmos_auth::Connection;
use docstore::{
    BulkItemResult, BulkOperation, ContainerRef, DocumentIdentifier, MAX_BULK_OPERATIONS,
};
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classify::{ItemOutcome, classify};
use crate::error::{Error, Result};
use crate::metrics;
use crate::retry::ClaimsChallengeRetry;
use crate::status::{DeleteBatchStatus, DeleteEvent, DeleteOutcome};

/// Tuning for a bulk-delete session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeleteConfig {
    /// Identifiers per bulk call, `1..=MAX_BULK_OPERATIONS`.
    pub chunk_size: usize,
    /// Wait applied for throttled items that carry no retry-after.
    pub fallback_backoff: Duration,
}

impl Default for BulkDeleteConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_BULK_OPERATIONS,
            fallback_backoff: Duration::from_millis(1000),
        }
    }
}

impl BulkDeleteConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BULK_OPERATIONS).contains(&self.chunk_size) {
            return Err(Error::Validation(format!(
                "chunk_size must be between 1 and {MAX_BULK_OPERATIONS}, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// What one round produced.
#[derive(Debug, Default)]
struct RoundTally {
    deleted: Vec<DocumentIdentifier>,
    throttled: Vec<DocumentIdentifier>,
    failed: Vec<DocumentIdentifier>,
    backoff: Duration,
    fatal: Option<docstore::Error>,
    stopped: bool,
}

/// Per-item results of one chunk, aligned with it. `None` marks items the
/// service never processed; `error` is the failure that left them so.
#[derive(Debug)]
struct ChunkReply {
    items: Vec<Option<BulkItemResult>>,
    error: Option<docstore::Error>,
}

/// Bulk deletes against one container over one connection.
pub struct BulkDeleteSession {
    retry: ClaimsChallengeRetry,
    connection: Connection,
    container: ContainerRef,
    config: BulkDeleteConfig,
    disposed: CancellationToken,
}

impl BulkDeleteSession {
    pub fn new(
        retry: ClaimsChallengeRetry,
        connection: Connection,
        container: ContainerRef,
        config: BulkDeleteConfig,
    ) -> Result<Self> {
        config.validate()?;
        if container.database.is_empty() || container.container.is_empty() {
            return Err(Error::Validation(
                "database and container names must be non-empty".into(),
            ));
        }
        Ok(Self {
            retry,
            connection,
            container,
            config,
            disposed: CancellationToken::new(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Stop any running invocation and reject later ones.
    pub fn dispose(&self) {
        if !self.disposed.is_cancelled() {
            info!("disposing bulk delete session");
            self.disposed.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    /// Delete `identifiers`, reporting only through `events`.
    ///
    /// `confirm` receives the number of valid identifiers; `Ok(false)` or
    /// any error counts as declined. Exactly one `Finished` event is sent per
    /// call that passes the disposal check, including before a session-fatal
    /// error is returned.
    #[instrument(skip_all, fields(database = %self.container.database, container = %self.container.container))]
    pub async fn bulk_delete<C, Fut, E>(
        &self,
        identifiers: Vec<DocumentIdentifier>,
        confirm: C,
        cancel: &CancellationToken,
        events: &UnboundedSender<DeleteEvent>,
    ) -> Result<()>
    where
        C: FnOnce(usize) -> Fut,
        Fut: Future<Output = std::result::Result<bool, E>>,
        E: Display,
    {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let mut status = DeleteBatchStatus::partition(identifiers);
        metrics::record_items("invalid", status.invalid.len());
        info!(
            valid = status.valid.len(),
            invalid = status.invalid.len(),
            "bulk delete requested"
        );

        if status.valid.is_empty() {
            self.finish(status, events);
            return Ok(());
        }

        let confirmed = match confirm(status.valid.len()).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "confirmation failed, treating as declined");
                false
            }
        };
        if !confirmed {
            info!("bulk delete declined");
            status.aborted = true;
            self.finish(status, events);
            return Ok(());
        }

        let run = self.disposed.child_token();
        let mut pending = status.valid.clone();
        let mut backoff = Duration::ZERO;
        let mut round = 0u32;

        while !pending.is_empty() {
            if !backoff.is_zero() {
                debug!(backoff_ms = backoff.as_millis() as u64, "waiting before next round");
                metrics::record_backoff(backoff.as_secs_f64());
                let waited = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    _ = run.cancelled() => false,
                    _ = tokio::time::sleep(backoff) => true,
                };
                if !waited {
                    status.aborted = true;
                    break;
                }
            }
            if cancel.is_cancelled() || run.is_cancelled() {
                status.aborted = true;
                break;
            }

            round += 1;
            metrics::record_round();
            let tally = self.run_round(&pending, cancel, &run).await;

            metrics::record_items("deleted", tally.deleted.len());
            metrics::record_items("throttled", tally.throttled.len());
            metrics::record_items("failed", tally.failed.len());
            status.deleted.extend(tally.deleted);
            status.failed.extend(tally.failed);
            pending = tally.throttled;
            backoff = tally.backoff;

            if let Some(err) = tally.fatal {
                // Items of the failed chunk stay unclassified.
                error!(round, error = %err, kind = err.kind(), "bulk delete aborted by fatal error");
                status.throttled = pending;
                status.aborted = true;
                self.finish(status, events);
                return Err(Error::Fatal(err));
            }
            if tally.stopped {
                status.aborted = true;
                break;
            }

            status.throttled = pending.clone();
            let snapshot = status.snapshot();
            let message = format!(
                "Round {round}: {} deleted, {} throttled, {} failed of {} document(s)",
                snapshot.deleted,
                snapshot.throttled,
                snapshot.failed,
                status.valid.len()
            );
            info!(
                round,
                deleted = snapshot.deleted,
                throttled = snapshot.throttled,
                failed = snapshot.failed,
                "bulk delete round complete"
            );
            if events
                .send(DeleteEvent::Progress {
                    round,
                    message,
                    snapshot,
                })
                .is_err()
            {
                debug!(round, "event receiver dropped, progress not delivered");
            }

            // Re-queued items leave `throttled` until the next round classifies them.
            status.throttled.clear();
        }

        if status.aborted {
            // After the first round, anything still queued was throttled.
            if round > 0 {
                status.throttled = pending;
            }
            run.cancel();
            info!(round, "bulk delete cancelled");
        }
        self.finish(status, events);
        Ok(())
    }

    /// Submit every chunk of `input` concurrently and classify the results.
    async fn run_round(
        &self,
        input: &[DocumentIdentifier],
        cancel: &CancellationToken,
        run: &CancellationToken,
    ) -> RoundTally {
        let chunks: Vec<&[DocumentIdentifier]> = input.chunks(self.config.chunk_size).collect();
        debug!(items = input.len(), chunks = chunks.len(), "submitting round");

        let submissions = join_all(chunks.iter().map(|chunk| self.submit_chunk(chunk, run)));
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = run.cancelled() => None,
            results = submissions => Some(results),
        };

        let mut tally = RoundTally::default();
        let Some(results) = results else {
            tally.stopped = true;
            return tally;
        };

        let mut max_retry_after: Option<Duration> = None;
        for (chunk, reply) in chunks.iter().zip(results) {
            // Items processed before a call-level failure still count.
            for (identifier, item) in chunk.iter().zip(reply.items) {
                let Some(item) = item else { continue };
                match classify(&item) {
                    ItemOutcome::Deleted => tally.deleted.push(identifier.clone()),
                    ItemOutcome::Failed => {
                        debug!(id = %identifier.id, code = item.status_code(), "delete failed");
                        tally.failed.push(identifier.clone());
                    }
                    ItemOutcome::Throttled(retry_after) => {
                        let wait = retry_after.unwrap_or(self.config.fallback_backoff);
                        max_retry_after = Some(max_retry_after.map_or(wait, |m| m.max(wait)));
                        tally.throttled.push(identifier.clone());
                    }
                }
            }
            match reply.error {
                None => {}
                Some(e) if e.is_cancelled() && (cancel.is_cancelled() || run.is_cancelled()) => {
                    tally.stopped = true;
                }
                Some(e) => {
                    tally.fatal.get_or_insert(e);
                }
            }
        }
        tally.backoff = max_retry_after.unwrap_or_default();
        tally
    }

    /// One bulk call for one chunk, through the claims-challenge retry.
    ///
    /// A retry re-sends only the items the service has not processed yet,
    /// so a 401 arriving part-way through never deletes an item twice.
    async fn submit_chunk(
        &self,
        chunk: &[DocumentIdentifier],
        run: &CancellationToken,
    ) -> ChunkReply {
        let operations: Vec<BulkOperation> = chunk.iter().map(BulkOperation::delete).collect();
        let slots = Mutex::new(vec![None; operations.len()]);
        let (container, ops, slots_ref) = (&self.container, operations.as_slice(), &slots);

        let outcome = self
            .retry
            .with_retry(&self.connection, None, move |client| async move {
                let pending: Vec<usize> = slots_ref
                    .lock()
                    .await
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.is_none())
                    .map(|(index, _)| index)
                    .collect();
                let batch: Vec<BulkOperation> = pending.iter().map(|&i| ops[i].clone()).collect();

                match client.execute_bulk(container, &batch, run).await {
                    Ok(results) if results.len() == batch.len() => {
                        let mut slots = slots_ref.lock().await;
                        for (index, result) in pending.into_iter().zip(results) {
                            slots[index] = Some(result);
                        }
                        Ok(())
                    }
                    Ok(results) => Err(docstore::Error::MalformedResponse(format!(
                        "expected {} results, got {}",
                        batch.len(),
                        results.len()
                    ))),
                    Err(err) => {
                        if let Some(completed) = err.completed_items()
                            && completed.len() == batch.len()
                        {
                            let mut slots = slots_ref.lock().await;
                            for (&index, result) in pending.iter().zip(completed) {
                                if let Some(result) = result {
                                    slots[index] = Some(result.clone());
                                }
                            }
                            debug!(
                                processed = completed.iter().flatten().count(),
                                pending = batch.len(),
                                "kept items processed before the call failed"
                            );
                        }
                        Err(err)
                    }
                }
            })
            .await;

        ChunkReply {
            items: slots.into_inner(),
            error: outcome.err(),
        }
    }

    fn finish(&self, status: DeleteBatchStatus, events: &UnboundedSender<DeleteEvent>) {
        let outcome = DeleteOutcome::classify(&status);
        metrics::record_run(outcome.label());
        info!(
            outcome = outcome.label(),
            deleted = status.deleted.len(),
            throttled = status.throttled.len(),
            failed = status.failed.len(),
            invalid = status.invalid.len(),
            "bulk delete finished"
        );
        if events.send(DeleteEvent::Finished { outcome, status }).is_err() {
            debug!("event receiver dropped before completion");
        }
    }
}
