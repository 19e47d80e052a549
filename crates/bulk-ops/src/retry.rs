//! Claims-challenge retry around a single document-store call
//!
//! Each attempt builds a fresh client from the connection and the options
//! accumulated so far. A 401 carrying at least one challenge merges the
//! challenges into the options and tries once more; every other failure is
//! returned unchanged. Between attempts the task yields to the scheduler so
//! the retry runs as a new continuation instead of a nested call.

use std::future::Future;
use std::sync::Arc;

use cosmos_auth::{ClientBuilder, Connection};
use docstore::{DocumentClient, RequestOptions};
use tracing::{debug, warn};

use crate::metrics;

/// Attempts per wrapped call (one retry).
pub const MAX_ATTEMPTS: u32 = 2;

/// State of one wrapped invocation.
#[derive(Debug)]
struct RetryContext {
    attempt: u32,
    max_attempts: u32,
    pending_options: RequestOptions,
}

/// Wraps document-store calls with one claims-challenge retry.
#[derive(Clone)]
pub struct ClaimsChallengeRetry {
    builder: Arc<dyn ClientBuilder>,
}

impl ClaimsChallengeRetry {
    pub fn new(builder: Arc<dyn ClientBuilder>) -> Self {
        Self { builder }
    }

    /// Run `operation` against a client for `connection`, retrying once on a
    /// claims challenge. On exhaustion the last error is returned.
    pub async fn with_retry<T, F, Fut>(
        &self,
        connection: &Connection,
        options: Option<RequestOptions>,
        mut operation: F,
    ) -> docstore::Result<T>
    where
        F: FnMut(Arc<dyn DocumentClient>) -> Fut,
        Fut: Future<Output = docstore::Result<T>>,
    {
        let mut context = RetryContext {
            attempt: 0,
            max_attempts: MAX_ATTEMPTS,
            pending_options: options.unwrap_or_default(),
        };

        loop {
            context.attempt += 1;
            let client = self.builder.build(connection, &context.pending_options)?;

            let err = match operation(client).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let challenges = err.claims_challenges();
            if challenges.is_empty() {
                return Err(err);
            }
            if context.attempt >= context.max_attempts {
                warn!(
                    attempts = context.attempt,
                    "claims challenge persisted after re-authentication"
                );
                return Err(err);
            }

            warn!(
                attempt = context.attempt,
                challenges = challenges.len(),
                "claims challenge received, retrying with re-authentication"
            );
            metrics::record_claims_retry();
            context
                .pending_options
                .merge_challenges(challenges.iter().cloned());
            debug!(options = ?context.pending_options, "retry options updated");

            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBuilder, ScriptedClient, connection, unauthorized};
    use docstore::{BulkItemResult, BulkOperation, ContainerRef};
    use tokio_util::sync::CancellationToken;

    fn ops() -> Vec<BulkOperation> {
        vec![BulkOperation::Delete {
            id: "a".into(),
            partition_key: None,
        }]
    }

    async fn run(
        retry: &ClaimsChallengeRetry,
        options: Option<RequestOptions>,
    ) -> docstore::Result<Vec<BulkItemResult>> {
        let container = ContainerRef::new("db", "items");
        let operations = ops();
        let cancel = CancellationToken::new();
        let (container, operations, cancel) = (&container, &operations, &cancel);
        retry
            .with_retry(&connection(), options, move |client| async move {
                client.execute_bulk(container, operations, cancel).await
            })
            .await
    }

    #[tokio::test]
    async fn success_needs_one_attempt() {
        let client = ScriptedClient::new(|_, ops| Ok(vec![BulkItemResult::processed(204); ops.len()]));
        let builder = FakeBuilder::new(client.clone());
        let retry = ClaimsChallengeRetry::new(builder.clone());

        let results = run(&retry, None).await.unwrap();
        assert_eq!(results[0].status_code(), 204);
        assert_eq!(client.call_count(), 1);
        assert_eq!(builder.options_seen(), vec![RequestOptions::default()]);
    }

    #[tokio::test]
    async fn challenge_triggers_exactly_one_retry_with_challenge() {
        let client = ScriptedClient::new(|call, ops| {
            if call == 0 {
                Err(unauthorized(&["Bearer realm=x"]))
            } else {
                Ok(vec![BulkItemResult::processed(204); ops.len()])
            }
        });
        let builder = FakeBuilder::new(client.clone());
        let retry = ClaimsChallengeRetry::new(builder.clone());

        run(&retry, None).await.unwrap();
        assert_eq!(client.call_count(), 2);
        let seen = builder.options_seen();
        assert!(seen[0].challenges.is_empty());
        assert_eq!(seen[1].challenges, vec!["Bearer realm=x"]);
    }

    #[tokio::test]
    async fn second_challenge_exhausts_without_third_attempt() {
        let client = ScriptedClient::new(|_, _| Err(unauthorized(&["Bearer realm=x"])));
        let builder = FakeBuilder::new(client.clone());
        let retry = ClaimsChallengeRetry::new(builder);

        let err = run(&retry, None).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn unauthorized_without_challenge_is_not_retried() {
        let client = ScriptedClient::new(|_, _| Err(unauthorized(&[])));
        let retry = ClaimsChallengeRetry::new(FakeBuilder::new(client.clone()));

        let err = run(&retry, None).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let client = ScriptedClient::new(|_, _| Err(docstore::Error::Timeout("60s".into())));
        let retry = ClaimsChallengeRetry::new(FakeBuilder::new(client.clone()));

        let err = run(&retry, None).await.unwrap_err();
        assert!(matches!(err, docstore::Error::Timeout(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn caller_options_are_kept_and_extended() {
        let client = ScriptedClient::new(|call, ops| {
            if call == 0 {
                Err(unauthorized(&["PoP nonce=\"n\""]))
            } else {
                Ok(vec![BulkItemResult::processed(204); ops.len()])
            }
        });
        let builder = FakeBuilder::new(client);
        let retry = ClaimsChallengeRetry::new(builder.clone());
        let options = RequestOptions {
            challenges: vec!["Bearer realm=x".into()],
        };

        run(&retry, Some(options)).await.unwrap();
        assert_eq!(
            builder.options_seen()[1].challenges,
            vec!["Bearer realm=x", "PoP nonce=\"n\""]
        );
    }

    #[tokio::test]
    async fn many_chained_calls_do_not_grow_the_stack() {
        let client = ScriptedClient::new(|call, ops| {
            if call % 2 == 0 {
                Err(unauthorized(&["Bearer realm=x"]))
            } else {
                Ok(vec![BulkItemResult::processed(204); ops.len()])
            }
        });
        let retry = ClaimsChallengeRetry::new(FakeBuilder::new(client.clone()));

        for _ in 0..500 {
            run(&retry, None).await.unwrap();
        }
        assert_eq!(client.call_count(), 1000);
    }

    #[tokio::test]
    async fn build_failure_is_returned() {
        let retry = ClaimsChallengeRetry::new(FakeBuilder::failing());
        let err = run(&retry, None).await.unwrap_err();
        assert!(matches!(err, docstore::Error::Config(_)));
    }
}
