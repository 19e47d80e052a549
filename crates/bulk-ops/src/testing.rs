//! Scripted collaborators for unit tests

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Secret;
use cosmos_auth::{AuthMethod, ClientBuilder, Connection, Credential, CredentialSet};
use docstore::{BulkItemResult, BulkOperation, ContainerRef, DocumentClient, RequestOptions};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Script =
    Box<dyn Fn(usize, &[BulkOperation]) -> docstore::Result<Vec<BulkItemResult>> + Send + Sync>;

/// One recorded bulk call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operations: Vec<BulkOperation>,
    pub at: Instant,
}

/// Document client answering from a script `(call index, operations) -> results`.
pub struct ScriptedClient {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl ScriptedClient {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(usize, &[BulkOperation]) -> docstore::Result<Vec<BulkItemResult>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(vec![]),
            latency: None,
        })
    }

    /// Like `new`, but every call takes `latency` and honours cancellation.
    pub fn slow<F>(latency: Duration, script: F) -> Arc<Self>
    where
        F: Fn(usize, &[BulkOperation]) -> docstore::Result<Vec<BulkItemResult>>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(vec![]),
            latency: Some(latency),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Chunk sizes in call order.
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.calls().iter().map(|c| c.operations.len()).collect()
    }
}

impl DocumentClient for ScriptedClient {
    fn execute_bulk<'a>(
        &'a self,
        _container: &'a ContainerRef,
        operations: &'a [BulkOperation],
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = docstore::Result<Vec<BulkItemResult>>> + Send + 'a>> {
        Box::pin(async move {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(RecordedCall {
                    operations: operations.to_vec(),
                    at: Instant::now(),
                });
                calls.len() - 1
            };
            if let Some(latency) = self.latency {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(docstore::Error::Cancelled),
                    _ = tokio::time::sleep(latency) => {}
                }
            }
            (self.script)(index, operations)
        })
    }
}

/// Client builder handing out one shared client and recording options.
pub struct FakeBuilder {
    client: Option<Arc<ScriptedClient>>,
    options: Mutex<Vec<RequestOptions>>,
}

impl FakeBuilder {
    pub fn new(client: Arc<ScriptedClient>) -> Arc<Self> {
        Arc::new(Self {
            client: Some(client),
            options: Mutex::new(vec![]),
        })
    }

    /// Builder whose every build fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            client: None,
            options: Mutex::new(vec![]),
        })
    }

    pub fn options_seen(&self) -> Vec<RequestOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl ClientBuilder for FakeBuilder {
    fn build(
        &self,
        _connection: &Connection,
        options: &RequestOptions,
    ) -> docstore::Result<Arc<dyn DocumentClient>> {
        self.options.lock().unwrap().push(options.clone());
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Err(docstore::Error::Config("no client".into())),
        }
    }
}

pub fn connection() -> Connection {
    Connection::new(
        "https://localhost:8081/",
        CredentialSet::from_discovered(
            vec![Credential::AccountKey {
                key: Secret::new("a2V5".into()),
            }],
            AuthMethod::Auto,
        ),
        true,
        AuthMethod::Auto,
    )
}

pub fn unauthorized(challenges: &[&str]) -> docstore::Error {
    docstore::Error::Response {
        status: 401,
        message: "unauthorized".into(),
        challenges: challenges.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn throttled(retry_after_ms: Option<u64>) -> BulkItemResult {
    BulkItemResult::rejected(
        429,
        retry_after_ms.map(Duration::from_millis),
        "Request rate is large",
    )
}
