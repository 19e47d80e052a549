//! HTTP document-store client
//!
//! Talks to the Cosmos DB REST API with reqwest. A bulk delete is executed
//! as one `DELETE` per operation with bounded concurrency; results keep the
//! input order. A 401 fails the call so the caller can react to a claims
//! challenge, but in-flight deletes still finish and items the service
//! already processed travel back inside `Error::Incomplete`. Every other
//! status is reported per item.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::header::{HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::challenge::parse_challenges;
use crate::error::{Error, Result};
use crate::signing::{master_key_authorization, rfc1123_now, token_authorization};
use crate::types::{BulkItemResult, BulkOperation, ContainerRef, retry_after_from_headers};
use crate::{DocumentClient, TokenCallback};

/// REST API version sent with every request.
pub const API_VERSION: &str = "2018-12-31";

const PARTITION_KEY_HEADER: &str = "x-ms-documentdb-partitionkey";

/// How a client authenticates its requests.
#[derive(Clone)]
pub enum ClientAuth {
    /// Sign each request with the account key.
    MasterKey(Secret<String>),
    /// Ask the callback for a bearer token per request.
    Token(Arc<dyn TokenCallback>),
}

impl std::fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientAuth::MasterKey(_) => write!(f, "MasterKey([REDACTED])"),
            ClientAuth::Token(_) => write!(f, "Token(..)"),
        }
    }
}

/// Reply for one item: processed by the service, or rejected as
/// unauthorized (the item was not processed).
enum ItemReply {
    Processed(BulkItemResult),
    Unauthorized(Error),
}

/// Transport settings for `HttpDocumentClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout enforced by the platform client.
    pub timeout: Duration,
    /// Concurrent item requests within one bulk call.
    pub max_in_flight: usize,
    /// Accept self-signed certificates (local emulator only).
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_in_flight: 16,
            accept_invalid_certs: false,
        }
    }
}

/// Document-store client over HTTPS.
#[derive(Debug)]
pub struct HttpDocumentClient {
    http: reqwest::Client,
    endpoint: Url,
    auth: ClientAuth,
    max_in_flight: usize,
}

impl HttpDocumentClient {
    pub fn new(endpoint: &str, auth: ClientAuth, config: &HttpClientConfig) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            auth,
            max_in_flight: config.max_in_flight.max(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Token scope for this account: `{scheme}://{host}/.default`.
    pub fn scope(&self) -> String {
        account_scope(&self.endpoint)
    }

    /// Read the database account resource.
    ///
    /// Cheap connectivity check: succeeds when the endpoint is reachable and
    /// accepts this client's credentials. Rejections come back as
    /// `Error::Response` with the service's message.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn read_account(&self) -> Result<()> {
        let request = self.http.get(self.endpoint.clone());
        let request = self.authorize(request, "GET", "", "").await?;
        let response = request.send().await.map_err(Error::from_reqwest)?;
        let status = response.status().as_u16();
        if status < 400 {
            debug!(status, "account read succeeded");
            return Ok(());
        }
        let challenges = challenges_of(response.headers());
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        Err(Error::Response {
            status,
            message,
            challenges,
        })
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let date = rfc1123_now();
        let authorization = match &self.auth {
            ClientAuth::MasterKey(key) => {
                master_key_authorization(key.expose(), verb, resource_type, resource_link, &date)?
            }
            ClientAuth::Token(callback) => {
                let scopes = [self.scope()];
                let token = callback.get_token(&scopes).await?;
                token_authorization(token.token.expose())
            }
        };
        Ok(request
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::AUTHORIZATION, authorization))
    }

    async fn delete_one(
        &self,
        container: &ContainerRef,
        operation: &BulkOperation,
    ) -> Result<ItemReply> {
        let id = operation.id();
        let url = self
            .endpoint
            .join(&container.document_path(id))
            .map_err(|e| Error::Config(format!("building document URL: {e}")))?;

        let mut request = self.http.delete(url);
        if let Some(partition_key) = operation.partition_key() {
            request = request.header(PARTITION_KEY_HEADER, partition_key_header(partition_key));
        }
        let request = self
            .authorize(request, "DELETE", "docs", &container.document_link(id))
            .await?;

        let response = request.send().await.map_err(Error::from_reqwest)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        if status == 401 {
            let challenges = challenges_of(&headers);
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(
                id,
                challenges = challenges.len(),
                "delete rejected as unauthorized"
            );
            return Ok(ItemReply::Unauthorized(Error::Response {
                status,
                message,
                challenges,
            }));
        }

        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            debug!(id, status, "delete rejected");
            return Ok(ItemReply::Processed(BulkItemResult::Error {
                code: status,
                retry_after: retry_after_from_headers(&headers),
                message,
            }));
        }

        Ok(ItemReply::Processed(BulkItemResult::Response {
            status_code: status,
            headers,
        }))
    }
}

impl DocumentClient for HttpDocumentClient {
    fn execute_bulk<'a>(
        &'a self,
        container: &'a ContainerRef,
        operations: &'a [BulkOperation],
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BulkItemResult>>> + Send + 'a>> {
        Box::pin(async move {
            debug!(
                database = %container.database,
                container = %container.container,
                operations = operations.len(),
                "executing bulk call"
            );
            let requests: Vec<_> = operations
                .iter()
                .map(|op| self.delete_one(container, op))
                .collect();
            let items = stream::iter(requests)
                .buffered(self.max_in_flight)
                .try_collect::<Vec<_>>();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                replies = items => into_results(replies?),
            }
        })
    }
}

/// Collapse per-item replies into the call result. All processed: `Ok`.
/// Nothing processed: the first 401. Otherwise `Error::Incomplete` so
/// the processed items are not lost.
fn into_results(replies: Vec<ItemReply>) -> Result<Vec<BulkItemResult>> {
    let mut completed = Vec::with_capacity(replies.len());
    let mut unauthorized = None;
    for reply in replies {
        match reply {
            ItemReply::Processed(result) => completed.push(Some(result)),
            ItemReply::Unauthorized(err) => {
                unauthorized.get_or_insert(err);
                completed.push(None);
            }
        }
    }
    match unauthorized {
        None => Ok(completed.into_iter().flatten().collect()),
        Some(err) if completed.iter().all(Option::is_none) => Err(err),
        Some(err) => {
            warn!(
                processed = completed.iter().flatten().count(),
                pending = completed.iter().filter(|c| c.is_none()).count(),
                "bulk call partially rejected as unauthorized"
            );
            Err(Error::incomplete(completed, err))
        }
    }
}

/// Validate and normalize an account endpoint (trailing slash kept so
/// relative joins land under it).
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint.trim())
        .map_err(|e| Error::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(Error::Config(format!(
            "endpoint must use http or https, got: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Config(format!("endpoint has no host: {endpoint}")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Default token scope for an account endpoint.
pub fn account_scope(endpoint: &Url) -> String {
    format!(
        "{}://{}/.default",
        endpoint.scheme(),
        endpoint.host_str().unwrap_or_default()
    )
}

fn challenges_of(headers: &HeaderMap) -> Vec<String> {
    parse_challenges(
        headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v: &HeaderValue| v.to_str().ok()),
    )
}

fn partition_key_header(partition_key: &serde_json::Value) -> String {
    match partition_key {
        serde_json::Value::Array(_) => partition_key.to_string(),
        single => serde_json::Value::Array(vec![single.clone()]).to_string(),
    }
}
