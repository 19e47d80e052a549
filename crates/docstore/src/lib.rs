//! Document-store client abstraction
//!
//! Defines the `DocumentClient` seam the bulk engine talks to, the data model
//! shared by every layer (identifiers, bulk operations, per-item results,
//! request options), and the HTTP implementation against the Cosmos DB REST
//! API. Authentication is pluggable through `ClientAuth`: either an account
//! key that signs each request, or a `TokenCallback` that supplies bearer
//! tokens on demand.

pub mod challenge;
pub mod error;
pub mod http;
pub mod signing;
pub mod types;

pub use challenge::{claims_parameter, parse_challenges};
pub use error::{Error, Result};
pub use http::{ClientAuth, HttpClientConfig, HttpDocumentClient};
pub use types::{
    AccessToken, BulkItemResult, BulkOperation, ContainerRef, DocumentIdentifier, RequestOptions,
};

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// Maximum number of operations the platform accepts in one bulk call.
pub const MAX_BULK_OPERATIONS: usize = 100;

/// A connected document-store client.
///
/// One call submits up to `MAX_BULK_OPERATIONS` independent operations and
/// resolves to one result per operation, in input order. Per-item failures
/// (throttling, not found, conflicts) are results, not errors; `Err` is
/// reserved for call-level failures such as an authorization challenge,
/// a timeout, or cancellation.
///
/// Uses `Pin<Box<dyn Future>>` return types so clients can be shared as
/// `Arc<dyn DocumentClient>`.
pub trait DocumentClient: Send + Sync {
    fn execute_bulk<'a>(
        &'a self,
        container: &'a ContainerRef,
        operations: &'a [BulkOperation],
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BulkItemResult>>> + Send + 'a>>;
}

/// Supplies identity tokens to a token-authenticated client.
///
/// Invoked lazily by the client with the scopes it needs. Implementations
/// decide which credential answers and whether interaction is allowed.
pub trait TokenCallback: Send + Sync {
    fn get_token<'a>(
        &'a self,
        scopes: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;
}
