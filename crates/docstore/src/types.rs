//! Data model shared by clients, the retry wrapper and the bulk engine

use std::time::Duration;

use common::Secret;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header carrying the server's suggested delay on throttled responses.
pub const RETRY_AFTER_MS_HEADER: &str = "x-ms-retry-after-ms";

/// Addresses one document for deletion.
///
/// Deserializes from the shape documents are listed in:
/// `{"id": "...", "_rid": "...", "partitionKey": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIdentifier {
    pub id: String,
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(
        rename = "partitionKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partition_key: Option<serde_json::Value>,
}

impl DocumentIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_id: None,
            partition_key: None,
        }
    }

    pub fn with_partition_key(mut self, partition_key: serde_json::Value) -> Self {
        self.partition_key = Some(partition_key);
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Usable for deletion only with a non-empty id.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    /// Partition key as it should be sent: an empty array becomes absent,
    /// since the platform rejects `[]` but accepts omission.
    pub fn normalized_partition_key(&self) -> Option<serde_json::Value> {
        match &self.partition_key {
            Some(serde_json::Value::Array(values)) if values.is_empty() => None,
            other => other.clone(),
        }
    }
}

/// Database + container a bulk call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub database: String,
    pub container: String,
}

impl ContainerRef {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }

    /// Resource link used for request signing (unencoded).
    pub fn document_link(&self, id: &str) -> String {
        format!("dbs/{}/colls/{}/docs/{}", self.database, self.container, id)
    }

    /// Request path with each segment percent-encoded.
    pub fn document_path(&self, id: &str) -> String {
        format!(
            "dbs/{}/colls/{}/docs/{}",
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.container),
            urlencoding::encode(id)
        )
    }
}

/// One item in a bulk call.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Delete {
        id: String,
        partition_key: Option<serde_json::Value>,
    },
}

impl BulkOperation {
    /// Delete operation for an identifier, with its partition key normalized.
    pub fn delete(identifier: &DocumentIdentifier) -> Self {
        BulkOperation::Delete {
            id: identifier.id.clone(),
            partition_key: identifier.normalized_partition_key(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Delete { id, .. } => id,
        }
    }

    pub fn partition_key(&self) -> Option<&serde_json::Value> {
        match self {
            BulkOperation::Delete { partition_key, .. } => partition_key.as_ref(),
        }
    }
}

/// Outcome of one operation inside a bulk call.
#[derive(Debug, Clone)]
pub enum BulkItemResult {
    /// The service processed the item (status below 400).
    Response {
        status_code: u16,
        headers: HeaderMap,
    },
    /// The service rejected the item.
    Error {
        code: u16,
        retry_after: Option<Duration>,
        message: String,
    },
}

impl BulkItemResult {
    /// Processed item without headers.
    pub fn processed(status_code: u16) -> Self {
        BulkItemResult::Response {
            status_code,
            headers: HeaderMap::new(),
        }
    }

    pub fn rejected(code: u16, retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        BulkItemResult::Error {
            code,
            retry_after,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            BulkItemResult::Response { status_code, .. } => *status_code,
            BulkItemResult::Error { code, .. } => *code,
        }
    }

    /// Suggested delay before retrying, from the error or the response headers.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BulkItemResult::Error { retry_after, .. } => *retry_after,
            BulkItemResult::Response { headers, .. } => retry_after_from_headers(headers),
        }
    }
}

/// Parse `x-ms-retry-after-ms` (integer or fractional milliseconds).
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER_MS_HEADER)?.to_str().ok()?;
    let millis: f64 = raw.trim().parse().ok()?;
    (millis.is_finite() && millis >= 0.0).then(|| Duration::from_micros((millis * 1000.0) as u64))
}

/// Per-call options threaded from the retry wrapper into client construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Accumulated re-authentication directives, in arrival order.
    pub challenges: Vec<String>,
}

impl RequestOptions {
    /// Merge new directives, skipping ones already present.
    pub fn merge_challenges<I>(&mut self, challenges: I)
    where
        I: IntoIterator<Item = String>,
    {
        for challenge in challenges {
            if !self.challenges.contains(&challenge) {
                self.challenges.push(challenge);
            }
        }
    }

    pub fn has_challenges(&self) -> bool {
        !self.challenges.is_empty()
    }
}

/// Identity token with its expiry as a unix timestamp in milliseconds.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: Secret<String>,
    pub expires_at: u64,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: u64) -> Self {
        Self {
            token: Secret::new(token.into()),
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn identifier_deserializes_listing_shape() {
        let parsed: DocumentIdentifier =
            serde_json::from_value(json!({"id": "a1", "_rid": "AbC==", "partitionKey": ["tenant-1"]}))
                .unwrap();
        assert_eq!(parsed.id, "a1");
        assert_eq!(parsed.resource_id.as_deref(), Some("AbC=="));
        assert_eq!(parsed.partition_key, Some(json!(["tenant-1"])));
    }

    #[test]
    fn empty_id_is_invalid() {
        assert!(!DocumentIdentifier::new("").is_valid());
        assert!(DocumentIdentifier::new("x").is_valid());
    }

    #[test]
    fn empty_array_partition_key_is_sent_as_absent() {
        let id = DocumentIdentifier::new("doc").with_partition_key(json!([]));
        assert_eq!(id.normalized_partition_key(), None);

        let op = BulkOperation::delete(&id);
        assert_eq!(op.partition_key(), None);
    }

    #[test]
    fn non_empty_partition_keys_pass_through() {
        let scalar = DocumentIdentifier::new("doc").with_partition_key(json!("pk"));
        assert_eq!(scalar.normalized_partition_key(), Some(json!("pk")));

        let hierarchical = DocumentIdentifier::new("doc").with_partition_key(json!(["a", "b"]));
        assert_eq!(hierarchical.normalized_partition_key(), Some(json!(["a", "b"])));
    }

    #[test]
    fn document_path_encodes_segments() {
        let container = ContainerRef::new("db one", "items");
        assert_eq!(container.document_link("a/b"), "dbs/db one/colls/items/docs/a/b");
        assert_eq!(container.document_path("a/b"), "dbs/db%20one/colls/items/docs/a%2Fb");
    }

    #[test]
    fn retry_after_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER_MS_HEADER, HeaderValue::from_static("250.5"));
        let result = BulkItemResult::Response {
            status_code: 429,
            headers,
        };
        assert_eq!(result.retry_after(), Some(Duration::from_micros(250_500)));
        assert_eq!(result.status_code(), 429);
    }

    #[test]
    fn retry_after_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER_MS_HEADER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_from_headers(&headers), None);
    }

    #[test]
    fn merge_challenges_deduplicates() {
        let mut options = RequestOptions::default();
        options.merge_challenges(vec!["Bearer realm=x".to_string()]);
        options.merge_challenges(vec!["Bearer realm=x".to_string(), "PoP nonce=1".to_string()]);
        assert_eq!(options.challenges, vec!["Bearer realm=x", "PoP nonce=1"]);
        assert!(options.has_challenges());
    }
}
