//! Credentials, credential sets, connections and the credential cache
//!
//! A `CredentialSet` is rebuilt on every authentication attempt and is never
//! persisted. The `CredentialCache` keeps sets for live sessions in memory
//! under generated keys; the owner inserts after a successful
//! authentication and removes on failure or disconnect.

use std::collections::HashMap;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Authentication method an operator prefers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No preference: keys first when available, then identity.
    #[default]
    Auto,
    AccountKey,
    EntraId,
    ManagedIdentity,
}

impl AuthMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::Auto => "auto",
            AuthMethod::AccountKey => "account_key",
            AuthMethod::EntraId => "entra_id",
            AuthMethod::ManagedIdentity => "managed_identity",
        }
    }
}

/// One way of authenticating against an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    AccountKey { key: Secret<String> },
    EntraId { tenant_id: Option<String> },
    ManagedIdentity { client_id: Option<String> },
}

impl Credential {
    pub fn method(&self) -> AuthMethod {
        match self {
            Credential::AccountKey { .. } => AuthMethod::AccountKey,
            Credential::EntraId { .. } => AuthMethod::EntraId,
            Credential::ManagedIdentity { .. } => AuthMethod::ManagedIdentity,
        }
    }

    pub fn label(&self) -> &'static str {
        self.method().label()
    }
}

/// Ordered credentials for one account.
///
/// Invariants: at most one `AccountKey`; entries matching the preferred
/// method come first, otherwise discovery order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet(Vec<Credential>);

impl CredentialSet {
    /// Build a set from credentials in discovery order.
    ///
    /// Later account keys are dropped. Entries matching `preferred` are moved
    /// to the front, preserving relative order on both sides of the split.
    pub fn from_discovered(discovered: Vec<Credential>, preferred: AuthMethod) -> Self {
        let mut seen_key = false;
        let unique: Vec<Credential> = discovered
            .into_iter()
            .filter(|c| match c {
                Credential::AccountKey { .. } if seen_key => false,
                Credential::AccountKey { .. } => {
                    seen_key = true;
                    true
                }
                _ => true,
            })
            .collect();

        let (mut ordered, rest): (Vec<_>, Vec<_>) =
            unique.into_iter().partition(|c| c.method() == preferred);
        ordered.extend(rest);
        Self(ordered)
    }

    pub fn as_slice(&self) -> &[Credential] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Credential> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Credential> {
        self.0.first()
    }

    pub fn account_key(&self) -> Option<&Secret<String>> {
        self.0.iter().find_map(|c| match c {
            Credential::AccountKey { key } => Some(key),
            _ => None,
        })
    }

    /// Method labels in order, for logging.
    pub fn labels(&self) -> Vec<&'static str> {
        self.0.iter().map(Credential::label).collect()
    }
}

/// An endpoint bound to its credentials. Immutable once built.
#[derive(Debug, Clone)]
pub struct Connection {
    endpoint: String,
    credentials: CredentialSet,
    is_emulator: bool,
    preferred_method: AuthMethod,
}

impl Connection {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: CredentialSet,
        is_emulator: bool,
        preferred_method: AuthMethod,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            is_emulator,
            preferred_method,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn is_emulator(&self) -> bool {
        self.is_emulator
    }

    pub fn preferred_method(&self) -> AuthMethod {
        self.preferred_method
    }
}

/// In-memory credential sets for authenticated sessions.
///
/// The Mutex serializes inserts and removals; reads clone the set out.
#[derive(Default)]
pub struct CredentialCache {
    state: Mutex<HashMap<String, CredentialSet>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a set after a successful authentication. Returns its key.
    pub async fn insert(&self, credentials: CredentialSet) -> String {
        let key = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state.insert(key.clone(), credentials);
        debug!(key, "cached credentials");
        key
    }

    pub async fn get(&self, key: &str) -> Option<CredentialSet> {
        let state = self.state.lock().await;
        state.get(key).cloned()
    }

    /// Forget a set (authentication failure or disconnect).
    ///
    /// Returns the removed set if it existed.
    pub async fn remove(&self, key: &str) -> Option<CredentialSet> {
        let mut state = self.state.lock().await;
        let removed = state.remove(key);
        if removed.is_some() {
            debug!(key, "evicted cached credentials");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
