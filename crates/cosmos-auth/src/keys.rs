//! Management-plane account key retrieval
//!
//! `ArmKeySource` lists account keys through Azure Resource Manager using a
//! management token from the federated identity provider. Callers without
//! the `listKeys` permission get `Error::PermissionDenied`, which the
//! resolver treats as "no key" rather than a failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::constants::{ARM_API_VERSION, ARM_ENDPOINT, ARM_SCOPE};
use crate::error::{Error, Result};
use crate::identity::{IdentityProvider, TokenRequest};

/// Coordinates of an account in the management plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAccount {
    pub subscription_id: String,
    pub resource_group: String,
    pub account_name: String,
    /// Tenant to request the management token from.
    pub tenant_id: Option<String>,
}

impl ManagedAccount {
    /// ARM resource path of the database account.
    pub fn resource_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DocumentDB/databaseAccounts/{}",
            self.subscription_id, self.resource_group, self.account_name
        )
    }
}

/// Source of account keys.
///
/// Either call may fail with `Error::PermissionDenied`.
pub trait KeySource: Send + Sync {
    fn primary_key<'a>(
        &'a self,
        account: &'a ManagedAccount,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>>;

    fn read_only_primary_key<'a>(
        &'a self,
        account: &'a ManagedAccount,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListKeysResponse {
    primary_master_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOnlyKeysResponse {
    primary_readonly_master_key: String,
}

/// Key source backed by Azure Resource Manager.
pub struct ArmKeySource {
    http: reqwest::Client,
    identity: Arc<dyn IdentityProvider>,
    endpoint: String,
}

impl ArmKeySource {
    pub fn new(http: reqwest::Client, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            http,
            identity,
            endpoint: ARM_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn action_url(&self, account: &ManagedAccount, action: &str) -> String {
        format!(
            "{}{}/{action}?api-version={ARM_API_VERSION}",
            self.endpoint.trim_end_matches('/'),
            account.resource_path()
        )
    }

    async fn post_action<T: DeserializeOwned>(
        &self,
        account: &ManagedAccount,
        action: &str,
    ) -> Result<T> {
        let request = TokenRequest {
            scopes: vec![ARM_SCOPE.to_string()],
            tenant_id: account.tenant_id.clone(),
            ..Default::default()
        };
        let token = self
            .identity
            .get_token(&request)
            .await
            .map_err(|e| Error::KeyAccess(format!("management token unavailable: {e}")))?;

        debug!(account = %account.account_name, action, "requesting account keys");
        let response = self
            .http
            .post(self.action_url(account, action))
            .bearer_auth(token.token.expose())
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{action} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(status_error(status, action, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::KeyAccess(format!("invalid {action} response: {e}")))
    }
}

fn status_error(status: StatusCode, action: &str, body: String) -> Error {
    if status == StatusCode::FORBIDDEN {
        Error::PermissionDenied(format!("{action} returned {status}: {body}"))
    } else {
        Error::KeyAccess(format!("{action} returned {status}: {body}"))
    }
}

impl KeySource for ArmKeySource {
    fn primary_key<'a>(
        &'a self,
        account: &'a ManagedAccount,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>> {
        Box::pin(async move {
            let keys: ListKeysResponse = self.post_action(account, "listKeys").await?;
            Ok(Secret::new(keys.primary_master_key))
        })
    }

    fn read_only_primary_key<'a>(
        &'a self,
        account: &'a ManagedAccount,
    ) -> Pin<Box<dyn Future<Output = Result<Secret<String>>> + Send + 'a>> {
        Box::pin(async move {
            let keys: ReadOnlyKeysResponse = self.post_action(account, "readonlykeys").await?;
            Ok(Secret::new(keys.primary_readonly_master_key))
        })
    }
}
