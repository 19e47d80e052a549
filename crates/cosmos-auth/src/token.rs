//! Identity token acquisition with credential fallback
//!
//! A `TokenProvider` answers a client's token callback by walking its
//! credential set in three steps:
//! 1. The first credential. Prompting is allowed only when it is the
//!    preferred `EntraId` credential.
//! 2. Every remaining credential, silently.
//! 3. The first `EntraId` credential again, this time allowing a prompt.
//!
//! Account keys never produce tokens and are rejected without a call.
//! If no step yields a token, the error lists every failure in order.
//!
//! Tokens are kept in a `TokenCache` until they come within
//! `TOKEN_REFRESH_MARGIN_MILLIS` of expiry. Concurrent callers for the same
//! key wait on one walk instead of each signing in.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use docstore::{AccessToken, RequestOptions, TokenCallback};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{PRODUCTION_HOST_SUFFIX, TEST_HOST_SUFFIXES, TOKEN_REFRESH_MARGIN_MILLIS};
use crate::credentials::{AuthMethod, Connection, Credential, CredentialSet};
use crate::error::{Error, Result};
use crate::identity::{IdentityProviders, TokenRequest, now_millis};

/// Rewrite a scope addressed at an internal test/staging host to the
/// production scope of the same account. Other scopes pass through.
pub fn normalize_scope(scope: &str) -> String {
    let Ok(url) = url::Url::parse(scope) else {
        return scope.to_string();
    };
    let Some(host) = url.host_str() else {
        return scope.to_string();
    };
    TEST_HOST_SUFFIXES
        .iter()
        .find_map(|suffix| host.strip_suffix(suffix))
        .filter(|account| !account.is_empty())
        .map(|account| format!("https://{account}{PRODUCTION_HOST_SUFFIX}/.default"))
        .unwrap_or_else(|| scope.to_string())
}

/// Identity tokens shared between providers, keyed by credential set,
/// scopes and pending challenges.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }

    /// Cached token for `key`, or the result of `acquire` stored under it.
    /// The lock is held while acquiring.
    async fn get_or_acquire<F, Fut>(&self, key: String, acquire: F) -> Result<AccessToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(&key)
            && !needs_refresh(token, now_millis())
        {
            debug!("using cached token");
            return Ok(token.clone());
        }
        let token = acquire().await?;
        tokens.insert(key, token.clone());
        Ok(token)
    }
}

fn needs_refresh(token: &AccessToken, now: u64) -> bool {
    token.expires_at <= now.saturating_add(TOKEN_REFRESH_MARGIN_MILLIS)
}

/// Token callback for identity-authenticated clients.
pub struct TokenProvider {
    credentials: CredentialSet,
    preferred: AuthMethod,
    identities: IdentityProviders,
    options: RequestOptions,
    cache: Arc<TokenCache>,
}

impl TokenProvider {
    pub fn new(
        connection: &Connection,
        identities: IdentityProviders,
        options: &RequestOptions,
    ) -> Self {
        Self {
            credentials: connection.credentials().clone(),
            preferred: connection.preferred_method(),
            identities,
            options: options.clone(),
            cache: Arc::new(TokenCache::new()),
        }
    }

    /// Share `cache` with other providers instead of a private one.
    pub fn with_cache(mut self, cache: Arc<TokenCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Token for `scopes`, from the cache while it is fresh.
    pub async fn acquire(&self, scopes: &[String]) -> Result<AccessToken> {
        let scopes: Vec<String> = scopes.iter().map(|s| normalize_scope(s)).collect();
        let key = self.cache_key(&scopes);
        self.cache
            .get_or_acquire(key, || self.walk_credentials(&scopes))
            .await
    }

    fn cache_key(&self, scopes: &[String]) -> String {
        let mut key = format!("{}|{}", self.credentials.labels().join(","), scopes.join(" "));
        if self.options.has_challenges() {
            key.push('|');
            key.push_str(&self.options.challenges.join("|"));
        }
        key
    }

    async fn walk_credentials(&self, scopes: &[String]) -> Result<AccessToken> {
        let mut failures = Vec::new();

        let Some(first) = self.credentials.first() else {
            return Err(Error::TokenAcquisition("no credentials available".into()));
        };

        let first_prompts =
            matches!(first, Credential::EntraId { .. }) && self.preferred == AuthMethod::EntraId;
        match self.try_credential(first, scopes, first_prompts).await {
            Ok(token) => return Ok(token),
            Err(e) => failures.push(format!("{}: {e}", first.label())),
        }

        for credential in self.credentials.iter().skip(1) {
            match self.try_credential(credential, scopes, false).await {
                Ok(token) => return Ok(token),
                Err(e) => failures.push(format!("{}: {e}", credential.label())),
            }
        }

        // Last resort. Skipped when step 1 already prompted with this credential.
        let fallback = self
            .credentials
            .iter()
            .position(|c| matches!(c, Credential::EntraId { .. }))
            .filter(|&index| !(index == 0 && first_prompts));
        if let Some(index) = fallback {
            let credential = &self.credentials.as_slice()[index];
            info!("silent token acquisition failed, retrying with interactive sign-in");
            match self.try_credential(credential, scopes, true).await {
                Ok(token) => return Ok(token),
                Err(e) => failures.push(format!("{} (interactive): {e}", credential.label())),
            }
        }

        warn!(attempts = failures.len(), "token acquisition exhausted");
        Err(Error::TokenAcquisition(failures.join("; ")))
    }

    async fn try_credential(
        &self,
        credential: &Credential,
        scopes: &[String],
        allow_prompt: bool,
    ) -> Result<AccessToken> {
        debug!(credential = credential.label(), allow_prompt, "requesting token");
        match credential {
            Credential::AccountKey { .. } => Err(Error::TokenAcquisition(
                "account keys do not issue tokens".into(),
            )),
            Credential::EntraId { tenant_id } => {
                let request = TokenRequest {
                    scopes: scopes.to_vec(),
                    tenant_id: tenant_id.clone(),
                    client_id: None,
                    allow_prompt,
                    challenges: self.options.challenges.clone(),
                };
                self.identities.federated.get_token(&request).await
            }
            Credential::ManagedIdentity { client_id } => {
                let request = TokenRequest {
                    scopes: scopes.to_vec(),
                    tenant_id: None,
                    client_id: client_id.clone(),
                    allow_prompt: false,
                    challenges: self.options.challenges.clone(),
                };
                self.identities.managed.get_token(&request).await
            }
        }
    }
}

impl TokenCallback for TokenProvider {
    fn get_token<'a>(
        &'a self,
        scopes: &'a [String],
    ) -> Pin<Box<dyn Future<Output = docstore::Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move { self.acquire(scopes).await.map_err(Into::into) })
    }
}
