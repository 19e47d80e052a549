//! Credential discovery and ordering
//!
//! `CredentialResolver::resolve()` builds a fresh `CredentialSet` for one
//! authentication attempt. Key access problems are logged and degrade to an
//! identity-only set; only unexpected key-source failures are returned.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, instrument, warn};

use crate::credentials::{AuthMethod, Credential, CredentialSet};
use crate::error::{Error, Result};
use crate::keys::{KeySource, ManagedAccount};
use crate::probe::{ConnectivityProbe, ProbeOutcome};

/// Everything known about an account when authenticating.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub account_name: String,
    pub endpoint: String,
    pub is_emulator: bool,
    pub preferred: AuthMethod,
    /// Management-plane coordinates, when key listing is possible.
    pub management: Option<ManagedAccount>,
    /// Key supplied by the operator.
    pub raw_key: Option<Secret<String>>,
    pub tenant_id: Option<String>,
    pub managed_identity_client_id: Option<String>,
}

/// Discovers usable credentials for an account.
pub struct CredentialResolver {
    probe: Arc<dyn ConnectivityProbe>,
    key_source: Option<Arc<dyn KeySource>>,
}

impl CredentialResolver {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            probe,
            key_source: None,
        }
    }

    /// Enable management-plane key listing.
    pub fn with_key_source(mut self, key_source: Arc<dyn KeySource>) -> Self {
        self.key_source = Some(key_source);
        self
    }

    #[instrument(skip(self, request), fields(account = %request.account_name, preferred = request.preferred.label()))]
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<CredentialSet> {
        if let (true, Some(key)) = (request.is_emulator, &request.raw_key) {
            debug!("emulator with supplied key, skipping discovery");
            return Ok(CredentialSet::from_discovered(
                vec![Credential::AccountKey { key: key.clone() }],
                request.preferred,
            ));
        }

        let mut discovered = Vec::new();

        let wants_key = matches!(request.preferred, AuthMethod::AccountKey | AuthMethod::Auto)
            || request.is_emulator;
        if wants_key {
            if let Some(key) = self.discover_key(request).await? {
                discovered.push(Credential::AccountKey { key });
            }
        }

        discovered.push(Credential::EntraId {
            tenant_id: request.tenant_id.clone(),
        });

        if request.preferred == AuthMethod::ManagedIdentity {
            discovered.push(Credential::ManagedIdentity {
                client_id: request.managed_identity_client_id.clone(),
            });
        }

        let set = CredentialSet::from_discovered(discovered, request.preferred);
        info!(credentials = ?set.labels(), "resolved credentials");
        Ok(set)
    }

    async fn discover_key(&self, request: &ResolveRequest) -> Result<Option<Secret<String>>> {
        if let (Some(source), Some(account)) = (&self.key_source, &request.management) {
            return list_key(source.as_ref(), account).await;
        }

        let Some(key) = &request.raw_key else {
            info!("no account key available, using identity credentials");
            return Ok(None);
        };

        match self
            .probe
            .probe(&request.endpoint, key, request.is_emulator)
            .await
        {
            Ok(ProbeOutcome::Reachable) => Ok(Some(key.clone())),
            Ok(ProbeOutcome::LocalAuthDisabled) if request.is_emulator => Ok(Some(key.clone())),
            Ok(ProbeOutcome::LocalAuthDisabled) => {
                warn!("account has local authorization disabled, discarding key");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "key probe failed, keeping key");
                Ok(Some(key.clone()))
            }
        }
    }
}

/// Primary key, then read-only primary key. Permission denial on both is "no key".
async fn list_key(source: &dyn KeySource, account: &ManagedAccount) -> Result<Option<Secret<String>>> {
    match source.primary_key(account).await {
        Ok(key) => return Ok(Some(key)),
        Err(Error::PermissionDenied(reason)) => {
            info!(%reason, "primary key not readable, trying read-only key");
        }
        Err(e) => return Err(e),
    }

    match source.read_only_primary_key(account).await {
        Ok(key) => Ok(Some(key)),
        Err(Error::PermissionDenied(reason)) => {
            warn!(%reason, "account keys not readable, using identity credentials");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
