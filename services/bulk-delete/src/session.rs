//! One connected account session
//!
//! Resolves credentials, remembers them in the credential cache for the
//! session's lifetime, and runs bulk deletes over the resulting connection.
//! An authentication failure evicts the cached set so the next connect
//! resolves from scratch.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use bulk_ops::{BulkDeleteSession, ClaimsChallengeRetry, DeleteEvent};
use cosmos_auth::{ClientBuilder, Connection, CredentialCache, CredentialResolver};
use docstore::DocumentIdentifier;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

pub struct Session {
    inner: BulkDeleteSession,
    cache: Arc<CredentialCache>,
    cache_key: String,
}

impl Session {
    pub async fn connect(
        config: &Config,
        resolver: &CredentialResolver,
        builder: Arc<dyn ClientBuilder>,
        cache: Arc<CredentialCache>,
    ) -> Result<Self> {
        let credentials = resolver.resolve(&config.resolve_request()).await?;
        let connection = Connection::new(
            config.account.endpoint.clone(),
            credentials.clone(),
            config.account.emulator,
            config.account.auth_method,
        );
        let cache_key = cache.insert(credentials).await;

        let inner = match BulkDeleteSession::new(
            ClaimsChallengeRetry::new(builder),
            connection,
            config.container(),
            config.bulk_delete_config(),
        ) {
            Ok(inner) => inner,
            Err(e) => {
                cache.remove(&cache_key).await;
                return Err(e.into());
            }
        };

        info!(
            endpoint = %config.account.endpoint,
            database = %config.target.database,
            container = %config.target.container,
            "session connected"
        );
        Ok(Self {
            inner,
            cache,
            cache_key,
        })
    }

    pub fn connection(&self) -> &Connection {
        self.inner.connection()
    }

    pub async fn run<C, Fut, E>(
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
        let result = self
            .inner
            .bulk_delete(identifiers, confirm, cancel, events)
            .await
            .map_err(crate::error::Error::from);

        if let Err(e) = &result {
            if e.is_auth_failure() {
                warn!(error = %e, "authentication failed, evicting cached credentials");
                self.cache.remove(&self.cache_key).await;
            }
        }
        result
    }

    /// Cancel any running delete and forget the cached credentials.
    pub async fn disconnect(self) {
        self.inner.dispose();
        self.cache.remove(&self.cache_key).await;
        info!("session disconnected");
    }
}
