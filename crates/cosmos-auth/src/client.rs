//! Client construction from a connection

use std::sync::Arc;

use docstore::{
    ClientAuth, DocumentClient, HttpClientConfig, HttpDocumentClient, RequestOptions,
};
use tracing::debug;

use crate::credentials::{Connection, Credential};
use crate::identity::IdentityProviders;
use crate::token::{TokenCache, TokenProvider};

/// Builds a fresh client per attempt.
///
/// The retry wrapper calls this once per attempt so each attempt carries the
/// challenges accumulated so far.
pub trait ClientBuilder: Send + Sync {
    fn build(
        &self,
        connection: &Connection,
        options: &RequestOptions,
    ) -> docstore::Result<Arc<dyn DocumentClient>>;
}

/// Builds HTTP document clients.
///
/// Every token-authenticated client it builds shares one `TokenCache`, so
/// retries and later chunks reuse a token instead of signing in again.
pub struct ClientFactory {
    identities: IdentityProviders,
    config: HttpClientConfig,
    tokens: Arc<TokenCache>,
}

impl ClientFactory {
    pub fn new(identities: IdentityProviders, config: HttpClientConfig) -> Self {
        Self {
            identities,
            config,
            tokens: Arc::new(TokenCache::new()),
        }
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Key auth when the first credential is an account key, token auth otherwise.
    pub fn client_auth(&self, connection: &Connection, options: &RequestOptions) -> ClientAuth {
        match connection.credentials().first() {
            Some(Credential::AccountKey { key }) => ClientAuth::MasterKey(key.clone()),
            _ => ClientAuth::Token(Arc::new(
                TokenProvider::new(connection, self.identities.clone(), options)
                    .with_cache(self.tokens.clone()),
            )),
        }
    }

    pub fn build_client(
        &self,
        connection: &Connection,
        options: &RequestOptions,
    ) -> docstore::Result<HttpDocumentClient> {
        let auth = self.client_auth(connection, options);
        let mut config = self.config.clone();
        config.accept_invalid_certs |= connection.is_emulator();
        debug!(
            endpoint = connection.endpoint(),
            auth = ?auth,
            challenges = options.challenges.len(),
            "building document client"
        );
        HttpDocumentClient::new(connection.endpoint(), auth, &config)
    }
}

impl ClientBuilder for ClientFactory {
    fn build(
        &self,
        connection: &Connection,
        options: &RequestOptions,
    ) -> docstore::Result<Arc<dyn DocumentClient>> {
        Ok(Arc::new(self.build_client(connection, options)?))
    }
}
