//! Identity token providers
//!
//! Two providers back the identity-based credentials:
//! - `AzureCliIdentity` (federated identity) shells out to the Azure CLI and
//!   may run an interactive `az login` when prompting is allowed
//! - `ImdsIdentity` (managed identity) asks the instance metadata service;
//!   it can never prompt

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use docstore::{AccessToken, claims_parameter};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_TOKEN_LIFETIME_MILLIS, IMDS_API_VERSION, IMDS_TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// What a provider is asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    /// User-assigned managed identity to use, if any.
    pub client_id: Option<String>,
    /// Whether the provider may interact with the user.
    pub allow_prompt: bool,
    /// Claims-challenge directives the token must satisfy.
    pub challenges: Vec<String>,
}

impl TokenRequest {
    fn scope(&self) -> Result<&str> {
        self.scopes
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::IdentityProvider("token request has no scopes".into()))
    }
}

/// Source of identity tokens.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait IdentityProvider: Send + Sync {
    /// Identifier for logging (e.g. "azure-cli", "imds")
    fn name(&self) -> &str;

    fn get_token<'a>(
        &'a self,
        request: &'a TokenRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;
}

/// Providers backing the identity-based credential kinds.
#[derive(Clone)]
pub struct IdentityProviders {
    /// Answers `EntraId` credentials and management-plane calls.
    pub federated: Arc<dyn IdentityProvider>,
    /// Answers `ManagedIdentity` credentials.
    pub managed: Arc<dyn IdentityProvider>,
}

impl IdentityProviders {
    pub fn new(federated: Arc<dyn IdentityProvider>, managed: Arc<dyn IdentityProvider>) -> Self {
        Self { federated, managed }
    }
}

impl Default for IdentityProviders {
    fn default() -> Self {
        Self {
            federated: Arc::new(AzureCliIdentity::new()),
            managed: Arc::new(ImdsIdentity::new(reqwest::Client::new())),
        }
    }
}

/// `az account get-access-token` output (only the fields we read).
#[derive(Debug, Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix seconds; present in Azure CLI 2.54+.
    #[serde(default)]
    expires_on: Option<u64>,
}

/// Federated identity through the Azure CLI's signed-in account.
pub struct AzureCliIdentity {
    program: String,
}

impl AzureCliIdentity {
    pub fn new() -> Self {
        Self::with_program("az")
    }

    /// Use a specific CLI executable (path or name on `PATH`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn access_token(&self, scope: &str, tenant_id: Option<&str>) -> Result<AccessToken> {
        let mut command = Command::new(&self.program);
        command.args(["account", "get-access-token", "--output", "json", "--scope", scope]);
        if let Some(tenant) = tenant_id {
            command.args(["--tenant", tenant]);
        }

        let output = command
            .output()
            .await
            .map_err(|e| Error::IdentityProvider(format!("running {}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::IdentityProvider(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let token: CliToken = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::IdentityProvider(format!("parsing CLI token output: {e}")))?;
        let expires_at = token
            .expires_on
            .map(|secs| secs * 1000)
            .unwrap_or_else(|| now_millis() + DEFAULT_TOKEN_LIFETIME_MILLIS);
        Ok(AccessToken::new(token.access_token, expires_at))
    }

    /// Interactive sign-in, optionally answering a claims challenge.
    async fn login(&self, request: &TokenRequest, scope: &str) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(["login", "--scope", scope]);
        if let Some(tenant) = request.tenant_id.as_deref() {
            command.args(["--tenant", tenant]);
        }
        if let Some(claims) = request.challenges.iter().find_map(|c| claims_parameter(c)) {
            command.args(["--claims-challenge", claims.as_str()]);
        }

        info!(program = %self.program, "starting interactive sign-in");
        let status = command
            .status()
            .await
            .map_err(|e| Error::IdentityProvider(format!("running {} login: {e}", self.program)))?;
        if !status.success() {
            return Err(Error::IdentityProvider(format!(
                "{} login exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

impl Default for AzureCliIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for AzureCliIdentity {
    fn name(&self) -> &str {
        "azure-cli"
    }

    fn get_token<'a>(
        &'a self,
        request: &'a TokenRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move {
            let scope = request.scope()?;
            let tenant = request.tenant_id.as_deref();

            // A pending challenge means the cached sign-in lacks the claims.
            let challenged = !request.challenges.is_empty();
            if challenged && !request.allow_prompt {
                debug!("claims challenge pending, silent token skipped");
                return Err(Error::IdentityProvider(
                    "claims challenge requires interactive sign-in".into(),
                ));
            }
            let prompted = challenged;
            if prompted {
                self.login(request, scope).await?;
            }

            match self.access_token(scope, tenant).await {
                Ok(token) => Ok(token),
                Err(e) if request.allow_prompt && !prompted => {
                    warn!(error = %e, "silent token request failed, prompting");
                    self.login(request, scope).await?;
                    self.access_token(scope, tenant).await
                }
                Err(e) => Err(e),
            }
        })
    }
}

/// IMDS token response. `expires_on` is unix seconds as a string.
#[derive(Debug, Deserialize)]
struct ImdsToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
}

/// Managed identity through the instance metadata service.
pub struct ImdsIdentity {
    http: reqwest::Client,
    endpoint: String,
}

impl ImdsIdentity {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_endpoint(http, IMDS_TOKEN_ENDPOINT)
    }

    pub fn with_endpoint(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    fn token_url(&self, request: &TokenRequest) -> Result<url::Url> {
        let resource = request.scope()?.trim_end_matches("/.default");
        let mut params = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
        if let Some(client_id) = request.client_id.as_deref() {
            params.push(("client_id", client_id));
        }
        url::Url::parse_with_params(&self.endpoint, &params)
            .map_err(|e| Error::IdentityProvider(format!("building IMDS URL: {e}")))
    }
}

impl IdentityProvider for ImdsIdentity {
    fn name(&self) -> &str {
        "imds"
    }

    fn get_token<'a>(
        &'a self,
        request: &'a TokenRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.token_url(request)?;
            debug!(client_id = ?request.client_id, "requesting managed identity token");

            let response = self
                .http
                .get(url)
                .header("Metadata", "true")
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| Error::Http(format!("IMDS request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));
                return Err(Error::IdentityProvider(format!(
                    "IMDS returned {status}: {body}"
                )));
            }

            let token: ImdsToken = response
                .json()
                .await
                .map_err(|e| Error::IdentityProvider(format!("invalid IMDS response: {e}")))?;
            let expires_at = token
                .expires_on
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or_else(|| now_millis() + DEFAULT_TOKEN_LIFETIME_MILLIS);
            Ok(AccessToken::new(token.access_token, expires_at))
        })
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
