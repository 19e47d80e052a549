//! Connectivity probe for supplied account keys

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use docstore::{ClientAuth, HttpClientConfig, HttpDocumentClient};
use tracing::debug;

use crate::constants::LOCAL_AUTH_DISABLED_MESSAGE;
use crate::error::{Error, Result};

/// What a probe learned about a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The account answered; the key is usable.
    Reachable,
    /// The account rejects key authentication entirely.
    LocalAuthDisabled,
}

/// Inexpensive check that a key can talk to an endpoint.
pub trait ConnectivityProbe: Send + Sync {
    fn probe<'a>(
        &'a self,
        endpoint: &'a str,
        key: &'a Secret<String>,
        is_emulator: bool,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome>> + Send + 'a>>;
}

/// Probe that reads the database account over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpConnectivityProbe {
    config: HttpClientConfig,
}

impl HttpConnectivityProbe {
    pub fn new(config: HttpClientConfig) -> Self {
        Self { config }
    }
}

impl ConnectivityProbe for HttpConnectivityProbe {
    fn probe<'a>(
        &'a self,
        endpoint: &'a str,
        key: &'a Secret<String>,
        is_emulator: bool,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let mut config = self.config.clone();
            config.accept_invalid_certs |= is_emulator;
            let client =
                HttpDocumentClient::new(endpoint, ClientAuth::MasterKey(key.clone()), &config)
                    .map_err(|e| Error::InvalidEndpoint(e.to_string()))?;

            match client.read_account().await {
                Ok(()) => Ok(ProbeOutcome::Reachable),
                Err(e) => classify_probe_error(e),
            }
        })
    }
}

fn classify_probe_error(err: docstore::Error) -> Result<ProbeOutcome> {
    match &err {
        docstore::Error::Response {
            status: 401 | 403,
            message,
            ..
        } if message.contains(LOCAL_AUTH_DISABLED_MESSAGE) => {
            debug!("account has local authorization disabled");
            Ok(ProbeOutcome::LocalAuthDisabled)
        }
        _ => Err(Error::Probe(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, message: &str) -> docstore::Error {
        docstore::Error::Response {
            status,
            message: message.to_string(),
            challenges: vec![],
        }
    }

    #[test]
    fn local_auth_disabled_is_recognised() {
        let body = r#"{"code":"Forbidden","message":"Local Authorization is disabled. Use an AAD token to authorize all requests."}"#;
        assert_eq!(
            classify_probe_error(response(403, body)).unwrap(),
            ProbeOutcome::LocalAuthDisabled
        );
        assert_eq!(
            classify_probe_error(response(401, body)).unwrap(),
            ProbeOutcome::LocalAuthDisabled
        );
    }

    #[test]
    fn other_rejections_are_probe_errors() {
        let err = classify_probe_error(response(401, "bad signature")).unwrap_err();
        assert!(matches!(err, Error::Probe(_)));

        let err = classify_probe_error(docstore::Error::Timeout("slow".into())).unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[tokio::test]
    async fn invalid_endpoint_rejected_before_network() {
        let probe = HttpConnectivityProbe::default();
        let key = Secret::new(crate::constants::EMULATOR_KEY.to_string());
        let err = probe.probe("not a url", &key, false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(_)), "got: {err:?}");
    }
}
