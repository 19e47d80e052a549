//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account key is loaded from the COSMOS_KEY env var or key_file,
//! never stored in the TOML directly to avoid leaking secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bulk_ops::BulkDeleteConfig;
use common::Secret;
use cosmos_auth::constants::EMULATOR_KEY;
use cosmos_auth::{AuthMethod, ManagedAccount, ResolveRequest};
use docstore::{ContainerRef, HttpClientConfig, MAX_BULK_OPERATIONS};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Database account and how to authenticate against it
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub endpoint: String,
    #[serde(default)]
    pub emulator: bool,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub managed_identity_client_id: Option<String>,
    #[serde(skip)]
    pub key: Option<Secret<String>>,
    /// Path to a file containing the account key (alternative to COSMOS_KEY env var)
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Enables management-plane key listing.
    #[serde(default)]
    pub management: Option<ManagementConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagementConfig {
    pub subscription_id: String,
    pub resource_group: String,
}

/// Container the identifiers belong to
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub database: String,
    pub container: String,
}

/// Bulk engine tuning
#[derive(Debug, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_chunk: usize,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fallback_backoff")]
    pub fallback_backoff_ms: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_in_flight_per_chunk: default_max_in_flight(),
            request_timeout_secs: default_timeout(),
            fallback_backoff_ms: default_fallback_backoff(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus textfile written on exit.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_chunk_size() -> usize {
    MAX_BULK_OPERATIONS
}

fn default_max_in_flight() -> usize {
    16
}

fn default_timeout() -> u64 {
    60
}

fn default_fallback_backoff() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Account key resolution order:
    /// 1. COSMOS_KEY env var
    /// 2. key_file path from config
    /// 3. the public emulator key, for emulator accounts only
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(key) = std::env::var("COSMOS_KEY") {
            config.account.key = Some(Secret::new(key.trim().to_owned()));
        } else if let Some(ref key_file) = config.account.key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.account.key = Some(Secret::new(key));
            }
        }

        if config.account.key.as_ref().is_some_and(Secret::is_blank) {
            config.account.key = None;
        }
        if config.account.emulator && config.account.key.is_none() {
            config.account.key = Some(Secret::new(EMULATOR_KEY.to_owned()));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let endpoint = &self.account.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "endpoint must start with http:// or https://, got: {endpoint}"
            )));
        }
        docstore::http::parse_endpoint(endpoint)
            .map_err(|e| common::Error::Config(e.to_string()))?;
        if self.target.database.trim().is_empty() || self.target.container.trim().is_empty() {
            return Err(common::Error::Config(
                "target database and container must be non-empty".into(),
            ));
        }
        if !(1..=MAX_BULK_OPERATIONS).contains(&self.bulk.chunk_size) {
            return Err(common::Error::Config(format!(
                "chunk_size must be between 1 and {MAX_BULK_OPERATIONS}, got {}",
                self.bulk.chunk_size
            )));
        }
        if self.bulk.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.bulk.max_in_flight_per_chunk == 0 {
            return Err(common::Error::Config(
                "max_in_flight_per_chunk must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("cosmos-bulk-delete.toml")
    }

    /// Account name: first label of the endpoint host.
    pub fn account_name(&self) -> String {
        docstore::http::parse_endpoint(&self.account.endpoint)
            .ok()
            .and_then(|url| {
                url.host_str()
                    .and_then(|host| host.split('.').next())
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }

    pub fn resolve_request(&self) -> ResolveRequest {
        let account_name = self.account_name();
        ResolveRequest {
            management: self.account.management.as_ref().map(|m| ManagedAccount {
                subscription_id: m.subscription_id.clone(),
                resource_group: m.resource_group.clone(),
                account_name: account_name.clone(),
                tenant_id: self.account.tenant_id.clone(),
            }),
            account_name,
            endpoint: self.account.endpoint.clone(),
            is_emulator: self.account.emulator,
            preferred: self.account.auth_method,
            raw_key: self.account.key.clone(),
            tenant_id: self.account.tenant_id.clone(),
            managed_identity_client_id: self.account.managed_identity_client_id.clone(),
        }
    }

    pub fn container(&self) -> ContainerRef {
        ContainerRef::new(&self.target.database, &self.target.container)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.bulk.request_timeout_secs),
            max_in_flight: self.bulk.max_in_flight_per_chunk,
            accept_invalid_certs: false,
        }
    }

    pub fn bulk_delete_config(&self) -> BulkDeleteConfig {
        BulkDeleteConfig {
            chunk_size: self.bulk.chunk_size,
            fallback_backoff: Duration::from_millis(self.bulk.fallback_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[account]
endpoint = "https://contoso.documents.azure.com:443/"

[target]
database = "inventory"
container = "items"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env("COSMOS_KEY") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.endpoint, "https://contoso.documents.azure.com:443/");
        assert_eq!(config.account.auth_method, AuthMethod::Auto);
        assert!(!config.account.emulator);
        assert!(config.account.key.is_none());
        assert!(config.account.management.is_none());
        assert_eq!(config.bulk.chunk_size, 100);
        assert_eq!(config.bulk.max_in_flight_per_chunk, 16);
        assert_eq!(config.bulk.request_timeout_secs, 60);
        assert_eq!(config.bulk.fallback_backoff_ms, 1000);
        assert!(config.telemetry.metrics_file.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://contoso.documents.azure.com:443/"
auth_method = "entra_id"
tenant_id = "tenant-1"

[account.management]
subscription_id = "sub-1"
resource_group = "rg-1"

[target]
database = "inventory"
container = "items"

[bulk]
chunk_size = 50
fallback_backoff_ms = 250

[telemetry]
metrics_file = "/tmp/bulk.prom"
"#,
        );
        unsafe { remove_env("COSMOS_KEY") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.auth_method, AuthMethod::EntraId);
        assert_eq!(config.bulk.chunk_size, 50);
        assert_eq!(
            config.bulk_delete_config().fallback_backoff,
            Duration::from_millis(250)
        );
        assert_eq!(
            config.telemetry.metrics_file,
            Some(PathBuf::from("/tmp/bulk.prom"))
        );

        let request = config.resolve_request();
        assert_eq!(request.account_name, "contoso");
        assert_eq!(request.preferred, AuthMethod::EntraId);
        let management = request.management.unwrap();
        assert_eq!(management.subscription_id, "sub-1");
        assert_eq!(management.account_name, "contoso");
        assert_eq!(management.tenant_id.as_deref(), Some("tenant-1"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_key_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("COSMOS_KEY", "env-key==") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.key.as_ref().unwrap().expose(), "env-key==");
        unsafe { remove_env("COSMOS_KEY") };
    }

    #[test]
    fn test_key_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        std::fs::write(&key_path, "file-key==\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[account]
endpoint = "https://contoso.documents.azure.com/"
key_file = "{}"

[target]
database = "db"
container = "items"
"#,
                key_path.display()
            ),
        );

        unsafe { remove_env("COSMOS_KEY") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.key.as_ref().unwrap().expose(), "file-key==");
    }

    #[test]
    fn test_key_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        std::fs::write(&key_path, "file-key==").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[account]
endpoint = "https://contoso.documents.azure.com/"
key_file = "{}"

[target]
database = "db"
container = "items"
"#,
                key_path.display()
            ),
        );

        unsafe { set_env("COSMOS_KEY", "env-key==") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.account.key.as_ref().unwrap().expose(),
            "env-key==",
            "COSMOS_KEY env var must take precedence over key_file"
        );
        unsafe { remove_env("COSMOS_KEY") };
    }

    #[test]
    fn test_key_file_nonexistent_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://contoso.documents.azure.com/"
key_file = "/nonexistent/path/key"

[target]
database = "db"
container = "items"
"#,
        );

        unsafe { remove_env("COSMOS_KEY") };
        assert!(Config::load(&path).is_err(), "missing key_file must be an error");
    }

    #[test]
    fn test_emulator_defaults_to_public_key() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://localhost:8081/"
emulator = true

[target]
database = "db"
container = "items"
"#,
        );

        unsafe { remove_env("COSMOS_KEY") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.account.key.as_ref().unwrap().expose(), EMULATOR_KEY);
        assert_eq!(config.account_name(), "localhost");
        assert!(config.resolve_request().is_emulator);
    }

    #[test]
    fn test_blank_env_key_is_ignored() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("COSMOS_KEY", "   ") };
        let config = Config::load(&path).unwrap();
        assert!(config.account.key.is_none());
        unsafe { remove_env("COSMOS_KEY") };
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "contoso.documents.azure.com"

[target]
database = "db"
container = "items"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("endpoint must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_chunk_size_bounds() {
        let _lock = ENV_MUTEX.lock().unwrap();
        for chunk_size in [0, 101] {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(
                &dir,
                &format!("{}\n[bulk]\nchunk_size = {chunk_size}\n", valid_toml()),
            );
            assert!(Config::load(&path).is_err(), "chunk_size {chunk_size} must be rejected");
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{}\n[bulk]\nrequest_timeout_secs = 0\n", valid_toml()),
        );
        assert!(Config::load(&path).is_err(), "request_timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_empty_container_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://contoso.documents.azure.com/"

[target]
database = "db"
container = ""
"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("cosmos-bulk-delete.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_account_name_from_endpoint() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env("COSMOS_KEY") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.account_name(), "contoso");
        assert_eq!(config.container(), ContainerRef::new("inventory", "items"));
        assert_eq!(config.http_client_config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_endpoint_without_host_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://"

[target]
database = "db"
container = "items"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("invalid endpoint"), "got: {err}");
    }

    #[test]
    fn test_account_name_ignores_userinfo_and_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[account]
endpoint = "https://reader@Contoso.documents.azure.com:443/path"

[target]
database = "db"
container = "items"
"#,
        );
        unsafe { remove_env("COSMOS_KEY") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.account_name(), "contoso");
    }
}
