//! Cosmos DB bulk delete
//!
//! Operator CLI that:
//! 1. Loads the account and container configuration
//! 2. Resolves credentials (account key, Entra ID, managed identity)
//! 3. Asks for confirmation, then deletes the listed documents in rounds,
//!    backing off on throttling and re-authenticating on claims challenges
//! 4. Prints progress and a final summary; details go to the JSON log

mod config;
mod error;
mod identifiers;
mod metrics;
mod output;
mod session;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cosmos_auth::{
    ArmKeySource, ClientBuilder, ClientFactory, CredentialCache, CredentialResolver,
    HttpConnectivityProbe, IdentityProviders,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::session::Session;

/// Command-line arguments.
#[derive(Debug, Default, PartialEq)]
struct CliArgs<'a> {
    config: Option<&'a str>,
    ids: Option<&'a str>,
    yes: bool,
}

impl<'a> CliArgs<'a> {
    fn parse(args: &'a [String]) -> Self {
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .map(|s| s.as_str())
        };
        Self {
            config: value("--config"),
            ids: value("--ids"),
            yes: args.iter().any(|a| a == "--yes" || a == "-y"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("starting cosmos-bulk-delete");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install metrics recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args);

    let config_path = Config::resolve_path(cli.config);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        endpoint = %config.account.endpoint,
        emulator = config.account.emulator,
        auth_method = config.account.auth_method.label(),
        database = %config.target.database,
        container = %config.target.container,
        chunk_size = config.bulk.chunk_size,
        "configuration loaded"
    );

    let ids_path = cli
        .ids
        .context("missing --ids <file.json> (JSON array of {\"id\", \"partitionKey\"} objects)")?;
    let identifiers = identifiers::load(Path::new(ids_path))?;
    info!(count = identifiers.len(), path = ids_path, "identifiers loaded");

    let http_config = config.http_client_config();
    let identities = IdentityProviders::default();
    let mut resolver =
        CredentialResolver::new(Arc::new(HttpConnectivityProbe::new(http_config.clone())));
    if config.account.management.is_some() {
        resolver = resolver.with_key_source(Arc::new(ArmKeySource::new(
            reqwest::Client::new(),
            identities.federated.clone(),
        )));
    }
    let builder: Arc<dyn ClientBuilder> = Arc::new(ClientFactory::new(identities, http_config));
    let cache = Arc::new(CredentialCache::new());

    let session = Session::connect(&config, &resolver, builder, cache)
        .await
        .context("failed to connect to the database account")?;
    info!(
        credentials = ?session.connection().credentials().labels(),
        "credentials resolved"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(output::print_events(events_rx, std::io::stdout()));

    let assume_yes = cli.yes;
    let result = session
        .run(
            identifiers,
            |count| confirm(count, assume_yes),
            &cancel,
            &events_tx,
        )
        .await;
    drop(events_tx);

    let outcome = match printer.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "progress printer panicked");
            None
        }
    };
    session.disconnect().await;

    if let Some(path) = &config.telemetry.metrics_file {
        match metrics::write_textfile(&prometheus_handle, path) {
            Ok(()) => info!(path = %path.display(), "metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write metrics file"),
        }
    }

    result.context("bulk delete failed")?;
    info!(outcome = outcome.map(|o| o.label()), "bulk delete complete");
    Ok(())
}

/// Ask the operator to confirm. Any read failure counts as a refusal.
async fn confirm(count: usize, assume_yes: bool) -> std::io::Result<bool> {
    if assume_yes {
        info!(count, "confirmation skipped (--yes)");
        return Ok(true);
    }
    tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        write!(stdout, "Delete {count} document(s)? This cannot be undone. [y/N] ")?;
        stdout.flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        Ok(parse_answer(&answer))
    })
    .await
    .map_err(std::io::Error::other)?
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Cancel the running delete on SIGINT.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received SIGINT, cancelling");
            cancel.cancel();
        }
        Err(e) => error!(error = %e, "failed to install Ctrl+C handler"),
    }
}
