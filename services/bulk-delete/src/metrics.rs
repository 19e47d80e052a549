//! Prometheus metrics export
//!
//! The bulk engine records through the `metrics` facade:
//!
//! - `bulk_delete_items_total` (counter): label `outcome`
//! - `bulk_delete_rounds_total` (counter)
//! - `bulk_delete_backoff_seconds` (histogram)
//! - `claims_challenge_retries_total` (counter)
//! - `bulk_delete_runs_total` (counter): label `result`
//!
//! A CLI run is short-lived, so instead of serving `/metrics` the rendered
//! exposition is written once on exit to a textfile-collector path.

use std::path::Path;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Backoff waits range from a few milliseconds to the server's longest
/// retry-after hints.
const BACKOFF_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("bulk_delete_backoff_seconds".to_string()),
        BACKOFF_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `bulk_delete_backoff_seconds` with histogram buckets so it
/// renders `_bucket` lines rather than the default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Write the current exposition to `path` atomically (temp file + rename),
/// so a collector never reads a half-written file.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, handle.render())?;
    std::fs::rename(&tmp, path)
}
