//! Operation metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! these calls are no-ops.
//!
//! - `bulk_delete_items_total` (counter): label `outcome`
//! - `bulk_delete_rounds_total` (counter)
//! - `bulk_delete_backoff_seconds` (histogram)
//! - `claims_challenge_retries_total` (counter)
//! - `bulk_delete_runs_total` (counter): label `result`

pub fn record_items(outcome: &'static str, count: usize) {
    if count > 0 {
        metrics::counter!("bulk_delete_items_total", "outcome" => outcome).increment(count as u64);
    }
}

pub fn record_round() {
    metrics::counter!("bulk_delete_rounds_total").increment(1);
}

pub fn record_backoff(seconds: f64) {
    metrics::histogram!("bulk_delete_backoff_seconds").record(seconds);
}

pub fn record_claims_retry() {
    metrics::counter!("claims_challenge_retries_total").increment(1);
}

pub fn record_run(result: &'static str) {
    metrics::counter!("bulk_delete_runs_total", "result" => result).increment(1);
}
