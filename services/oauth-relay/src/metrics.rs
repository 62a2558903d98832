//! Prometheus metrics exposition
//!
//! - `relay_requests_total` (counter): labels `route`, `status`
//! - `relay_oauth_outcomes_total` (counter): labels `phase`, `outcome`
//! - `relay_provider_call_duration_seconds` (histogram): label `operation`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const PROVIDER_CALL_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("relay_provider_call_duration_seconds".to_string()),
        PROVIDER_CALL_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Provider call latency renders as a histogram with buckets up to 30s,
/// covering the configurable client timeout range.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed relay request.
pub fn record_request(route: &'static str, status: u16) {
    metrics::counter!("relay_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
}

/// Record how a flow phase ended: `ok` or an error kind.
pub fn record_oauth_outcome(phase: &'static str, outcome: &'static str) {
    metrics::counter!("relay_oauth_outcomes_total", "phase" => phase, "outcome" => outcome)
        .increment(1);
}

/// Record the latency of one call to the provider.
pub fn record_provider_call(operation: &'static str, duration_secs: f64) {
    metrics::histogram!("relay_provider_call_duration_seconds", "operation" => operation)
        .record(duration_secs);
}
