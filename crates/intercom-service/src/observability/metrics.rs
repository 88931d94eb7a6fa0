//! Metrics definitions for the intercom service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `intercom_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP verbs only
//! - `endpoint`: route templates, id segments collapsed to `{id}`
//! - `status`: success, error, timeout
//! - `operation`: bounded by the bridge client's method set
//! - `flow`: offer, answer, whip, whep

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle `/metrics` renders.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("intercom_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Bridge calls cross the network; allocation is the slow path.
        .set_buckets_for_metric(
            Matcher::Prefix("intercom_bridge_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set bridge request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("intercom_serializer_wait".to_string()),
            &[0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 5.000],
        )
        .map_err(|e| format!("Failed to set serializer buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `intercom_http_requests_total`, `intercom_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("intercom_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("intercom_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse UUID path segments into `{id}`.
///
/// Paths outside the known prefixes become `/other`.
fn normalize_endpoint(path: &str) -> String {
    const KNOWN_PREFIXES: [&str; 4] = ["/api/v1/", "/whip/", "/whep/", "/health"];

    if path == "/metrics" {
        return path.to_string();
    }
    if !KNOWN_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return "/other".to_string();
    }

    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Bridge Metrics
// ============================================================================

/// Record one call to the media bridge.
///
/// Metric: `intercom_bridge_request_duration_seconds`, `intercom_bridge_requests_total`
/// Labels: `operation`, `status`
pub fn record_bridge_request(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("intercom_bridge_request_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());

    counter!("intercom_bridge_requests_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record the outcome of a line conference lookup.
///
/// Metric: `intercom_line_conferences_total`
/// Labels: `outcome` (`reused` | `allocated`)
pub fn record_line_conference(outcome: &'static str) {
    counter!("intercom_line_conferences_total", "outcome" => outcome).increment(1);
}

/// Set the number of bridge endpoints whose ICE or DTLS state is failed.
///
/// Metric: `intercom_bridge_failed_endpoints`
pub fn set_bridge_failed_endpoints(count: usize) {
    gauge!("intercom_bridge_failed_endpoints").set(count as f64);
}

// ============================================================================
// Negotiation Metrics
// ============================================================================

/// Record a negotiation attempt.
///
/// Metric: `intercom_negotiations_total`
/// Labels: `flow`, `status`
pub fn record_negotiation(flow: &'static str, status: &'static str) {
    counter!("intercom_negotiations_total",
        "flow" => flow,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Serializer Metrics
// ============================================================================

/// Record how long a job waited in the serializer queue before it started.
///
/// Metric: `intercom_serializer_wait_seconds`
pub fn record_serializer_wait(duration: Duration) {
    histogram!("intercom_serializer_wait_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Publish the current session counts by liveness state.
///
/// Metric: `intercom_sessions`
/// Labels: `state` (`active` | `inactive` | `expired`)
pub fn set_session_counts(active: usize, inactive: usize, expired: usize) {
    gauge!("intercom_sessions", "state" => "active").set(active as f64);
    gauge!("intercom_sessions", "state" => "inactive").set(inactive as f64);
    gauge!("intercom_sessions", "state" => "expired").set(expired as f64);
}

/// Record sessions removed by the expiry sweep.
///
/// Metric: `intercom_sessions_reaped_total`
pub fn record_sessions_reaped(count: usize) {
    counter!("intercom_sessions_reaped_total").increment(count as u64);
}
