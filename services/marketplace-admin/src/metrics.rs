//! Prometheus metrics exposition
//!
//! - `marketplace_operations_total` (counter): labels `operation`, `outcome`
//! - `marketplace_operation_duration_seconds` (histogram): label `operation`
//!
//! `outcome` is `success` or the error code returned to the caller.

use marketplace_api::Operation;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "marketplace_operation_duration_seconds";

/// Bucket boundaries from 5ms up to the longest configurable marketplace timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("histogram buckets are non-empty")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished operation with its outcome label.
pub fn record_operation(operation: Operation, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "marketplace_operations_total",
        "operation" => operation.as_str(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "operation" => operation.as_str()).record(duration_secs);
}
