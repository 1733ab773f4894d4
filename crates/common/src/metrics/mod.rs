//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the recommendation pipeline
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all litgraph metrics
pub const METRICS_PREFIX: &str = "litgraph";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.025,  // 25ms
    0.050,  // 50ms - cached reads
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s - typical orchestration
    20.00,  // 20s
    45.00,  // 45s
];

/// Buckets for external service latency (generative and bibliographic)
pub const EXTERNAL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s - timeout
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Recommendation metrics
    describe_counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        Unit::Count,
        "Recommendation runs by outcome"
    );

    describe_histogram!(
        format!("{}_recommendation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end orchestration latency in seconds"
    );

    describe_counter!(
        format!("{}_candidates_proposed_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates returned by the proposal service"
    );

    describe_counter!(
        format!("{}_candidates_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates dropped before ranking, by reason"
    );

    describe_counter!(
        format!("{}_exclusion_resets_total", METRICS_PREFIX),
        Unit::Count,
        "Pipelines retried with the exclusion set cleared"
    );

    describe_counter!(
        format!("{}_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Degraded external calls replaced by a local fallback"
    );

    // External service metrics
    describe_counter!(
        format!("{}_external_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total external service requests"
    );

    describe_histogram!(
        format!("{}_external_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External service latency in seconds"
    );

    describe_counter!(
        format!("{}_external_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total external service errors"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the outcome of one orchestration
pub fn record_recommendation(duration_secs: f64, outcome: &str, anchored: bool) {
    let flow = if anchored { "from_base" } else { "context" };

    counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        "outcome" => outcome.to_string(),
        "flow" => flow
    )
    .increment(1);

    histogram!(
        format!("{}_recommendation_duration_seconds", METRICS_PREFIX),
        "flow" => flow
    )
    .record(duration_secs);
}

/// Record how many candidates a proposal produced
pub fn record_candidates_proposed(count: usize, fallback: bool) {
    counter!(
        format!("{}_candidates_proposed_total", METRICS_PREFIX),
        "fallback" => fallback.to_string()
    )
    .increment(count as u64);
}

/// Record a candidate dropped before ranking
pub fn record_candidate_dropped(reason: &str) {
    counter!(
        format!("{}_candidates_dropped_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a pipeline retried without exclusions
pub fn record_exclusion_reset() {
    counter!(format!("{}_exclusion_resets_total", METRICS_PREFIX)).increment(1);
}

/// Record a local fallback standing in for an external call
pub fn record_fallback(kind: &str) {
    counter!(
        format!("{}_fallbacks_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Helper to record external service metrics
pub fn record_external(duration_secs: f64, service: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_external_requests_total", METRICS_PREFIX),
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_external_duration_seconds", METRICS_PREFIX),
            "service" => service.to_string(),
            "operation" => operation.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_external_errors_total", METRICS_PREFIX),
            "service" => service.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}
