//! Metrics and observability utilities
//!
//! Prometheus metrics for context retrieval with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, gauge, describe_gauge, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all WindowForge metrics
pub const METRICS_PREFIX: &str = "windowforge";

/// SLO-aligned histogram buckets for query latency (in seconds)
/// Targets: P50 < 50ms, P99 < 250ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.100,  // 100ms
    0.250,  // 250ms - P99 target
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Whole milliseconds, saturating at `u64::MAX`
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_context_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of context queries"
    );

    describe_histogram!(
        format!("{}_context_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Context query latency in seconds"
    );

    describe_gauge!(
        format!("{}_context_documents_count", METRICS_PREFIX),
        Unit::Count,
        "Number of documents returned by the last context query"
    );

    describe_counter!(
        format!("{}_seeds_expanded_total", METRICS_PREFIX),
        Unit::Count,
        "Seeds expanded, labelled by stop reason"
    );

    describe_counter!(
        format!("{}_chunks_absorbed_total", METRICS_PREFIX),
        Unit::Count,
        "Neighbour chunks absorbed into context windows"
    );

    describe_histogram!(
        format!("{}_expansion_passes", METRICS_PREFIX),
        Unit::Count,
        "Widening passes needed per seed"
    );

    describe_counter!(
        format!("{}_seed_expansion_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Seeds degraded to themselves after a failed range read"
    );

    describe_counter!(
        format!("{}_query_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "Context queries cut short by their deadline"
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

/// Record a finished context query
pub fn record_query(duration_secs: f64, mode: &str, document_count: usize) {
    counter!(
        format!("{}_context_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_context_query_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_context_documents_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(document_count as f64);
}

/// Record one seed's expansion
pub fn record_expansion(stop: &str, absorbed: usize, passes: u32) {
    counter!(
        format!("{}_seeds_expanded_total", METRICS_PREFIX),
        "stop" => stop.to_string()
    )
    .increment(1);

    counter!(format!("{}_chunks_absorbed_total", METRICS_PREFIX)).increment(absorbed as u64);

    histogram!(format!("{}_expansion_passes", METRICS_PREFIX)).record(passes as f64);
}

/// Record a seed that fell back to itself
pub fn record_seed_failure() {
    counter!(format!("{}_seed_expansion_failures_total", METRICS_PREFIX)).increment(1);
}

/// Record a deadline hit, labelled by the stage that was cut short
pub fn record_timeout(stage: &str) {
    counter!(
        format!("{}_query_timeouts_total", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .increment(1);
}
