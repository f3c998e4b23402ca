//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the upload workflow, the analysis
//! generator and the reconciler, with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ResearchEase metrics
pub const METRICS_PREFIX: &str = "researchease";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for uploads and analyses, which include remote I/O
pub const WORKFLOW_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
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

    // Upload workflow
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Upload attempts by outcome"
    );

    describe_histogram!(
        format!("{}_upload_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end upload workflow latency in seconds"
    );

    describe_counter!(
        format!("{}_intake_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Files rejected at intake by reason"
    );

    // Analysis
    describe_counter!(
        format!("{}_analyses_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Analyses generated by analyzer and outcome"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Analysis generation latency in seconds"
    );

    // Reconciler
    describe_counter!(
        format!("{}_reconcile_repairs_total", METRICS_PREFIX),
        Unit::Count,
        "Inconsistencies repaired by the reconciler, by kind"
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

/// Record a finished upload workflow; `outcome` is `success` or an error code
pub fn record_upload(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_upload_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

pub fn record_intake_rejection(reason: &str) {
    counter!(
        format!("{}_intake_rejections_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record an analysis generation attempt
pub fn record_analysis(duration_secs: f64, analyzer: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_analyses_generated_total", METRICS_PREFIX),
        "analyzer" => analyzer.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_analysis_duration_seconds", METRICS_PREFIX),
            "analyzer" => analyzer.to_string()
        )
        .record(duration_secs);
    }
}

/// Record repairs made by one reconciler pass
pub fn record_repairs(kind: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_reconcile_repairs_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(count as u64);
}
