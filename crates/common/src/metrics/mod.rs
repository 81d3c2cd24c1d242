//! Metrics and observability utilities
//!
//! Prometheus-style metric names for the question pipeline and index builds.
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all AskDocs metrics
pub const METRICS_PREFIX: &str = "askdocs";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for model and embedding calls (hosted APIs, typically seconds)
pub const MODEL_BUCKETS: &[f64] = &[
    0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00, 60.00,
];

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
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions answered, by mode and outcome"
    );

    describe_counter!(
        format!("{}_empty_context_total", METRICS_PREFIX),
        Unit::Count,
        "Questions answered with the empty-context advisory"
    );

    describe_counter!(
        format!("{}_model_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Language model invocations that failed"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    describe_counter!(
        format!("{}_web_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Web searches, by outcome"
    );

    describe_counter!(
        format!("{}_index_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Similarity index builds, by status"
    );

    describe_histogram!(
        format!("{}_index_build_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Similarity index build latency in seconds"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks embedded into session indexes"
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

/// Record one answered question
pub fn record_question(mode: &str, status: &str) {
    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if status == "empty_context" {
        counter!(
            format!("{}_empty_context_total", METRICS_PREFIX),
            "mode" => mode.to_string()
        )
        .increment(1);
    }
}

/// Record one language model invocation
pub fn record_model_call(duration_secs: f64, model: &str, success: bool) {
    histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);

    if !success {
        counter!(
            format!("{}_model_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record a web search outcome (`results`, `empty` or `unavailable`)
pub fn record_web_search(provider: &str, outcome: &str) {
    counter!(
        format!("{}_web_searches_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a similarity index build
pub fn record_index_build(duration_secs: f64, chunks: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_index_builds_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(format!("{}_index_build_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if success {
        counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX)).increment(chunks as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, MODEL_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        let metrics = RequestMetrics::start("POST", "/v1/sessions/{id}/ask");
        metrics.finish(200);
        record_question("doc", "empty_context");
        record_model_call(0.2, "echo", false);
        record_web_search("tavily", "unavailable");
        record_index_build(0.01, 12, true);
    }
}
