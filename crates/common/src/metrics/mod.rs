//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming. Installing an exporter is
//! the binary's job; without one every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PolicyReply metrics
pub const METRICS_PREFIX: &str = "policyreply";

/// Buckets for end-to-end answer latency (model calls dominate)
pub const ANSWER_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    40.00,  // 40s
    90.00,  // 90s - default LLM timeout
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

    // Pipeline metrics
    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answers produced, labelled by confidence"
    );

    describe_histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end answer latency in seconds"
    );

    describe_histogram!(
        format!("{}_passages_retrieved", METRICS_PREFIX),
        Unit::Count,
        "Passages returned by the retriever per question"
    );

    describe_histogram!(
        format!("{}_passages_kept", METRICS_PREFIX),
        Unit::Count,
        "Passages surviving the cluster filter per question"
    );

    // Collaborator metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total completion requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion latency in seconds"
    );

    // Inbound triage
    describe_counter!(
        format!("{}_inbound_messages_total", METRICS_PREFIX),
        Unit::Count,
        "Inbound messages by triage outcome"
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

/// Helper to record one finished pipeline run
pub fn record_answer(duration_secs: f64, confidence: &str, retrieved: usize, kept: usize) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "confidence" => confidence.to_string()
    )
    .increment(1);

    histogram!(format!("{}_answer_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_passages_retrieved", METRICS_PREFIX)).record(retrieved as f64);
    histogram!(format!("{}_passages_kept", METRICS_PREFIX)).record(kept as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => batch_bucket(batch_size)
        )
        .record(duration_secs);
    }
}

/// Helper to record completion metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_completion_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record inbound triage outcomes (`replied`, `skipped_sender`, ...)
pub fn record_inbound(outcome: &str) {
    counter!(
        format!("{}_inbound_messages_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

fn batch_bucket(batch_size: usize) -> &'static str {
    match batch_size {
        0..=1 => "1",
        2..=8 => "2-8",
        9..=32 => "9-32",
        _ => "33+",
    }
}
