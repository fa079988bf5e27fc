//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the question-answering pipeline with
//! standardized naming under a single prefix.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocQA metrics
pub const METRICS_PREFIX: &str = "docqa";

/// Buckets for end-to-end query latency (in seconds). Generation dominates.
pub const QUERY_BUCKETS: &[f64] = &[
    0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 20.00, 30.00, 60.00, 120.0,
];

/// Buckets for a single backend call (search, embedding, rerank)
pub const BACKEND_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total question-answering queries by outcome"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Latency of each pipeline stage in seconds"
    );

    describe_gauge!(
        format!("{}_stage_candidates", METRICS_PREFIX),
        Unit::Count,
        "Number of candidates produced by the most recent run of each stage"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    describe_counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Requests to search, rerank and generation backends"
    );

    describe_counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Backend calls retried after a transient failure"
    );

    tracing::info!("Metrics registered");
}

/// Tracks one pipeline stage from creation to `finish`
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    /// Start timing a stage
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record the stage duration and how many candidates it produced.
    /// Returns the elapsed milliseconds for logging.
    pub fn finish(self, candidates: usize) -> u64 {
        let elapsed = self.start.elapsed();

        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(elapsed.as_secs_f64());

        gauge!(
            format!("{}_stage_candidates", METRICS_PREFIX),
            "stage" => self.stage
        )
        .set(candidates as f64);

        elapsed.as_millis() as u64
    }
}

/// Helper to record the outcome of one query
pub fn record_query(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_query_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(batch_size as u64);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to count a call to a search, rerank or generation backend
pub fn record_backend_request(backend: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Helper to count a retried backend call
pub fn record_retry(operation: &str) {
    counter!(
        format!("{}_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}
