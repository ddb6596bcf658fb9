//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ingestion-service metrics
pub const METRICS_PREFIX: &str = "syllabus";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms - P50 target
    0.075, // 75ms
    0.100, // 100ms
    0.150, // 150ms - P99 target
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for a full job run (documents -> chunks -> embeddings -> upserts)
pub const JOB_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
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

    // Ingestion job metrics
    describe_counter!(
        format!("{}_jobs_claimed_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion jobs claimed by a worker task"
    );

    describe_counter!(
        format!("{}_jobs_completed_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion jobs that reached COMPLETED"
    );

    describe_counter!(
        format!("{}_jobs_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion jobs that reached FAILED"
    );

    describe_counter!(
        format!("{}_jobs_canceled_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion jobs that reached CANCELED"
    );

    describe_counter!(
        format!("{}_jobs_retried_total", METRICS_PREFIX),
        Unit::Count,
        "Total ingestion job retry attempts"
    );

    describe_histogram!(
        format!("{}_job_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall-clock duration of a claimed job from claim to terminal state"
    );

    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents processed by the pipeline, by outcome"
    );

    describe_counter!(
        format!("{}_vectors_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector points upserted to the vector store"
    );

    // Embedding metrics
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

    // Database metrics
    describe_gauge!(
        format!("{}_db_connections_active", METRICS_PREFIX),
        Unit::Count,
        "Active database connections"
    );

    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
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

/// Record a job claim
pub fn record_job_claimed(course_code: &str) {
    counter!(
        format!("{}_jobs_claimed_total", METRICS_PREFIX),
        "course" => course_code.to_string()
    )
    .increment(1);
}

/// Record a job reaching a terminal state
pub fn record_job_terminal(course_code: &str, status: &str, duration_secs: f64) {
    let metric = match status {
        "COMPLETED" => format!("{}_jobs_completed_total", METRICS_PREFIX),
        "FAILED" => format!("{}_jobs_failed_total", METRICS_PREFIX),
        "CANCELED" => format!("{}_jobs_canceled_total", METRICS_PREFIX),
        other => {
            tracing::warn!(status = other, "recording terminal metric for unknown status");
            format!("{}_jobs_failed_total", METRICS_PREFIX)
        }
    };

    counter!(metric, "course" => course_code.to_string()).increment(1);

    histogram!(
        format!("{}_job_duration_seconds", METRICS_PREFIX),
        "course" => course_code.to_string()
    )
    .record(duration_secs);
}

/// Record a job retry
pub fn record_job_retried(course_code: &str) {
    counter!(
        format!("{}_jobs_retried_total", METRICS_PREFIX),
        "course" => course_code.to_string()
    )
    .increment(1);
}

/// Record a single document finishing the pipeline
pub fn record_document_processed(course_code: &str, outcome: &str) {
    counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        "course" => course_code.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record vectors upserted for a document
pub fn record_vectors_created(course_code: &str, count: usize) {
    counter!(
        format!("{}_vectors_created_total", METRICS_PREFIX),
        "course" => course_code.to_string()
    )
    .increment(count as u64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        assert!(LATENCY_BUCKETS.contains(&0.050));
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_job_duration_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in JOB_DURATION_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/ingestions/start");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(202);
    }
}
