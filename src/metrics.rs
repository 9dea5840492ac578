/// Metrics for the PLC ledger
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Operation submissions by outcome and rejection kind
/// - Nullifications caused by fork resolution
/// - Commit latency
/// - Background audit and health jobs

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== Operation Metrics ==========

    /// Submitted operations by outcome (accepted, rejected, conflict)
    pub static ref OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "plc_operations_total",
        "Total number of submitted operations",
        &["outcome"]
    )
    .unwrap();

    /// Rejected operations by error kind
    pub static ref REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "plc_rejections_total",
        "Total number of rejected operations by reason",
        &["kind"]
    )
    .unwrap();

    /// Entries nullified by accepted forks
    pub static ref NULLIFIED_TOTAL: IntCounter = register_int_counter!(
        "plc_nullified_total",
        "Total number of operations nullified by fork resolution"
    )
    .unwrap();

    /// Commit duration in seconds
    pub static ref COMMIT_DURATION_SECONDS: Histogram = register_histogram!(
        "plc_commit_duration_seconds",
        "Operation commit latencies in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Audit and health job runs by job and status
    pub static ref AUDIT_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "plc_audit_runs_total",
        "Total number of background job runs",
        &["job", "status"]
    )
    .unwrap();

    /// DIDs whose stored log failed verification
    pub static ref AUDIT_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "plc_audit_failures_total",
        "Total number of operation logs that failed integrity verification"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an accepted operation
pub fn record_accepted(nullified: usize, commit_seconds: f64) {
    OPERATIONS_TOTAL.with_label_values(&["accepted"]).inc();
    NULLIFIED_TOTAL.inc_by(nullified as u64);
    COMMIT_DURATION_SECONDS.observe(commit_seconds);
}

/// Record a rejected or conflicting operation
pub fn record_rejected(kind: &str) {
    let outcome = if kind == "conflict" { "conflict" } else { "rejected" };
    OPERATIONS_TOTAL.with_label_values(&[outcome]).inc();
    REJECTIONS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a background job run
pub fn record_job_run(job: &str, status: &str) {
    AUDIT_RUNS_TOTAL.with_label_values(&[job, status]).inc();
}

/// Record a log that failed integrity verification
pub fn record_audit_failure() {
    AUDIT_FAILURES_TOTAL.inc();
}
