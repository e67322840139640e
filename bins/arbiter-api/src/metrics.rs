// Prometheus metrics for the HTTP surface

use arbiter_common::types::Verdict;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec, IntCounter,
    IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_requests_total",
        "Execution requests by mode and HTTP status",
        &["mode", "status"]
    )
    .unwrap();
    pub static ref VERDICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_verdicts_total",
        "Graded submissions by language and verdict",
        &["language", "verdict"]
    )
    .unwrap();
    pub static ref INFRA_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "arbiter_infra_failures_total",
        "Requests aborted by sandbox, workspace or store failures"
    )
    .unwrap();
    pub static ref GRADING_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "arbiter_grading_duration_seconds",
        "Wall time spent executing a request",
        &["mode"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Verdict class without the test case suffix, for bounded label cardinality.
pub fn verdict_class(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Accepted => "accepted",
        Verdict::WrongAnswer { .. } => "wrong_answer",
        Verdict::CompilationError { .. } => "compilation_error",
        Verdict::RuntimeError { .. } => "runtime_error",
        Verdict::TimeLimitExceeded { .. } => "time_limit_exceeded",
        Verdict::MemoryLimitExceeded { .. } => "memory_limit_exceeded",
    }
}

/// Default registry in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_families() {
        REQUESTS_TOTAL.with_label_values(&["run", "200"]).inc();
        INFRA_FAILURES_TOTAL.inc();

        let text = render();
        assert!(text.contains("arbiter_requests_total"));
        assert!(text.contains("arbiter_infra_failures_total"));
    }

    #[test]
    fn test_verdict_class_drops_test_index() {
        let verdict = Verdict::TimeLimitExceeded {
            test_index: 7,
            diagnostic: String::new(),
        };
        assert_eq!(verdict_class(&verdict), "time_limit_exceeded");
    }
}
