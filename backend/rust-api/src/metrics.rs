use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Document store metrics
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref QUIZ_ATTEMPTS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_attempts_submitted_total",
        "Total number of graded quiz attempts",
        &["passed"]
    )
    .unwrap();

    pub static ref ORDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "orders_total",
        "Order lifecycle transitions",
        &["status"]
    )
    .unwrap();

    pub static ref PAYMENT_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "payment_verifications_total",
        "Gateway signature verifications",
        &["result"]
    )
    .unwrap();

    pub static ref CERTIFICATES_ISSUED_TOTAL: IntCounter = register_int_counter!(
        "certificates_issued_total",
        "Total number of certificates issued"
    )
    .unwrap();

    pub static ref PROGRESS_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "progress_updates_total",
        "Lesson progress reports",
        &["completed"]
    )
    .unwrap();

    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Login attempts by outcome",
        &["result"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a store operation with metrics
pub async fn track_db_operation<F, T, E>(operation: &str, collection: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_attempt_submitted(passed: bool) {
    QUIZ_ATTEMPTS_SUBMITTED_TOTAL
        .with_label_values(&[if passed { "true" } else { "false" }])
        .inc();
}

pub fn record_order(status: &str) {
    ORDERS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_payment_verification(result: &str) {
    PAYMENT_VERIFICATIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_progress_update(completed: bool) {
    PROGRESS_UPDATES_TOTAL
        .with_label_values(&[if completed { "true" } else { "false" }])
        .inc();
}

pub fn record_login(result: &str) {
    LOGINS_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = CERTIFICATES_ISSUED_TOTAL.get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        record_attempt_submitted(true);

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("quiz_attempts_submitted_total"));
    }

    #[tokio::test]
    async fn tracks_operation_outcome() {
        let before = DB_OPERATIONS_TOTAL
            .with_label_values(&["find_one", "metrics_test", "error"])
            .get();

        let result: Result<(), &str> =
            track_db_operation("find_one", "metrics_test", async { Err("boom") }).await;

        assert!(result.is_err());
        assert_eq!(
            DB_OPERATIONS_TOTAL
                .with_label_values(&["find_one", "metrics_test", "error"])
                .get(),
            before + 1
        );
    }
}
