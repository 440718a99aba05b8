// ============================================================================
// PROMETHEUS METRICS
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter, register_int_counter_vec};
use prometheus::{HistogramVec, IntCounter, IntCounterVec};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========================================================================
    // PUSH NOTIFICATION METRICS
    // ========================================================================

    /// Final outcome of every delivery, one per recipient or broadcast
    pub static ref PUSH_NOTIFICATIONS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "push_notifications_sent_total",
        "Total push notifications sent",
        &["topic", "status"]
    )
    .unwrap();

    pub static ref PUSH_NOTIFICATION_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "push_notification_retries_total",
        "Total push send retries by vendor failure kind",
        &["reason"]
    )
    .unwrap();

    pub static ref FCM_TOKENS_PRUNED_TOTAL: IntCounter = register_int_counter!(
        "fcm_tokens_pruned_total",
        "Device tokens removed after the vendor reported them unregistered"
    )
    .unwrap();

    pub static ref NOTIFICATION_API_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "notification_api_requests_total",
        "Total notification API requests",
        &["endpoint", "status"]
    )
    .unwrap();
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

/// `topic` is empty for targeted pushes without a topic
pub fn record_push_notification(topic: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    PUSH_NOTIFICATIONS_SENT_TOTAL
        .with_label_values(&[topic, status])
        .inc();
}

pub fn record_push_retry(reason: &str) {
    PUSH_NOTIFICATION_RETRIES_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn record_token_pruned() {
    FCM_TOKENS_PRUNED_TOTAL.inc();
}

pub fn record_notification_api_request(endpoint: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    NOTIFICATION_API_REQUESTS.with_label_values(&[endpoint, status]).inc();
}
