//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion. Room ids never appear
//! as label values; paths are normalized to their route templates.
//! - `endpoint`: ~10 values
//! - `outcome`: 4 admission outcomes
//! - `reason`: explicit, expired
//! - `operation`: one per store method

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder with histogram buckets for this service.
///
/// # Errors
///
/// Fails if a global recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("room_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("room_store_operation".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500,
            ],
        )
        .map_err(|e| format!("Failed to set store operation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `room_http_requests_total`, `room_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("room_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/redirect/error/timeout.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        300..=399 => "redirect",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Replace room ids in a path with a placeholder.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/rooms" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();

    match parts.as_slice() {
        ["", "room", _] => "/room/{room_id}".to_string(),
        ["", "api", "rooms", _] => "/api/rooms/{room_id}".to_string(),
        ["", "api", "rooms", _, action @ ("ttl" | "messages" | "events")] => {
            format!("/api/rooms/{{room_id}}/{action}")
        }
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Room Lifecycle Metrics
// ============================================================================

/// Metric: `room_rooms_created_total`
pub fn record_room_created() {
    counter!("room_rooms_created_total").increment(1);
}

/// Metric: `room_rooms_destroyed_total`
/// Labels: `reason` (explicit, expired)
pub fn record_room_destroyed(reason: &str) {
    counter!("room_rooms_destroyed_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Metric: `room_admissions_total`
/// Labels: `outcome` (admitted, reentered, full, not_found)
pub fn record_admission(outcome: &str) {
    counter!("room_admissions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Metric: `room_messages_appended_total`
pub fn record_message_appended() {
    counter!("room_messages_appended_total").increment(1);
}

// ============================================================================
// Fan-out Metrics
// ============================================================================

/// Metric: `room_events_published_total`
/// Labels: `event` (message, destroy)
pub fn record_event_published(event: &str) {
    counter!("room_events_published_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Metric: `room_event_subscribers`
pub fn subscriber_connected() {
    gauge!("room_event_subscribers").increment(1.0);
}

/// Metric: `room_event_subscribers`
pub fn subscriber_disconnected() {
    gauge!("room_event_subscribers").decrement(1.0);
}

/// Metric: `room_tracked_channels`
#[allow(clippy::cast_precision_loss)] // channel counts stay far below 2^52
pub fn set_tracked_channels(count: usize) {
    gauge!("room_tracked_channels").set(count as f64);
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a store round trip.
///
/// Metric: `room_store_operation_duration_seconds`, `room_store_operations_total`
/// Labels: `operation`, `status`
pub fn record_store_operation(operation: &str, status: &str, duration: Duration) {
    histogram!("room_store_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
