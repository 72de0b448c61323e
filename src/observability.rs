use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "stitchbook_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "stitchbook_http_request_duration_seconds";

/// Counter: requests turned away because the in-flight limit was reached.
pub const REQUESTS_REJECTED_TOTAL: &str = "stitchbook_requests_rejected_total";

// ── Scheduling ──────────────────────────────────────────────────

/// Counter: booking attempts that reached the conflict check. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "stitchbook_bookings_total";

/// Counter: bookings refused because the interval was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "stitchbook_booking_conflicts_total";

/// Counter: reminder notifications dispatched.
pub const REMINDERS_SENT_TOTAL: &str = "stitchbook_reminders_sent_total";

// ── Side effects ────────────────────────────────────────────────

/// Counter: notifications the notifier failed to deliver.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "stitchbook_notifications_failed_total";

/// Counter: audit records that could not be written.
pub const AUDIT_FAILED_TOTAL: &str = "stitchbook_audit_failed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: requests currently being served.
pub const REQUESTS_IN_FLIGHT: &str = "stitchbook_requests_in_flight";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stitchbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stitchbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Count and time every request by its route template, not its concrete path.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();

    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());
    response
}
