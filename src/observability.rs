use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "clinicd_http_requests_total";

/// Histogram: request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "clinicd_http_request_duration_seconds";

/// Counter: availability checks run. Labels: outcome (available, conflict).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "clinicd_availability_checks_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: requests currently being handled.
pub const REQUESTS_IN_FLIGHT: &str = "clinicd_requests_in_flight";

/// Counter: requests rejected because the in-flight limit was reached.
pub const REQUESTS_REJECTED_TOTAL: &str = "clinicd_requests_rejected_total";

/// Counter: requests with a missing or wrong bearer token.
pub const AUTH_FAILURES_TOTAL: &str = "clinicd_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clinicd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "clinicd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Status label grouped by class, so label cardinality stays small.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
