use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "slotkeeper_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "slotkeeper_http_request_duration_seconds";

// ── Scheduling ──────────────────────────────────────────────────

/// Counter: slot lists computed.
pub const SLOT_COMPUTATIONS_TOTAL: &str = "slotkeeper_slot_computations_total";

/// Counter: booking commit attempts. Labels: outcome.
pub const BOOKING_COMMITS_TOTAL: &str = "slotkeeper_booking_commits_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotkeeper_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotkeeper_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an EngineError variant to a short label for metrics.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::Conflict(_) => "conflict",
        EngineError::ExternalConflict(_) => "external_conflict",
        EngineError::NoAssignedStaff(_) => "no_assigned_staff",
        EngineError::InvalidTransition { .. } => "invalid_transition",
        EngineError::HasActiveBookings(_) => "has_active_bookings",
        EngineError::Validation(_) => "validation",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "wal",
        EngineError::Calendar(_) => "calendar",
    }
}
