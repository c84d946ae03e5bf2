//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Counters for approve/reject decisions and gauges for the pending backlog

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::RequestKind;
use crate::requests::Decision;
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const REQUEST_DECISIONS_TOTAL: &str = "request_decisions_total";
pub const PENDING_REQUESTS: &str = "pending_requests";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Must be called at most once per process.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        REQUEST_DECISIONS_TOTAL,
        "Approve/reject decisions applied, by request kind"
    );
    describe_gauge!(PENDING_REQUESTS, "Requests still awaiting a decision");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Refresh the pending backlog gauges from the database.
async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM accommodations WHERE status = 'pending'",
    )
    .fetch_one(&state.db)
    .await
    {
        gauge!(PENDING_REQUESTS, "kind" => RequestKind::Accommodation.as_str()).set(count as f64);
    }

    if let Ok(count) = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM absences WHERE COALESCE(status, 'pending') = 'pending'",
    )
    .fetch_one(&state.db)
    .await
    {
        gauge!(PENDING_REQUESTS, "kind" => RequestKind::Absence.as_str()).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched path keeps label cardinality bounded (/api/courses/:id)
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Record an approve/reject decision.
pub fn record_request_decision(kind: RequestKind, decision: Decision) {
    counter!(
        REQUEST_DECISIONS_TOTAL,
        "kind" => kind.as_str(),
        "decision" => decision.as_str()
    )
    .increment(1);
}
