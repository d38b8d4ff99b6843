//! Health check endpoints.
//!
//! `/health` answers as long as the process serves requests. `/health/ready`
//! is assembled by the application from its own probes (database ping, store
//! health) and rendered here.

use axum::{http::StatusCode, Json};
use gigbook_runtime::{HealthReport, HealthStatus};
use serde_json::{json, Value};

/// Liveness probe.
///
/// ```text
/// GET /health  →  200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Render a readiness report.
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// ```json
/// {
///   "status": "healthy",
///   "checks": [{ "component": "database", "status": "healthy", "message": null }],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
#[must_use]
pub fn readiness(report: &HealthReport) -> (StatusCode, Json<Value>) {
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let checks: Vec<Value> = report
        .checks
        .iter()
        .map(|check| {
            json!({
                "component": check.component,
                "status": check.status.to_string(),
                "message": check.message,
            })
        })
        .collect();

    (
        status,
        Json(json!({
            "status": report.status.to_string(),
            "checks": checks,
            "timestamp": report.timestamp.to_rfc3339(),
        })),
    )
}
