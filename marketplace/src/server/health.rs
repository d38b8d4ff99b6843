//! Health check endpoints for Gigbook.

use super::state::AppState;
use axum::extract::State;
use axum::{http::StatusCode, Json};
use gigbook_runtime::{HealthCheck, HealthReport};
use serde_json::Value;

pub use gigbook_web::handlers::health::health_check;

/// Readiness check endpoint.
///
/// Pings the database. Without a pool (in-memory wiring) the database check
/// reports degraded rather than failing the probe.
///
/// ```bash
/// curl http://localhost:3000/health/ready
/// # {"status":"healthy","checks":[{"component":"database",...}],...}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match &state.pool {
        Some(pool) => match gigbook_postgres::ping(pool).await {
            Ok(()) => HealthCheck::healthy("database"),
            Err(error) => {
                tracing::warn!(%error, "Readiness: database ping failed");
                HealthCheck::unhealthy("database", "ping failed")
            },
        },
        None => HealthCheck::degraded("database", "in-memory repositories"),
    };

    gigbook_web::handlers::health::readiness(&HealthReport::new(vec![database]))
}
