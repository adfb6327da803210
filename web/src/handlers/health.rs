//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify gateway and backend service health.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use kafka_bridge_runtime::{HealthReport, HealthStatus};

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the gateway is running.
/// This endpoint does NOT contact backend services.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Health of every configured backend service.
///
/// Sends a `health` request to each service concurrently over the bridge and
/// returns the composite report.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /health/services
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "degraded",
///   "services": [
///     { "service": "user-service", "status": "healthy", "message": null, "metadata": {} },
///     { "service": "product-service", "status": "degraded", "message": "database unavailable", "metadata": {} }
///   ],
///   "timestamp": "2024-01-01T00:00:00Z"
/// }
/// ```
pub async fn services_health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.fanout().check_health(state.health_targets()).await;

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
