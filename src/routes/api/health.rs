use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::health::{HealthReport, HealthStatus};
use crate::routes::api::AppState;

pub async fn healthz(State(service): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = service.health_check().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}

pub async fn readyz(State(service): State<AppState>) -> impl IntoResponse {
    if service.storage_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
