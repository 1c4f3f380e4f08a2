use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

use crate::error::AppError;
use crate::models::source::SourceStatus;
use crate::routes::api::AppState;

pub async fn list(State(service): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(service.list_source_statuses().await)
}

pub async fn enable(
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let success = service.enable_source(&name).await?;
    let status = service.registry().status(&name).await?;
    Ok(Json(json!({ "success": success, "source": status })))
}

pub async fn disable(
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let success = service.disable_source(&name).await?;
    let status = service.registry().status(&name).await?;
    Ok(Json(json!({ "success": success, "source": status })))
}

/// POST /api/v1/sources/probe
pub async fn probe(State(service): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(service.probe_sources().await)
}
