use axum::Json;
use axum::extract::State;

use crate::error::AppError;
use crate::models::collection::CollectionResult;
use crate::models::query::Query;
use crate::routes::api::AppState;

/// POST /api/v1/collect
///
/// Run one collection pass. Per-source failures are reported inside the
/// result; only validation errors and the overall timeout fail the request.
pub async fn collect(
    State(service): State<AppState>,
    Json(query): Json<Query>,
) -> Result<Json<CollectionResult>, AppError> {
    let result = service.collect(query).await?;
    Ok(Json(result))
}

/// POST /api/v1/collect/daily
pub async fn daily(
    State(service): State<AppState>,
    Json(query): Json<Query>,
) -> Result<Json<CollectionResult>, AppError> {
    let result = service.run_daily_aggregation(query).await?;
    Ok(Json(result))
}
