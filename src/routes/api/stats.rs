use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::routes::api::AppState;

/// GET /api/v1/stats
///
/// Collection counters plus storage stats. A failing store leaves `storage`
/// null rather than failing the request.
pub async fn stats(State(service): State<AppState>) -> Json<serde_json::Value> {
    let collection = service.collection_stats().await;
    let storage = match service.storage_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!("Failed to load storage stats: {e}");
            None
        }
    };
    Json(json!({ "collection": collection, "storage": storage }))
}
