use axum::Json;
use axum::extract::{Query, State};

use crate::error::AppError;
use crate::models::job::JobPosting;
use crate::routes::api::AppState;
use crate::storage::JobSearch;

pub async fn search(
    State(service): State<AppState>,
    Query(search): Query<JobSearch>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let jobs = service.search_jobs(&search).await?;
    Ok(Json(jobs))
}
