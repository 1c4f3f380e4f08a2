pub mod collect;
pub mod health;
pub mod jobs;
pub mod sources;
pub mod stats;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::auth::{ApiToken, require_api_token};
use crate::collectors::runner::CollectionService;

pub type AppState = Arc<CollectionService>;

pub fn router(service: AppState, api_token: ApiToken) -> Router {
    let protected = Router::new()
        // Collection
        .route("/collect", post(collect::collect))
        .route("/collect/daily", post(collect::daily))
        // Sources
        .route("/sources", get(sources::list))
        .route("/sources/probe", post(sources::probe))
        .route("/sources/{name}/enable", post(sources::enable))
        .route("/sources/{name}/disable", post(sources::disable))
        // Stored jobs
        .route("/jobs", get(jobs::search))
        .route("/stats", get(stats::stats))
        .layer(middleware::from_fn_with_state(api_token, require_api_token))
        .with_state(service.clone());

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(service)
        .nest("/api/v1", protected)
}
