use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Hash a raw API token for comparison.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Expected bearer token, kept only as its hash. `None` disables auth.
#[derive(Clone, Default)]
pub struct ApiToken {
    hash: Option<Arc<str>>,
}

impl ApiToken {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            hash: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| Arc::from(hash_token(t))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.hash.is_some()
    }
}

/// Middleware that validates the Bearer token when one is configured.
pub async fn require_api_token(
    State(expected): State<ApiToken>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = expected.hash else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    if hash_token(token.trim()) != *expected {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
