use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Fingerprints accepted by earlier collection runs.
#[async_trait]
pub trait FingerprintCache: Send + Sync {
    async fn seen(&self, key: &str) -> Result<bool, AppError>;

    async fn remember(&self, key: &str) -> Result<(), AppError>;

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFingerprintCache {
    keys: RwLock<HashSet<String>>,
}

impl MemoryFingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintCache for MemoryFingerprintCache {
    async fn seen(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.keys.read().await.contains(key))
    }

    async fn remember(&self, key: &str) -> Result<(), AppError> {
        self.keys.write().await.insert(key.to_string());
        Ok(())
    }
}

/// Fingerprints persisted in the `job_fingerprints` table.
pub struct PgFingerprintCache {
    pool: PgPool,
}

impl PgFingerprintCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintCache for PgFingerprintCache {
    async fn seen(&self, key: &str) -> Result<bool, AppError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM job_fingerprints WHERE fingerprint = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn remember(&self, key: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO job_fingerprints (fingerprint) VALUES ($1) ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
