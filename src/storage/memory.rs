use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::job::JobPosting;
use crate::storage::{JobSearch, JobStore, StoreStats};

/// Process-local job store, used when no database is configured.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobPosting>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn store_many(&self, jobs: &[JobPosting]) -> Result<usize, AppError> {
        let mut stored = self.jobs.write().await;
        for job in jobs {
            stored.insert(job.id.clone(), job.clone());
        }
        Ok(jobs.len())
    }

    async fn search(&self, search: &JobSearch) -> Result<Vec<JobPosting>, AppError> {
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut matched: Vec<&JobPosting> = jobs.values().filter(|j| search.matches(j, now)).collect();
        matched.sort_by(|a, b| b.collected_at.cmp(&a.collected_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(search.offset() as usize)
            .take(search.limit() as usize)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        let jobs = self.jobs.read().await;
        let mut stats = StoreStats {
            total_jobs: jobs.len() as i64,
            ..Default::default()
        };
        for job in jobs.values() {
            *stats.by_source.entry(job.source.clone()).or_default() += 1;
            let level = job.job_level.map_or("unclassified", |l| l.as_str());
            *stats.by_level.entry(level.to_string()).or_default() += 1;
            if job.remote_friendly {
                stats.remote_jobs += 1;
            }
        }
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
