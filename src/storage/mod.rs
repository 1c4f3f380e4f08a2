// Persistence gateway consumed by the collection core.

pub mod fingerprint;
pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::job::{JobLevel, JobPosting};

pub const DEFAULT_SEARCH_LIMIT: i64 = 50;
pub const MAX_SEARCH_LIMIT: i64 = 500;

/// Storage backend for enriched postings. Writes reconcile by `id`; the last
/// write for an id wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert a batch, returning how many records were written.
    async fn store_many(&self, jobs: &[JobPosting]) -> Result<usize, AppError>;

    async fn search(&self, search: &JobSearch) -> Result<Vec<JobPosting>, AppError>;

    async fn stats(&self) -> Result<StoreStats, AppError>;

    /// Reachability check for health reporting.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Filters for `JobStore::search`. Shaped for query-string extraction.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct JobSearch {
    /// Comma separated; a posting matches if any term occurs in its title,
    /// company or description.
    pub keywords: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
    pub job_level: Option<JobLevel>,
    pub remote_only: Option<bool>,
    pub min_keyword_count: Option<u32>,
    /// Posted (or, lacking a posting date, collected) within this many days.
    pub days: Option<u32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobSearch {
    pub fn keyword_terms(&self) -> Vec<String> {
        self.keywords
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days.map(|d| now - Duration::days(i64::from(d)))
    }

    /// In-process filter evaluation, shared by the memory backend.
    pub fn matches(&self, job: &JobPosting, now: DateTime<Utc>) -> bool {
        let terms = self.keyword_terms();
        if !terms.is_empty() {
            let haystack = format!(
                "{} {} {}",
                job.title,
                job.company,
                job.description.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if !terms.iter().any(|t| haystack.contains(t.as_str())) {
                return false;
            }
        }

        if let Some(location) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            let wanted = location.to_lowercase();
            let found = job
                .location
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&wanted));
            if !found {
                return false;
            }
        }

        if let Some(source) = &self.source
            && &job.source != source
        {
            return false;
        }
        if let Some(level) = self.job_level
            && job.job_level != Some(level)
        {
            return false;
        }
        if self.remote_only == Some(true) && !job.remote_friendly {
            return false;
        }
        if let Some(min) = self.min_keyword_count
            && job.keyword_count < min
        {
            return false;
        }
        if let Some(cutoff) = self.cutoff(now)
            && job.posted_date.unwrap_or(job.collected_at) < cutoff
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StoreStats {
    pub total_jobs: i64,
    pub remote_jobs: i64,
    pub by_source: BTreeMap<String, i64>,
    pub by_level: BTreeMap<String, i64>,
}
