use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::job::JobPosting;

/// Outcome of one `collect` call.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub jobs: Vec<JobPosting>,
    pub total_jobs: usize,
    /// Normalized records entering deduplication.
    pub raw_jobs: usize,
    pub duplicates_removed: usize,
    /// Records returned by the sources before normalization.
    pub fetched_jobs: usize,
    /// Records dropped by the normalizer for missing title or company.
    pub discarded_jobs: usize,
    /// `None` when persistence was skipped or failed.
    pub jobs_stored: Option<usize>,
    pub sources_queried: Vec<String>,
    pub successful_sources: Vec<String>,
    pub failed_sources: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub collection_timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl CollectionResult {
    /// Checks the count and partition invariants.
    pub fn is_consistent(&self) -> bool {
        let queried: BTreeSet<&String> = self.sources_queried.iter().collect();
        let ok: BTreeSet<&String> = self.successful_sources.iter().collect();
        let failed: BTreeSet<&String> = self.failed_sources.iter().collect();

        self.raw_jobs >= self.total_jobs
            && self.total_jobs == self.jobs.len()
            && self.duplicates_removed == self.raw_jobs - self.total_jobs
            && self.fetched_jobs == self.raw_jobs + self.discarded_jobs
            && ok.is_disjoint(&failed)
            && ok.union(&failed).copied().collect::<BTreeSet<_>>() == queried
            && self.errors.keys().all(|k| failed.contains(k))
    }
}

/// Running counters exposed through `collection_stats`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CollectionStats {
    pub total_jobs_collected: u64,
    pub jobs_collected_today: u64,
    pub active_sources: usize,
    pub collections_run: u64,
    pub average_collection_seconds: f64,
    pub last_collection_at: Option<DateTime<Utc>>,
}
