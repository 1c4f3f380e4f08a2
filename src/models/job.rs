use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seniority bucket assigned during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobLevel {
    Entry,
    Mid,
    Senior,
    Management,
}

impl JobLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLevel::Entry => "entry",
            JobLevel::Mid => "mid",
            JobLevel::Senior => "senior",
            JobLevel::Management => "management",
        }
    }
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(JobLevel::Entry),
            "mid" | "mid-level" => Ok(JobLevel::Mid),
            "senior" => Ok(JobLevel::Senior),
            "management" => Ok(JobLevel::Management),
            other => Err(format!("unknown job level '{other}'")),
        }
    }
}

/// Canonical, source-agnostic job posting produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub url: Option<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    /// `None` until enriched.
    pub job_level: Option<JobLevel>,
    pub remote_friendly: bool,
    pub keyword_count: u32,
    pub raw_data: serde_json::Value,
    pub collected_at: DateTime<Utc>,
}

/// Classification metadata attached by an enricher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    pub job_level: JobLevel,
    pub remote_friendly: bool,
    pub keyword_count: u32,
}

impl Default for Enrichment {
    /// Fallback applied when the enricher fails.
    fn default() -> Self {
        Self {
            job_level: JobLevel::Mid,
            remote_friendly: false,
            keyword_count: 0,
        }
    }
}

impl JobPosting {
    pub fn apply(&mut self, enrichment: Enrichment) {
        self.job_level = Some(enrichment.job_level);
        self.remote_friendly = enrichment.remote_friendly;
        self.keyword_count = enrichment.keyword_count;
    }
}
