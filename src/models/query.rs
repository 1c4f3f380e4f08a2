use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_MAX_JOBS_PER_SOURCE: u32 = 50;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Parameters for one collection pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_max_jobs")]
    pub max_jobs_per_source: u32,
    /// Explicit allow-list. `None` means every enabled source.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub include_remote: bool,
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
    /// Persist the enriched batch through the storage gateway.
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_max_jobs() -> u32 {
    DEFAULT_MAX_JOBS_PER_SOURCE
}

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_true() -> bool {
    true
}

impl Default for Query {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            location: None,
            max_jobs_per_source: DEFAULT_MAX_JOBS_PER_SOURCE,
            sources: None,
            include_remote: true,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            persist: true,
        }
    }
}

impl Query {
    /// Checks the numeric invariants. Source names are checked against the
    /// registry separately.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_jobs_per_source == 0 {
            return Err(AppError::Validation(
                "max_jobs_per_source must be a positive integer".to_string(),
            ));
        }
        if self.lookback_days == 0 {
            return Err(AppError::Validation(
                "lookback_days must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// The subset of the query handed to each source.
    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            keywords: self
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            location: self
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from),
            max_results: self.max_jobs_per_source as usize,
            include_remote: self.include_remote,
            lookback_days: self.lookback_days,
        }
    }
}

/// Query parameters as seen by a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub max_results: usize,
    pub include_remote: bool,
    pub lookback_days: u32,
}

impl FetchParams {
    /// Keywords joined into a single free-text search string.
    pub fn search_text(&self) -> String {
        self.keywords.join(" ")
    }
}
