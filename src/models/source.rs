use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Single stateless request/response call.
    PullAggregator,
    /// Session-based source with init/cleanup around every fetch.
    StatefulScraper,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: SourceKind,
    pub enabled: bool,
    pub healthy: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub jobs_collected_today: u64,
}
