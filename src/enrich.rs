use async_trait::async_trait;

use crate::error::AppError;
use crate::models::job::{Enrichment, JobLevel, JobPosting};

/// Classifier that tags a posting with level/remote/keyword metadata.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, job: &JobPosting) -> Result<Enrichment, AppError>;

    /// Reachability check for health reporting.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Role-relevant phrases counted toward `keyword_count`.
pub const DEFAULT_TPM_KEYWORDS: &[&str] = &[
    "technical program",
    "program manager",
    "program management",
    "tpm",
    "roadmap",
    "stakeholder",
    "stakeholders",
    "cross-functional",
    "agile",
    "scrum",
    "delivery",
    "release",
    "launch",
    "dependencies",
    "risk management",
    "okr",
    "okrs",
    "jira",
];

const MANAGEMENT_MARKERS: &[&str] = &[
    "director",
    "head of",
    "vp",
    "vice president",
    "chief",
    "manager of",
    "group manager",
    "engineering manager",
];
const SENIOR_MARKERS: &[&str] = &["senior", "sr", "staff", "principal", "lead"];
const ENTRY_MARKERS: &[&str] = &[
    "junior",
    "jr",
    "entry",
    "entry-level",
    "associate",
    "intern",
    "internship",
    "graduate",
];
const REMOTE_MARKERS: &[&str] = &[
    "remote",
    "anywhere",
    "distributed",
    "work from home",
    "wfh",
    "worldwide",
];

/// Rule-based enricher over title, location and description text.
#[derive(Debug, Clone)]
pub struct KeywordEnricher {
    keywords: Vec<String>,
}

impl Default for KeywordEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_TPM_KEYWORDS.iter().map(|k| k.to_string()))
    }
}

impl KeywordEnricher {
    pub fn new(keywords: impl IntoIterator<Item = String>) -> Self {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| words(&k))
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { keywords }
    }

    pub fn classify_level(title: &str) -> JobLevel {
        let title = padded(title);
        let has = |markers: &[&str]| markers.iter().any(|m| title.contains(&format!(" {m} ")));
        if has(MANAGEMENT_MARKERS) {
            JobLevel::Management
        } else if has(SENIOR_MARKERS) {
            JobLevel::Senior
        } else if has(ENTRY_MARKERS) {
            JobLevel::Entry
        } else {
            JobLevel::Mid
        }
    }

    pub fn is_remote(job: &JobPosting) -> bool {
        if job.raw_data.get("remote").and_then(|v| v.as_bool()) == Some(true) {
            return true;
        }
        let text = padded(&format!(
            "{} {} {}",
            job.title,
            job.location.as_deref().unwrap_or(""),
            job.description.as_deref().unwrap_or("")
        ));
        REMOTE_MARKERS
            .iter()
            .any(|m| text.contains(&format!(" {m} ")))
    }

    pub fn keyword_count(&self, job: &JobPosting) -> u32 {
        let text = padded(&format!(
            "{} {}",
            job.title,
            job.description.as_deref().unwrap_or("")
        ));
        self.keywords
            .iter()
            .filter(|k| text.contains(&format!(" {k} ")))
            .count() as u32
    }
}

#[async_trait]
impl Enricher for KeywordEnricher {
    async fn enrich(&self, job: &JobPosting) -> Result<Enrichment, AppError> {
        Ok(Enrichment {
            job_level: Self::classify_level(&job.title),
            remote_friendly: Self::is_remote(job),
            keyword_count: self.keyword_count(job),
        })
    }
}

/// Lowercase, keep alphanumerics and hyphens, collapse everything else to
/// single spaces.
fn words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn padded(text: &str) -> String {
    format!(" {} ", words(text))
}
