// Test mocks for the collection core.
//
// One mock per collaborator boundary:
// - StaticSource / FailingSource / PanickingSource (JobSource)
// - MockScraper (ScraperSession) with lifecycle counters
// - SingleSlotScraper (ScraperSession) holding one session for all callers
// - FailingEnricher, FailingStore, FailingFingerprintCache
//
// Plus `job()` for building postings and `test_service()` for a service over
// in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::collectors::registry::SourceRegistry;
use crate::collectors::runner::{CollectionService, CollectorSettings};
use crate::collectors::{JobSource, RawRecord, ScraperSession, SourceHandle};
use crate::enrich::{Enricher, KeywordEnricher};
use crate::error::AppError;
use crate::models::job::{Enrichment, JobPosting};
use crate::models::query::FetchParams;
use crate::storage::fingerprint::FingerprintCache;
use crate::storage::memory::MemoryJobStore;
use crate::storage::{JobSearch, JobStore, StoreStats};

/// Unenriched posting with a title/company-derived id.
pub fn job(source: &str, title: &str, company: &str) -> JobPosting {
    JobPosting {
        id: format!("{source}:{title}:{company}"),
        source: source.to_string(),
        title: title.to_string(),
        company: company.to_string(),
        location: None,
        url: None,
        posted_date: None,
        description: None,
        job_level: None,
        remote_friendly: false,
        keyword_count: 0,
        raw_data: json!({ "title": title, "company": company }),
        collected_at: Utc::now(),
    }
}

/// Service over the given sources, an in-memory store and the keyword enricher.
pub fn test_service(sources: Vec<SourceHandle>) -> CollectionService {
    CollectionService::new(
        Arc::new(SourceRegistry::with_sources(sources)),
        Arc::new(MemoryJobStore::new()),
        Arc::new(KeywordEnricher::default()),
        None,
        CollectorSettings::default(),
    )
}

/// Returns the same records on every fetch.
pub struct StaticSource {
    name: String,
    records: Vec<Value>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str, records: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            records,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.clone())
    }
}

/// Always fails with an upstream error.
pub struct FailingSource {
    name: String,
    message: String,
    fail_probe: bool,
}

impl FailingSource {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            fail_probe: false,
        }
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }
}

#[async_trait]
impl JobSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        Err(AppError::Upstream(self.message.clone()))
    }

    async fn probe(&self) -> Result<(), AppError> {
        if self.fail_probe {
            Err(AppError::Upstream(self.message.clone()))
        } else {
            Ok(())
        }
    }
}

pub struct PanickingSource {
    name: String,
}

impl PanickingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl JobSource for PanickingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        panic!("parser blew up");
    }
}

/// Tracks how many sources are fetching at once.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn source(&self, name: &str, hold: Duration) -> GaugedSource {
        GaugedSource {
            name: name.to_string(),
            hold,
            gauge: self.clone(),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugedSource {
    name: String,
    hold: Duration,
    gauge: ConcurrencyGauge,
}

#[async_trait]
impl JobSource for GaugedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        let now = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![json!({ "title": format!("Role at {}", self.name), "company": self.name })])
    }
}

/// Scraper with observable lifecycle counters.
pub struct MockScraper {
    pub name: String,
    records: Vec<Value>,
    init_ok: bool,
    fail_fetch: bool,
    delay: Option<Duration>,
    pub inits: AtomicUsize,
    pub fetches: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl MockScraper {
    pub fn new(name: &str, records: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            records,
            init_ok: true,
            fail_fetch: false,
            delay: None,
            inits: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        }
    }

    pub fn refusing_init(mut self) -> Self {
        self.init_ok = false;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl JobSource for MockScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch {
            return Err(AppError::Upstream("session expired mid-fetch".to_string()));
        }
        Ok(self.records.clone())
    }
}

#[async_trait]
impl ScraperSession for MockScraper {
    async fn init(&self) -> Result<bool, AppError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(self.init_ok)
    }

    async fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scraper with a single session slot: `cleanup` closes it for everyone, so
/// a fetch that overlaps another caller's lifecycle fails.
pub struct SingleSlotScraper {
    name: String,
    hold: Duration,
    open: AtomicBool,
    live: AtomicUsize,
    pub peak_sessions: AtomicUsize,
}

impl SingleSlotScraper {
    pub fn new(name: &str, hold: Duration) -> Self {
        Self {
            name: name.to_string(),
            hold,
            open: AtomicBool::new(false),
            live: AtomicUsize::new(0),
            peak_sessions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobSource for SingleSlotScraper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        tokio::time::sleep(self.hold).await;
        if !self.open.load(Ordering::SeqCst) {
            return Err(AppError::Upstream(format!("{} session not initialised", self.name)));
        }
        Ok(vec![json!({ "title": "TPM", "company": "Acme" })])
    }
}

#[async_trait]
impl ScraperSession for SingleSlotScraper {
    async fn init(&self) -> Result<bool, AppError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_sessions.fetch_max(live, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn cleanup(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FailingEnricher;

#[async_trait]
impl Enricher for FailingEnricher {
    async fn enrich(&self, _job: &JobPosting) -> Result<Enrichment, AppError> {
        Err(AppError::Upstream("classifier unavailable".to_string()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::Upstream("classifier unavailable".to_string()))
    }
}

pub struct FailingStore;

#[async_trait]
impl JobStore for FailingStore {
    async fn store_many(&self, _jobs: &[JobPosting]) -> Result<usize, AppError> {
        Err(AppError::Internal("disk full".to_string()))
    }

    async fn search(&self, _search: &JobSearch) -> Result<Vec<JobPosting>, AppError> {
        Err(AppError::Internal("disk full".to_string()))
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        Err(AppError::Internal("disk full".to_string()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::Internal("disk full".to_string()))
    }
}

pub struct FailingFingerprintCache;

#[async_trait]
impl FingerprintCache for FailingFingerprintCache {
    async fn seen(&self, _key: &str) -> Result<bool, AppError> {
        Err(AppError::Internal("cache offline".to_string()))
    }

    async fn remember(&self, _key: &str) -> Result<(), AppError> {
        Err(AppError::Internal("cache offline".to_string()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::Internal("cache offline".to_string()))
    }
}
