use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::collectors::registry::SourceRegistry;
use crate::collectors::{RawRecord, ScraperSession, SourceHandle};
use crate::enrich::Enricher;
use crate::error::AppError;
use crate::health::{self, HealthReport};
use crate::models::collection::{CollectionResult, CollectionStats};
use crate::models::job::{Enrichment, JobPosting};
use crate::models::query::{FetchParams, Query};
use crate::models::source::SourceStatus;
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::normalizer;
use crate::storage::fingerprint::FingerprintCache;
use crate::storage::{JobSearch, JobStore, StoreStats};

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Width of the source worker pool.
    pub max_concurrent_sources: usize,
    /// Deadline for the whole fetch phase of one `collect` call.
    pub collection_timeout: Duration,
    pub enrich_concurrency: usize,
    /// Per-source deadline for health probes.
    pub probe_timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            collection_timeout: Duration::from_secs(300),
            enrich_concurrency: 8,
            probe_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug)]
struct StatsState {
    total_jobs: u64,
    jobs_today: u64,
    counted_on: NaiveDate,
    runs: u64,
    total_duration: f64,
    last_run: Option<chrono::DateTime<Utc>>,
}

impl StatsState {
    fn new() -> Self {
        Self {
            total_jobs: 0,
            jobs_today: 0,
            counted_on: Utc::now().date_naive(),
            runs: 0,
            total_duration: 0.0,
            last_run: None,
        }
    }

    fn record(&mut self, result: &CollectionResult) {
        let today = result.collection_timestamp.date_naive();
        if self.counted_on != today {
            self.counted_on = today;
            self.jobs_today = 0;
        }
        self.total_jobs += result.total_jobs as u64;
        self.jobs_today += result.total_jobs as u64;
        self.runs += 1;
        self.total_duration += result.duration_seconds;
        self.last_run = Some(result.collection_timestamp);
    }
}

/// Composition root for the collection core: owns the registry handle and
/// every collaborator a `collect` call drives.
pub struct CollectionService {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn JobStore>,
    enricher: Arc<dyn Enricher>,
    fingerprints: Option<Arc<dyn FingerprintCache>>,
    dedup: Deduplicator,
    settings: CollectorSettings,
    stats: Mutex<StatsState>,
    /// One lock per scraper name, held from `init` until `cleanup` returns so
    /// concurrent collections never share a live session.
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CollectionService {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn JobStore>,
        enricher: Arc<dyn Enricher>,
        fingerprints: Option<Arc<dyn FingerprintCache>>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            registry,
            store,
            enricher,
            dedup: Deduplicator::new(fingerprints.clone()),
            fingerprints,
            settings,
            stats: Mutex::new(StatsState::new()),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Fetch, normalize, dedup, enrich and (optionally) persist one batch.
    ///
    /// Per-source failures are captured in the result. Only validation errors
    /// and the overall fetch deadline fail the call.
    pub async fn collect(&self, query: Query) -> Result<CollectionResult, AppError> {
        let span = tracing::info_span!("collect", collection_id = %Uuid::new_v4());
        self.collect_inner(query)
            .instrument(span)
            .await
            .inspect_err(|e| tracing::error!("Collection aborted: {e}"))
    }

    async fn collect_inner(&self, query: Query) -> Result<CollectionResult, AppError> {
        let started = Instant::now();
        let collection_timestamp = Utc::now();

        query.validate()?;
        let sources = self.registry.snapshot(query.sources.as_deref()).await?;
        let sources_queried: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
        tracing::info!(
            "Collecting from {} source(s): [{}]",
            sources_queried.len(),
            sources_queried.join(", ")
        );

        let params = query.fetch_params();
        let fetched = self.fetch_all(sources, &params).await?;

        let mut raw: Vec<(String, RawRecord)> = Vec::new();
        let mut successful_sources = Vec::new();
        let mut failed_sources = Vec::new();
        let mut errors = BTreeMap::new();

        for (name, outcome) in fetched {
            match outcome {
                Ok(mut records) => {
                    records.truncate(params.max_results);
                    tracing::info!("Source '{name}' returned {} record(s)", records.len());
                    self.registry.record_fetch(&name, Ok(records.len())).await;
                    raw.extend(records.into_iter().map(|r| (name.clone(), r)));
                    successful_sources.push(name);
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!("Source '{name}' failed: {message}");
                    self.registry.record_fetch(&name, Err(message.as_str())).await;
                    errors.insert(name.clone(), message);
                    failed_sources.push(name);
                }
            }
        }

        let fetched_jobs = raw.len();
        let (normalized, discarded_jobs) = normalizer::normalize_all(raw, collection_timestamp);
        let raw_jobs = normalized.len();

        let deduped = self.dedup.dedupe(normalized).await;
        tracing::info!(
            "Normalized {raw_jobs} of {fetched_jobs} record(s), removed {} duplicate(s)",
            deduped.removed
        );

        let jobs = self.enrich_all(deduped.unique).await;

        // Only postings that reached storage count as seen by later runs.
        let jobs_stored = if query.persist {
            let stored = self.persist(&jobs).await;
            if stored.is_some() {
                self.dedup.remember(&deduped.keys).await;
            }
            stored
        } else {
            None
        };

        let result = CollectionResult {
            total_jobs: jobs.len(),
            jobs,
            raw_jobs,
            duplicates_removed: deduped.removed,
            fetched_jobs,
            discarded_jobs,
            jobs_stored,
            sources_queried,
            successful_sources,
            failed_sources,
            errors,
            collection_timestamp,
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        debug_assert!(result.is_consistent());
        self.stats.lock().await.record(&result);
        tracing::info!(
            "Collection finished: {} job(s), {} failed source(s), {:.2}s",
            result.total_jobs,
            result.failed_sources.len(),
            result.duration_seconds
        );
        Ok(result)
    }

    /// Run every source through the bounded worker pool under one deadline.
    /// Outcomes come back in snapshot order.
    async fn fetch_all(
        &self,
        sources: Vec<(String, SourceHandle)>,
        params: &FetchParams,
    ) -> Result<Vec<(String, Result<Vec<RawRecord>, AppError>)>, AppError> {
        let pool_width = self.settings.max_concurrent_sources.max(1);
        let mut jobs = Vec::with_capacity(sources.len());
        for (idx, (name, handle)) in sources.into_iter().enumerate() {
            let lifecycle = match &handle {
                SourceHandle::Scraper(_) => Some(self.session_lock(&name).await),
                SourceHandle::Pull(_) => None,
            };
            jobs.push((idx, name, handle, lifecycle));
        }

        let fetches = stream::iter(jobs.into_iter().map(
            |(idx, name, handle, lifecycle)| async move {
                let outcome = fetch_source(&handle, params, lifecycle).await;
                (idx, name, outcome)
            },
        ))
        .buffer_unordered(pool_width)
        .collect::<Vec<_>>();

        let timeout = self.settings.collection_timeout;
        let mut outcomes = match tokio::time::timeout(timeout, fetches).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                tracing::error!(
                    "Fetch phase exceeded {:.1}s, aborting collection",
                    timeout.as_secs_f64()
                );
                return Err(AppError::CollectionTimeout(timeout));
            }
        };

        outcomes.sort_by_key(|(idx, _, _)| *idx);
        Ok(outcomes
            .into_iter()
            .map(|(_, name, outcome)| (name, outcome))
            .collect())
    }

    async fn session_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn enrich_all(&self, jobs: Vec<JobPosting>) -> Vec<JobPosting> {
        let enricher = &self.enricher;
        stream::iter(jobs.into_iter().map(|mut job| async move {
            let enrichment = match enricher.enrich(&job).await {
                Ok(enrichment) => enrichment,
                Err(e) => {
                    tracing::warn!("Enrichment failed for '{}', using defaults: {e}", job.id);
                    Enrichment::default()
                }
            };
            job.apply(enrichment);
            job
        }))
        .buffered(self.settings.enrich_concurrency.max(1))
        .collect()
        .await
    }

    async fn persist(&self, jobs: &[JobPosting]) -> Option<usize> {
        if jobs.is_empty() {
            return Some(0);
        }
        match self.store.store_many(jobs).await {
            Ok(stored) => {
                tracing::info!("Stored {stored} job(s)");
                Some(stored)
            }
            Err(e) => {
                tracing::warn!("Failed to store {} job(s), continuing: {e}", jobs.len());
                None
            }
        }
    }

    /// `collect` over every enabled source (unless an allow-list is given)
    /// with persistence forced on.
    pub async fn run_daily_aggregation(&self, mut query: Query) -> Result<CollectionResult, AppError> {
        if query.sources.as_ref().is_some_and(|s| s.is_empty()) {
            query.sources = None;
        }
        query.persist = true;
        let planned = self.registry.resolve_sources(query.sources.as_deref()).await;
        tracing::info!("Starting daily aggregation over [{}]", planned.join(", "));
        let result = self.collect(query).await?;
        tracing::info!(
            "Daily aggregation complete: {} new job(s) from {} source(s)",
            result.total_jobs,
            result.successful_sources.len()
        );
        Ok(result)
    }

    pub async fn list_source_statuses(&self) -> Vec<SourceStatus> {
        self.registry.list_statuses().await
    }

    pub async fn enable_source(&self, name: &str) -> Result<bool, AppError> {
        self.registry.enable(name).await
    }

    pub async fn disable_source(&self, name: &str) -> Result<bool, AppError> {
        self.registry.disable(name).await
    }

    pub async fn health_check(&self) -> HealthReport {
        health::check(
            &self.registry,
            self.store.as_ref(),
            self.enricher.as_ref(),
            self.fingerprints.as_deref(),
        )
        .await
    }

    pub async fn probe_sources(&self) -> Vec<SourceStatus> {
        health::probe_sources(
            &self.registry,
            self.settings.max_concurrent_sources.max(1),
            self.settings.probe_timeout,
        )
        .await
    }

    pub async fn collection_stats(&self) -> CollectionStats {
        let active_sources = self.registry.enabled_count().await;
        let stats = self.stats.lock().await;
        let today = Utc::now().date_naive();
        CollectionStats {
            total_jobs_collected: stats.total_jobs,
            jobs_collected_today: if stats.counted_on == today {
                stats.jobs_today
            } else {
                0
            },
            active_sources,
            collections_run: stats.runs,
            average_collection_seconds: if stats.runs == 0 {
                0.0
            } else {
                stats.total_duration / stats.runs as f64
            },
            last_collection_at: stats.last_run,
        }
    }

    pub async fn search_jobs(&self, search: &JobSearch) -> Result<Vec<JobPosting>, AppError> {
        self.store.search(search).await
    }

    pub async fn storage_stats(&self) -> Result<StoreStats, AppError> {
        self.store.stats().await
    }

    pub async fn storage_ready(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

/// Fetch one source inside its own error boundary. Panics surface as errors
/// so sibling fetches are unaffected.
async fn fetch_source(
    handle: &SourceHandle,
    params: &FetchParams,
    lifecycle: Option<Arc<Mutex<()>>>,
) -> Result<Vec<RawRecord>, AppError> {
    let fetch = async {
        match handle {
            SourceHandle::Pull(source) => source.fetch(params).await,
            SourceHandle::Scraper(scraper) => {
                fetch_with_session(scraper.clone(), params, lifecycle).await
            }
        }
    };
    match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(AppError::Internal(format!(
            "source '{}' panicked: {}",
            handle.name(),
            panic_message(panic.as_ref())
        ))),
    }
}

/// init -> fetch -> cleanup, with cleanup on every exit path. The lifecycle
/// lock stays held until cleanup has finished.
async fn fetch_with_session(
    scraper: Arc<dyn ScraperSession>,
    params: &FetchParams,
    lifecycle: Option<Arc<Mutex<()>>>,
) -> Result<Vec<RawRecord>, AppError> {
    let permit = match lifecycle {
        Some(lock) => Some(lock.lock_owned().await),
        None => None,
    };
    let mut guard = SessionGuard::new(scraper.clone(), permit);
    let result: Result<Vec<RawRecord>, AppError> = async {
        if !scraper.init().await? {
            return Err(AppError::Upstream(format!(
                "source '{}' declined to start a session",
                scraper.name()
            )));
        }
        scraper.fetch(params).await
    }
    .await;
    guard.release().await;
    result
}

/// Runs `cleanup` when released, or from a spawned task if dropped first
/// (cancellation or unwinding).
struct SessionGuard {
    session: Option<Arc<dyn ScraperSession>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl SessionGuard {
    fn new(session: Arc<dyn ScraperSession>, permit: Option<OwnedMutexGuard<()>>) -> Self {
        Self {
            session: Some(session),
            permit,
        }
    }

    async fn release(&mut self) {
        if let Some(session) = self.session.clone() {
            session.cleanup().await;
            self.session = None;
        }
        self.permit = None;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Cleaning up abandoned session for '{}'", session.name());
                handle.spawn(async move {
                    session.cleanup().await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!(
                    "No runtime available to clean up session for '{}'",
                    session.name()
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
