// Job sources and the collection orchestrator.
// A source is either a pull aggregator (one stateless call) or a stateful
// scraper that also carries an init/cleanup lifecycle.

pub mod hiringcafe;
pub mod json_feed;
pub mod registry;
pub mod runner;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::query::FetchParams;
use crate::models::source::SourceKind;

/// Untyped record exactly as a source returned it.
pub type RawRecord = Value;

/// Fetch capability shared by every source.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Registry name, unique across sources.
    fn name(&self) -> &str;

    /// Fetch raw postings matching the given parameters.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawRecord>, AppError>;

    /// Cheap reachability check used by source health probes.
    async fn probe(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Lifecycle capability of session-based sources. `cleanup` runs on every
/// exit path once `init` has been attempted.
#[async_trait]
pub trait ScraperSession: JobSource {
    /// Open the session. `Ok(false)` means the source declined to start.
    async fn init(&self) -> Result<bool, AppError>;

    /// Release session resources. Must be safe to call after a failed `init`.
    async fn cleanup(&self);
}

/// A registered source tagged with its capabilities.
#[derive(Clone)]
pub enum SourceHandle {
    Pull(Arc<dyn JobSource>),
    Scraper(Arc<dyn ScraperSession>),
}

impl SourceHandle {
    pub fn pull(source: impl JobSource + 'static) -> Self {
        SourceHandle::Pull(Arc::new(source))
    }

    pub fn scraper(source: impl ScraperSession + 'static) -> Self {
        SourceHandle::Scraper(Arc::new(source))
    }

    pub fn name(&self) -> &str {
        match self {
            SourceHandle::Pull(s) => s.name(),
            SourceHandle::Scraper(s) => s.name(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceHandle::Pull(_) => SourceKind::PullAggregator,
            SourceHandle::Scraper(_) => SourceKind::StatefulScraper,
        }
    }

    pub async fn probe(&self) -> Result<(), AppError> {
        match self {
            SourceHandle::Pull(s) => s.probe().await,
            SourceHandle::Scraper(s) => s.probe().await,
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
