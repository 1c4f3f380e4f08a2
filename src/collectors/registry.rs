use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::collectors::SourceHandle;
use crate::error::AppError;
use crate::models::source::SourceStatus;

struct SourceEntry {
    handle: SourceHandle,
    enabled: bool,
    healthy: bool,
    last_checked: Option<DateTime<Utc>>,
    error: Option<String>,
    jobs_today: u64,
    counted_on: NaiveDate,
}

impl SourceEntry {
    fn new(handle: SourceHandle, enabled: bool) -> Self {
        Self {
            handle,
            enabled,
            healthy: true,
            last_checked: None,
            error: None,
            jobs_today: 0,
            counted_on: Utc::now().date_naive(),
        }
    }

    fn roll_day(&mut self, today: NaiveDate) {
        if self.counted_on != today {
            self.counted_on = today;
            self.jobs_today = 0;
        }
    }

    fn status(&self, name: &str, today: NaiveDate) -> SourceStatus {
        SourceStatus {
            name: name.to_string(),
            kind: self.handle.kind(),
            enabled: self.enabled,
            healthy: self.healthy,
            last_checked: self.last_checked,
            error: self.error.clone(),
            jobs_collected_today: if self.counted_on == today {
                self.jobs_today
            } else {
                0
            },
        }
    }
}

/// Registered sources and their enabled/health state.
///
/// Writers take the lock exclusively; `snapshot` copies the resolved handles
/// out under a single read lock so an in-flight collection never observes a
/// later enable/disable.
pub struct SourceRegistry {
    entries: RwLock<BTreeMap<String, SourceEntry>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a registry with every handle enabled.
    pub fn with_sources(handles: impl IntoIterator<Item = SourceHandle>) -> Self {
        let entries = handles
            .into_iter()
            .map(|h| (h.name().to_string(), SourceEntry::new(h, true)))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Register (or replace) a source.
    pub async fn register(&self, handle: SourceHandle, enabled: bool) {
        let name = handle.name().to_string();
        tracing::info!("Registering source '{name}' ({:?}, enabled={enabled})", handle.kind());
        self.entries
            .write()
            .await
            .insert(name, SourceEntry::new(handle, enabled));
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn enabled_count(&self) -> usize {
        self.entries.read().await.values().filter(|e| e.enabled).count()
    }

    /// Names of enabled sources, restricted to `requested` when given.
    /// Requested names that are disabled or unknown are dropped silently.
    pub async fn resolve_sources(&self, requested: Option<&[String]>) -> Vec<String> {
        let entries = self.entries.read().await;
        resolve(&entries, requested)
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Validate `requested` against the registry and copy out the resolved
    /// handles. Unknown names are a validation error; disabled ones are skipped.
    pub async fn snapshot(
        &self,
        requested: Option<&[String]>,
    ) -> Result<Vec<(String, SourceHandle)>, AppError> {
        let entries = self.entries.read().await;
        if let Some(names) = requested {
            let unknown: Vec<&str> = names
                .iter()
                .filter(|n| !entries.contains_key(n.as_str()))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(AppError::Validation(format!(
                    "Unknown source(s): {}",
                    unknown.join(", ")
                )));
            }
        }
        Ok(resolve(&entries, requested))
    }

    /// Enable a registered source. Idempotent.
    pub async fn enable(&self, name: &str) -> Result<bool, AppError> {
        self.set_enabled(name, true).await
    }

    /// Disable a registered source. Idempotent.
    pub async fn disable(&self, name: &str) -> Result<bool, AppError> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, AppError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| AppError::SourceNotFound(name.to_string()))?;
        if entry.enabled != enabled {
            tracing::info!(
                "Source '{name}' {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        entry.enabled = enabled;
        Ok(true)
    }

    pub async fn list_statuses(&self) -> Vec<SourceStatus> {
        let today = Utc::now().date_naive();
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, entry)| entry.status(name, today))
            .collect()
    }

    pub async fn status(&self, name: &str) -> Result<SourceStatus, AppError> {
        let today = Utc::now().date_naive();
        self.entries
            .read()
            .await
            .get(name)
            .map(|entry| entry.status(name, today))
            .ok_or_else(|| AppError::SourceNotFound(name.to_string()))
    }

    /// Every registered handle regardless of enabled state.
    pub async fn handles(&self) -> Vec<(String, SourceHandle)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.handle.clone()))
            .collect()
    }

    /// Record the outcome of a fetch. `Ok` carries the number of raw records.
    pub async fn record_fetch(&self, name: &str, outcome: Result<usize, &str>) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        // The source may have been replaced or removed since the snapshot.
        let Some(entry) = entries.get_mut(name) else {
            return;
        };
        entry.roll_day(now.date_naive());
        entry.last_checked = Some(now);
        match outcome {
            Ok(count) => {
                entry.healthy = true;
                entry.error = None;
                entry.jobs_today += count as u64;
            }
            Err(msg) => {
                entry.healthy = false;
                entry.error = Some(msg.to_string());
            }
        }
    }

    /// Record the outcome of a health probe without touching job counters.
    pub async fn record_probe(&self, name: &str, outcome: Result<(), String>) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(name) else {
            return;
        };
        entry.last_checked = Some(Utc::now());
        entry.healthy = outcome.is_ok();
        entry.error = outcome.err();
    }
}

fn resolve(
    entries: &BTreeMap<String, SourceEntry>,
    requested: Option<&[String]>,
) -> Vec<(String, SourceHandle)> {
    match requested {
        None => entries
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(name, e)| (name.clone(), e.handle.clone()))
            .collect(),
        Some(names) => {
            let mut resolved: Vec<(String, SourceHandle)> = Vec::new();
            for name in names {
                if resolved.iter().any(|(n, _)| n == name) {
                    continue;
                }
                if let Some(entry) = entries.get(name.as_str())
                    && entry.enabled
                {
                    resolved.push((name.clone(), entry.handle.clone()));
                }
            }
            resolved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::SourceKind;
    use crate::testing::{MockScraper, StaticSource};

    fn registry() -> SourceRegistry {
        SourceRegistry::with_sources([
            SourceHandle::pull(StaticSource::new("alpha", vec![])),
            SourceHandle::pull(StaticSource::new("beta", vec![])),
            SourceHandle::scraper(MockScraper::new("gamma", vec![])),
        ])
    }

    #[tokio::test]
    async fn resolve_without_request_returns_all_enabled() {
        let reg = registry();
        reg.disable("beta").await.unwrap();
        assert_eq!(reg.resolve_sources(None).await, vec!["alpha", "gamma"]);
    }

    #[tokio::test]
    async fn resolve_drops_disabled_and_unknown_names() {
        let reg = registry();
        reg.disable("alpha").await.unwrap();
        let requested = vec!["alpha".to_string(), "gamma".to_string(), "nope".to_string()];
        assert_eq!(reg.resolve_sources(Some(&requested)).await, vec!["gamma"]);
    }

    #[tokio::test]
    async fn snapshot_rejects_unknown_names() {
        let reg = registry();
        let requested = vec!["alpha".to_string(), "nope".to_string()];
        let err = reg.snapshot(Some(&requested)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("nope")));
    }

    #[tokio::test]
    async fn snapshot_skips_disabled_names_without_error() {
        let reg = registry();
        reg.disable("beta").await.unwrap();
        let requested = vec!["beta".to_string()];
        assert!(reg.snapshot(Some(&requested)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_collapses_repeated_names() {
        let reg = registry();
        let requested = vec!["alpha".to_string(), "alpha".to_string()];
        assert_eq!(reg.snapshot(Some(&requested)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enable_then_disable_round_trips() {
        let reg = registry();
        assert!(reg.enable("alpha").await.unwrap());
        assert!(reg.enable("alpha").await.unwrap());
        assert!(reg.disable("alpha").await.unwrap());
        assert!(reg.disable("alpha").await.unwrap());
        assert!(!reg.status("alpha").await.unwrap().enabled);
    }

    #[tokio::test]
    async fn enable_unknown_source_is_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.enable("does-not-exist").await,
            Err(AppError::SourceNotFound(_))
        ));
        assert!(matches!(
            reg.disable("does-not-exist").await,
            Err(AppError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn statuses_report_kind_and_fetch_outcomes() {
        let reg = registry();
        reg.record_fetch("alpha", Ok(3)).await;
        reg.record_fetch("alpha", Ok(2)).await;
        reg.record_fetch("beta", Err("timeout talking to upstream")).await;

        let statuses = reg.list_statuses().await;
        let alpha = statuses.iter().find(|s| s.name == "alpha").unwrap();
        assert_eq!(alpha.kind, SourceKind::PullAggregator);
        assert!(alpha.healthy);
        assert_eq!(alpha.jobs_collected_today, 5);
        assert!(alpha.last_checked.is_some());

        let beta = statuses.iter().find(|s| s.name == "beta").unwrap();
        assert!(!beta.healthy);
        assert_eq!(beta.error.as_deref(), Some("timeout talking to upstream"));

        let gamma = statuses.iter().find(|s| s.name == "gamma").unwrap();
        assert_eq!(gamma.kind, SourceKind::StatefulScraper);
        assert!(gamma.last_checked.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_insulated_from_later_disable() {
        let reg = registry();
        let snapshot = reg.snapshot(None).await.unwrap();
        reg.disable("alpha").await.unwrap();
        assert!(snapshot.iter().any(|(n, _)| n == "alpha"));
        assert_eq!(reg.enabled_count().await, 2);
    }
}
