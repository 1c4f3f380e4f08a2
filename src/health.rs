use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::collectors::registry::SourceRegistry;
use crate::enrich::Enricher;
use crate::error::AppError;
use crate::models::source::SourceStatus;
use crate::storage::JobStore;
use crate::storage::fingerprint::FingerprintCache;

/// Below this fraction of healthy components the service is `unhealthy`.
const UNHEALTHY_BELOW: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = &'a bool>) -> Self {
        let (up, total) = flags
            .into_iter()
            .fold((0usize, 0usize), |(up, total), f| (up + usize::from(*f), total + 1));
        if up == total {
            HealthStatus::Healthy
        } else if (up as f64) / (total as f64) < UNHEALTHY_BELOW {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn from_components(components: BTreeMap<String, bool>) -> Self {
        Self {
            status: HealthStatus::from_flags(components.values()),
            timestamp: Utc::now(),
            components,
        }
    }
}

/// Check the four subsystems the collection core depends on. An unconfigured
/// fingerprint cache counts as reachable.
pub async fn check(
    registry: &SourceRegistry,
    store: &dyn JobStore,
    enricher: &dyn Enricher,
    fingerprints: Option<&dyn FingerprintCache>,
) -> HealthReport {
    let registry_ok = !registry.is_empty().await;
    let storage_ok = report("storage", store.ping().await);
    let enrichment_ok = report("enrichment", enricher.ping().await);
    let cache_ok = match fingerprints {
        Some(cache) => report("fingerprint_cache", cache.ping().await),
        None => true,
    };

    let components = BTreeMap::from([
        ("registry".to_string(), registry_ok),
        ("storage".to_string(), storage_ok),
        ("enrichment".to_string(), enrichment_ok),
        ("fingerprint_cache".to_string(), cache_ok),
    ]);
    HealthReport::from_components(components)
}

fn report(component: &str, outcome: Result<(), AppError>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check for {component} failed: {e}");
            false
        }
    }
}

/// Probe every registered source (enabled or not) and record the outcome.
pub async fn probe_sources(
    registry: &SourceRegistry,
    concurrency: usize,
    timeout: Duration,
) -> Vec<SourceStatus> {
    let handles = registry.handles().await;
    let outcomes: Vec<(String, Result<(), String>)> = stream::iter(handles.into_iter().map(
        |(name, handle)| async move {
            let outcome = match tokio::time::timeout(timeout, handle.probe()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("probe timed out after {}s", timeout.as_secs())),
            };
            (name, outcome)
        },
    ))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    for (name, outcome) in outcomes {
        if let Err(e) = &outcome {
            tracing::warn!("Probe for source '{name}' failed: {e}");
        }
        registry.record_probe(&name, outcome).await;
    }
    registry.list_statuses().await
}
