use std::collections::HashSet;
use std::sync::Arc;

use crate::models::job::JobPosting;
use crate::storage::fingerprint::FingerprintCache;

/// Dedup key: canonical URL when present, otherwise lowercased `title|company`.
pub fn fingerprint(job: &JobPosting) -> String {
    match job.url.as_deref().map(canonical_url) {
        Some(url) if !url.is_empty() => format!("url:{url}"),
        _ => format!(
            "tc:{}|{}",
            job.title.trim().to_lowercase(),
            job.company.trim().to_lowercase()
        ),
    }
}

/// Trim, drop the fragment and trailing slashes, lowercase scheme and host.
fn canonical_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split_once('#').map_or(url, |(base, _)| base);
    let url = url.trim_end_matches('/');

    match url.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => url.to_string(),
    }
}

#[derive(Debug)]
pub struct DedupOutcome {
    pub unique: Vec<JobPosting>,
    /// Fingerprints of `unique`, in the same order.
    pub keys: Vec<String>,
    pub removed: usize,
}

/// First-seen-wins deduplication, optionally backed by a cross-run cache.
///
/// "First" is relative to the merge order of the fetched batches, which is
/// not meaningful across sources. `dedupe` only reads the cache; callers
/// `remember` the accepted keys once the batch has been stored.
#[derive(Clone, Default)]
pub struct Deduplicator {
    cache: Option<Arc<dyn FingerprintCache>>,
}

impl Deduplicator {
    pub fn new(cache: Option<Arc<dyn FingerprintCache>>) -> Self {
        Self { cache }
    }

    pub async fn dedupe(&self, records: Vec<JobPosting>) -> DedupOutcome {
        let mut seen_now: HashSet<String> = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        let mut keys = Vec::with_capacity(records.len());
        let mut removed = 0;

        for job in records {
            let key = fingerprint(&job);
            if seen_now.contains(&key) || self.seen_before(&key).await {
                removed += 1;
                continue;
            }
            seen_now.insert(key.clone());
            keys.push(key);
            unique.push(job);
        }

        DedupOutcome {
            unique,
            keys,
            removed,
        }
    }

    /// Record fingerprints so later runs treat them as seen.
    pub async fn remember(&self, keys: &[String]) {
        let Some(cache) = &self.cache else {
            return;
        };
        for key in keys {
            if let Err(e) = cache.remember(key).await {
                tracing::warn!("Failed to remember fingerprint '{key}': {e}");
            }
        }
    }

    async fn seen_before(&self, key: &str) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        match cache.seen(key).await {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!("Fingerprint cache lookup failed, treating as new: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fingerprint::MemoryFingerprintCache;
    use crate::testing::{FailingFingerprintCache, job};

    #[test]
    fn url_takes_priority_over_title_and_company() {
        let mut a = job("src", "TPM", "Acme");
        a.url = Some("HTTPS://Jobs.Example.com/Role/1/#apply".into());
        assert_eq!(fingerprint(&a), "url:https://jobs.example.com/Role/1");

        let mut b = job("src", "Other", "Other");
        b.url = Some("https://jobs.example.com/Role/1".into());
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn blank_url_falls_back_to_title_company() {
        let mut a = job("src", " Technical Program Manager ", "ACME");
        a.url = Some("   ".into());
        assert_eq!(fingerprint(&a), "tc:technical program manager|acme");
    }

    #[tokio::test]
    async fn first_seen_record_wins() {
        let mut first = job("a", "TPM", "Acme");
        first.id = "first".into();
        let mut second = job("b", "tpm", "acme");
        second.id = "second".into();
        let third = job("b", "Engineer", "Acme");

        let outcome = Deduplicator::default()
            .dedupe(vec![first, second, third])
            .await;
        assert_eq!(outcome.removed, 1);
        let ids: Vec<_> = outcome.unique.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids[0], "first");
        assert_eq!(outcome.unique.len(), 2);
    }

    #[tokio::test]
    async fn dedupe_is_idempotent_without_cache() {
        let records = vec![
            job("a", "TPM", "Acme"),
            job("b", "TPM", "Acme"),
            job("b", "PM", "Acme"),
        ];
        let dedup = Deduplicator::default();
        let once = dedup.dedupe(records).await;
        let twice = dedup.dedupe(once.unique.clone()).await;
        assert_eq!(twice.removed, 0);
        assert_eq!(twice.unique, once.unique);
    }

    #[tokio::test]
    async fn dedupe_is_idempotent_for_same_cache_state() {
        let records = vec![job("a", "TPM", "Acme"), job("b", "TPM", "Acme")];

        let first_cache = Arc::new(MemoryFingerprintCache::new());
        first_cache.remember("tc:old|posting").await.unwrap();
        let once = Deduplicator::new(Some(first_cache)).dedupe(records).await;

        let same_state = Arc::new(MemoryFingerprintCache::new());
        same_state.remember("tc:old|posting").await.unwrap();
        let twice = Deduplicator::new(Some(same_state))
            .dedupe(once.unique.clone())
            .await;
        assert_eq!(twice.removed, 0);
        assert_eq!(twice.unique, once.unique);
    }

    #[tokio::test]
    async fn cache_filters_across_runs() {
        let cache = Arc::new(MemoryFingerprintCache::new());
        let dedup = Deduplicator::new(Some(cache.clone()));

        let first = dedup.dedupe(vec![job("a", "TPM", "Acme")]).await;
        assert_eq!(first.unique.len(), 1);
        assert_eq!(first.keys, vec!["tc:tpm|acme"]);
        assert!(!cache.seen("tc:tpm|acme").await.unwrap());
        dedup.remember(&first.keys).await;
        assert!(cache.seen("tc:tpm|acme").await.unwrap());

        let second = dedup
            .dedupe(vec![job("b", "TPM", "Acme"), job("b", "PM", "Hooli")])
            .await;
        assert_eq!(second.removed, 1);
        assert_eq!(second.unique[0].company, "Hooli");
    }

    #[tokio::test]
    async fn cache_failures_degrade_to_in_run_dedup() {
        let dedup = Deduplicator::new(Some(Arc::new(FailingFingerprintCache)));
        let outcome = dedup
            .dedupe(vec![job("a", "TPM", "Acme"), job("b", "TPM", "Acme")])
            .await;
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.removed, 1);
        // Failed writes are logged, not raised.
        dedup.remember(&outcome.keys).await;
    }
}
