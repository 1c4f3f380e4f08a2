use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::collectors::{JobSource, RawRecord};
use crate::error::AppError;
use crate::models::query::FetchParams;

/// Array keys tried when no explicit records path is configured.
const WELL_KNOWN_ARRAYS: &[&str] = &["jobs", "results", "data", "items"];

/// Pull aggregator for public JSON job feeds (Remotive, RemoteOK, Arbeitnow
/// and similar): one GET, records taken from the response body.
#[derive(Debug, Clone)]
pub struct JsonFeed {
    name: String,
    url: String,
    records_path: Option<String>,
    client: reqwest::Client,
}

impl JsonFeed {
    pub fn new(name: &str, url: &str, records_path: Option<&str>) -> Result<Self, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("feed name must not be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::Validation(format!(
                "feed '{name}' has a non-http url: {url}"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("jobcollector/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.trim().to_string(),
            url: url.to_string(),
            records_path: records_path
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
            client,
        })
    }

    /// Parse `name=url` or `name=url#records.path`.
    pub fn parse(entry: &str) -> Result<Self, AppError> {
        let (name, rest) = entry
            .split_once('=')
            .ok_or_else(|| AppError::Validation(format!("feed '{entry}' is not name=url")))?;
        let (url, path) = match rest.split_once('#') {
            Some((url, path)) => (url, Some(path)),
            None => (rest, None),
        };
        Self::new(name, url.trim(), path)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl JobSource for JsonFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        let mut query: Vec<(&str, String)> = vec![("limit", params.max_results.to_string())];
        let search = params.search_text();
        if !search.is_empty() {
            query.push(("search", search));
        }
        if let Some(location) = &params.location {
            query.push(("location", location.clone()));
        }

        let resp = self
            .client
            .get(&self.url)
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} request failed: {e}", self.name)))?;

        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "{} returned {}",
                self.name,
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse {} response: {e}", self.name)))?;

        extract_records(&body, self.records_path.as_deref())
    }

    async fn probe(&self) -> Result<(), AppError> {
        let resp = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} unreachable: {e}", self.name)))?;
        if resp.status().is_server_error() {
            return Err(AppError::Upstream(format!(
                "{} returned {}",
                self.name,
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Locate the array of postings in a feed body. Non-object entries (banners,
/// legal notices) are skipped.
fn extract_records(body: &Value, path: Option<&str>) -> Result<Vec<RawRecord>, AppError> {
    let array = match path {
        Some(path) => path
            .split('.')
            .try_fold(body, |node, key| node.get(key))
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Upstream(format!("No array at '{path}' in feed response")))?,
        None => body
            .as_array()
            .or_else(|| {
                WELL_KNOWN_ARRAYS
                    .iter()
                    .find_map(|k| body.get(*k).and_then(Value::as_array))
            })
            .ok_or_else(|| AppError::Upstream("Feed response contains no job array".to_string()))?,
    };

    Ok(array.iter().filter(|v| v.is_object()).cloned().collect())
}
