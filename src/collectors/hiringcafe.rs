use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::collectors::{JobSource, RawRecord, ScraperSession};
use crate::error::AppError;
use crate::models::query::FetchParams;

/// Characters that encodeURIComponent does NOT encode.
/// RFC 3986 unreserved: A-Z a-z 0-9 - _ . ! ~ * ' ( )
const ENCODE_URI_COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const BASE_URL: &str = "https://hiring.cafe";
const MAX_PAGE_SIZE: usize = 100;
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Keys of the search state that may be overridden from configuration.
const OVERRIDE_KEYS: &[&str] = &[
    "locations",
    "workplaceTypes",
    "commitmentTypes",
    "departments",
    "industries",
];

/// HiringCafe search. The API rejects cookie-less clients, so each fetch runs
/// inside a session opened by `init` against the landing page.
pub struct HiringCafe {
    overrides: Value,
    session: Mutex<Option<reqwest::Client>>,
}

impl Default for HiringCafe {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl HiringCafe {
    /// `overrides` is a JSON object whose recognised keys replace the default
    /// search state.
    pub fn new(overrides: Value) -> Self {
        Self {
            overrides,
            session: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<reqwest::Client, AppError> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::Internal("hiringcafe session not initialised".to_string()))
    }
}

#[async_trait]
impl JobSource for HiringCafe {
    fn name(&self) -> &str {
        "hiringcafe"
    }

    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawRecord>, AppError> {
        let client = self.client().await?;
        let state = build_state(&self.overrides, params);
        let encoded = encode_state(&state);
        let size = params.max_results.clamp(1, MAX_PAGE_SIZE);

        let url = format!(
            "{BASE_URL}/api/search-jobs?s={}&size={size}&page=0",
            urlencoded(&encoded)
        );

        let resp = client
            .get(&url)
            .header("Accept", "application/json,text/html,*/*;q=0.8")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("HiringCafe request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "HiringCafe returned {}",
                resp.status()
            )));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse HiringCafe response: {e}")))?;

        parse_results(&data)
    }

    async fn probe(&self) -> Result<(), AppError> {
        let resp = reqwest::Client::new()
            .head(BASE_URL)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("HiringCafe unreachable: {e}")))?;
        if resp.status().is_server_error() {
            return Err(AppError::Upstream(format!(
                "HiringCafe returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ScraperSession for HiringCafe {
    async fn init(&self) -> Result<bool, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let landing = client
            .get(BASE_URL)
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("HiringCafe landing page failed: {e}")))?;

        if !landing.status().is_success() {
            tracing::warn!("HiringCafe landing page returned {}", landing.status());
            return Ok(false);
        }

        *self.session.lock().await = Some(client);
        Ok(true)
    }

    async fn cleanup(&self) {
        if self.session.lock().await.take().is_some() {
            tracing::debug!("HiringCafe session closed");
        }
    }
}

/// Build the search state object the HiringCafe API expects.
/// Starts from defaults, applies the fetch parameters, then config overrides.
fn build_state(overrides: &Value, params: &FetchParams) -> Value {
    let mut state = default_state();

    if let Some(obj) = state.as_object_mut() {
        let query = params.search_text();
        if !query.is_empty() {
            obj.insert("jobTitleQuery".to_string(), Value::String(query));
        }
        obj.insert("dateFetchedPastNDays".to_string(), json!(params.lookback_days));
        if !params.include_remote {
            obj.insert("workplaceTypes".to_string(), json!(["Hybrid", "Onsite"]));
        }
    }

    if let (Some(state_obj), Some(config_obj)) = (state.as_object_mut(), overrides.as_object()) {
        for key in OVERRIDE_KEYS {
            if let Some(val) = config_obj.get(*key) {
                state_obj.insert((*key).to_string(), val.clone());
            }
        }
    }

    state
}

/// Default search state. Built programmatically to avoid hitting the json!
/// macro recursion limit.
fn default_state() -> Value {
    let null = Value::Null;
    let empty_arr = || Value::Array(vec![]);
    let s = |v: &str| Value::String(v.to_string());
    let b = Value::Bool;
    let n = |v: i64| Value::Number(serde_json::Number::from(v));

    let mut m = serde_json::Map::with_capacity(48);

    m.insert("locations".into(), empty_arr());
    m.insert(
        "workplaceTypes".into(),
        Value::Array(vec![s("Remote"), s("Hybrid"), s("Onsite")]),
    );
    m.insert("defaultToUserLocation".into(), b(false));
    m.insert(
        "commitmentTypes".into(),
        Value::Array(vec![s("Full-time"), s("Part-time"), s("Contract")]),
    );
    m.insert("jobTitleQuery".into(), s(""));
    m.insert("jobDescriptionQuery".into(), s(""));
    m.insert("dateFetchedPastNDays".into(), n(7));

    let any_obj = |label: &str| {
        let mut obj = serde_json::Map::new();
        obj.insert("label".into(), s(label));
        obj.insert("value".into(), null.clone());
        Value::Object(obj)
    };
    m.insert("currency".into(), any_obj("Any"));
    m.insert("frequency".into(), any_obj("Any"));
    m.insert("minCompensationLowEnd".into(), null.clone());
    m.insert("minCompensationHighEnd".into(), null.clone());
    m.insert("maxCompensationLowEnd".into(), null.clone());
    m.insert("maxCompensationHighEnd".into(), null.clone());
    m.insert("restrictJobsToTransparentSalaries".into(), b(false));
    m.insert("calcFrequency".into(), s("Yearly"));

    m.insert("roleYoeRange".into(), Value::Array(vec![n(0), n(20)]));
    m.insert("excludeIfRoleYoeIsNotSpecified".into(), b(false));
    m.insert("managementYoeRange".into(), Value::Array(vec![n(0), n(20)]));
    m.insert("excludeIfManagementYoeIsNotSpecified".into(), b(false));

    for key in [
        "departments",
        "excludedDepartments",
        "industries",
        "excludedIndustries",
        "companyKeywords",
        "excludedCompanyKeywords",
        "hideJobTypes",
        "languageRequirements",
        "excludedLanguageRequirements",
        "benefitsAndPerks",
    ] {
        m.insert(key.into(), empty_arr());
    }
    m.insert("languageRequirementsOperator".into(), s("OR"));

    Value::Object(m)
}

/// JSON.stringify -> encodeURIComponent -> btoa
fn encode_state(state: &Value) -> String {
    let json_str = serde_json::to_string(state).unwrap_or_default();
    let uri_encoded: String = utf8_percent_encode(&json_str, ENCODE_URI_COMPONENT_SET).to_string();
    BASE64.encode(uri_encoded.as_bytes())
}

fn urlencoded(s: &str) -> String {
    utf8_percent_encode(s, ENCODE_URI_COMPONENT_SET).to_string()
}

fn parse_results(data: &Value) -> Result<Vec<RawRecord>, AppError> {
    let results = data
        .get("results")
        .and_then(|v| v.as_array())
        .ok_or_else(|| AppError::Upstream("Missing 'results' in HiringCafe response".to_string()))?;

    Ok(results.iter().filter_map(flatten_result).collect())
}

/// Flatten the nested search hit into a record the normalizer understands.
/// The untouched hit is kept under `hit`.
fn flatten_result(raw: &Value) -> Option<RawRecord> {
    let vpd = raw.get("v5_processed_job_data")?;
    let vcd = raw.get("v5_processed_company_data").unwrap_or(raw);
    let ji = raw.get("job_information").unwrap_or(raw);
    let text = |v: Option<&Value>| v.and_then(|v| v.as_str()).map(String::from);

    let workplace = text(vpd.get("workplace_type"));
    let remote = workplace.as_deref() == Some("Remote");
    Some(json!({
        "id": text(raw.get("objectID").or_else(|| raw.get("requisition_id"))),
        "title": text(vpd.get("core_job_title").or_else(|| ji.get("title"))),
        "company": text(vpd.get("company_name").or_else(|| vcd.get("name"))),
        "location": text(vpd.get("formatted_workplace_location")),
        "url": text(raw.get("apply_url")),
        "description": text(ji.get("description")),
        "posted_date": text(vpd.get("estimated_publish_date")),
        "workplace_type": workplace,
        "remote": remote,
        "salary_min": vpd.get("yearly_min_compensation"),
        "salary_max": vpd.get("yearly_max_compensation"),
        "hit": raw,
    }))
}
