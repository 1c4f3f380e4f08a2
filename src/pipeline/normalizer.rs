use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::collectors::RawRecord;
use crate::models::job::JobPosting;

/// Field aliases in lookup order. Dotted entries walk nested objects.
const ID_FIELDS: &[&str] = &["id", "job_id", "objectID", "requisition_id", "slug", "guid"];
const TITLE_FIELDS: &[&str] = &["title", "position", "job_title", "core_job_title", "name"];
const COMPANY_FIELDS: &[&str] = &[
    "company",
    "company_name",
    "companyName",
    "employer",
    "organization",
    "company.name",
    "company.display_name",
];
const LOCATION_FIELDS: &[&str] = &[
    "location",
    "candidate_required_location",
    "formatted_workplace_location",
    "city",
    "location.display_name",
    "location.name",
];
const URL_FIELDS: &[&str] = &[
    "url",
    "apply_url",
    "job_url",
    "absolute_url",
    "redirect_url",
    "link",
];
const DATE_FIELDS: &[&str] = &[
    "posted_date",
    "date_posted",
    "publication_date",
    "posted_at",
    "created",
    "created_at",
    "date",
    "epoch",
];
const DESCRIPTION_FIELDS: &[&str] = &["description", "summary", "snippet", "body"];

/// Map one raw record onto the canonical shape.
///
/// Returns `None` when the record has no usable title or no usable company.
pub fn normalize(
    raw: &RawRecord,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Option<JobPosting> {
    if !raw.is_object() {
        return None;
    }

    let title = first_text(raw, TITLE_FIELDS)?;
    let company = first_text(raw, COMPANY_FIELDS)?;

    // Ids are only unique within a source.
    let id = match first_text(raw, ID_FIELDS) {
        Some(native) => format!("{source}_{native}"),
        None => synthesize_id(raw, source),
    };

    Some(JobPosting {
        id,
        source: source.to_string(),
        title,
        company,
        location: first_text(raw, LOCATION_FIELDS),
        url: first_text(raw, URL_FIELDS),
        posted_date: DATE_FIELDS
            .iter()
            .filter_map(|f| lookup(raw, f))
            .find_map(parse_date),
        description: first_text(raw, DESCRIPTION_FIELDS),
        job_level: None,
        remote_friendly: false,
        keyword_count: 0,
        raw_data: raw.clone(),
        collected_at,
    })
}

/// Normalize every `(source, record)` pair. Returns the surviving postings and
/// the number of records discarded.
pub fn normalize_all(
    raw: Vec<(String, RawRecord)>,
    collected_at: DateTime<Utc>,
) -> (Vec<JobPosting>, usize) {
    let total = raw.len();
    let jobs: Vec<JobPosting> = raw
        .iter()
        .filter_map(|(source, record)| normalize(record, source, collected_at))
        .collect();
    let discarded = total - jobs.len();
    if discarded > 0 {
        tracing::debug!("Normalizer discarded {discarded} of {total} records");
    }
    (jobs, discarded)
}

/// `<source>_<first 16 hex chars of sha256(payload)>`.
pub fn synthesize_id(raw: &RawRecord, source: &str) -> String {
    let payload = serde_json::to_vec(raw).unwrap_or_default();
    let digest = hex::encode(Sha256::digest(&payload));
    format!("{source}_{}", &digest[..16])
}

fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |node, key| node.get(key))
}

/// First alias that resolves to a non-blank string or a number.
fn first_text(raw: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| match lookup(raw, f)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt))
        }
        Value::Number(n) => {
            let secs = n.as_i64()?;
            // Millisecond epochs are 13 digits.
            if secs > 100_000_000_000 {
                DateTime::from_timestamp_millis(secs)
            } else {
                DateTime::from_timestamp(secs, 0)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn maps_aliased_fields() {
        let raw = json!({
            "position": "Technical Program Manager",
            "company_name": "Acme",
            "candidate_required_location": "Worldwide",
            "apply_url": "https://acme.example/jobs/1",
            "job_id": 991,
            "summary": "Own the roadmap",
            "publication_date": "2026-02-27T08:00:00Z"
        });
        let job = normalize(&raw, "remotive", now()).unwrap();
        assert_eq!(job.id, "remotive_991");
        assert_eq!(job.source, "remotive");
        assert_eq!(job.title, "Technical Program Manager");
        assert_eq!(job.company, "Acme");
        assert_eq!(job.location.as_deref(), Some("Worldwide"));
        assert_eq!(job.url.as_deref(), Some("https://acme.example/jobs/1"));
        assert_eq!(job.description.as_deref(), Some("Own the roadmap"));
        assert_eq!(
            job.posted_date,
            Some(Utc.with_ymd_and_hms(2026, 2, 27, 8, 0, 0).unwrap())
        );
        assert_eq!(job.job_level, None);
        assert!(!job.remote_friendly);
        assert_eq!(job.collected_at, now());
    }

    #[test]
    fn reads_nested_company_and_location() {
        let raw = json!({
            "title": "Program Lead",
            "company": { "display_name": "Globex" },
            "location": { "display_name": "Berlin" },
            "created": "2026-02-20"
        });
        let job = normalize(&raw, "adzuna", now()).unwrap();
        assert_eq!(job.company, "Globex");
        assert_eq!(job.location.as_deref(), Some("Berlin"));
        assert_eq!(
            job.posted_date,
            Some(Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn same_native_id_from_two_sources_stays_distinct() {
        let raw = json!({ "id": 123, "title": "TPM", "company": "Acme" });
        let a = normalize(&raw, "remotive", now()).unwrap();
        let b = normalize(&raw, "arbeitnow", now()).unwrap();
        assert_eq!(a.id, "remotive_123");
        assert_eq!(b.id, "arbeitnow_123");
    }

    #[test]
    fn synthesizes_stable_source_qualified_id() {
        let raw = json!({ "title": "TPM", "company": "Initech" });
        let a = normalize(&raw, "feed", now()).unwrap();
        let b = normalize(&raw, "feed", now()).unwrap();
        assert!(a.id.starts_with("feed_"));
        assert_eq!(a.id.len(), "feed_".len() + 16);
        assert_eq!(a.id, b.id);

        let other = json!({ "title": "TPM", "company": "Initrode" });
        assert_ne!(normalize(&other, "feed", now()).unwrap().id, a.id);
    }

    #[test]
    fn discards_records_missing_title_or_company() {
        let missing_company = json!({ "title": "TPM" });
        let missing_title = json!({ "company": "Acme" });
        let blank_title = json!({ "title": "   ", "company": "Acme" });
        let not_an_object = json!("TPM at Acme");
        for raw in [missing_company, missing_title, blank_title, not_an_object] {
            assert!(normalize(&raw, "feed", now()).is_none(), "{raw}");
        }
    }

    #[test]
    fn parses_epoch_dates() {
        let raw = json!({ "title": "TPM", "company": "Acme", "epoch": 1_772_000_000 });
        let job = normalize(&raw, "remoteok", now()).unwrap();
        assert_eq!(job.posted_date, DateTime::from_timestamp(1_772_000_000, 0));
    }

    #[test]
    fn normalize_all_counts_discards() {
        let raw = vec![
            ("a".to_string(), json!({ "title": "TPM", "company": "Acme" })),
            ("a".to_string(), json!({ "title": "TPM" })),
            ("b".to_string(), json!({ "name": "PM", "employer": "Hooli" })),
        ];
        let (jobs, discarded) = normalize_all(raw, now());
        assert_eq!(jobs.len(), 2);
        assert_eq!(discarded, 1);
        assert_eq!(jobs[1].company, "Hooli");
    }
}
