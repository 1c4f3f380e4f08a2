use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::job::{JobLevel, JobPosting};
use crate::storage::{JobSearch, JobStore, StoreStats};

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    source: String,
    title: String,
    company: String,
    location: Option<String>,
    url: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    description: Option<String>,
    job_level: Option<String>,
    remote_friendly: bool,
    keyword_count: i32,
    raw_data: serde_json::Value,
    collected_at: DateTime<Utc>,
}

impl From<JobRow> for JobPosting {
    fn from(row: JobRow) -> Self {
        JobPosting {
            id: row.id,
            source: row.source,
            title: row.title,
            company: row.company,
            location: row.location,
            url: row.url,
            posted_date: row.posted_at,
            description: row.description,
            job_level: row.job_level.and_then(|l| l.parse::<JobLevel>().ok()),
            remote_friendly: row.remote_friendly,
            keyword_count: row.keyword_count.max(0) as u32,
            raw_data: row.raw_data,
            collected_at: row.collected_at,
        }
    }
}

/// Postgres-backed store over the `collected_jobs` table.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn store_many(&self, jobs: &[JobPosting]) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = 0;

        for job in jobs {
            sqlx::query(
                "INSERT INTO collected_jobs (id, source, title, company, location, url, posted_at, description, job_level, remote_friendly, keyword_count, raw_data, collected_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (id) DO UPDATE SET
                    source = EXCLUDED.source,
                    title = EXCLUDED.title,
                    company = EXCLUDED.company,
                    location = EXCLUDED.location,
                    url = EXCLUDED.url,
                    posted_at = EXCLUDED.posted_at,
                    description = EXCLUDED.description,
                    job_level = EXCLUDED.job_level,
                    remote_friendly = EXCLUDED.remote_friendly,
                    keyword_count = EXCLUDED.keyword_count,
                    raw_data = EXCLUDED.raw_data,
                    collected_at = EXCLUDED.collected_at,
                    updated_at = NOW()",
            )
            .bind(&job.id)
            .bind(&job.source)
            .bind(&job.title)
            .bind(&job.company)
            .bind(&job.location)
            .bind(&job.url)
            .bind(job.posted_date)
            .bind(&job.description)
            .bind(job.job_level.map(|l| l.as_str()))
            .bind(job.remote_friendly)
            .bind(job.keyword_count as i32)
            .bind(&job.raw_data)
            .bind(job.collected_at)
            .execute(&mut *tx)
            .await?;
            stored += 1;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn search(&self, search: &JobSearch) -> Result<Vec<JobPosting>, AppError> {
        let terms = search.keyword_terms();
        let terms = (!terms.is_empty()).then_some(terms);
        let location = search
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM collected_jobs
             WHERE ($1::text[] IS NULL OR EXISTS (
                    SELECT 1 FROM unnest($1::text[]) AS k(term)
                    WHERE title ILIKE '%' || k.term || '%'
                       OR company ILIKE '%' || k.term || '%'
                       OR COALESCE(description, '') ILIKE '%' || k.term || '%'))
               AND ($2::text IS NULL OR location ILIKE '%' || $2 || '%')
               AND ($3::text IS NULL OR source = $3)
               AND ($4::text IS NULL OR job_level = $4)
               AND ($5::bool IS NOT TRUE OR remote_friendly)
               AND ($6::int4 IS NULL OR keyword_count >= $6)
               AND ($7::timestamptz IS NULL OR COALESCE(posted_at, collected_at) >= $7)
             ORDER BY collected_at DESC, id
             LIMIT $8 OFFSET $9",
        )
        .bind(terms)
        .bind(location)
        .bind(&search.source)
        .bind(search.job_level.map(|l| l.as_str()))
        .bind(search.remote_only)
        .bind(search.min_keyword_count.map(|m| m as i32))
        .bind(search.cutoff(Utc::now()))
        .bind(search.limit())
        .bind(search.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(JobPosting::from).collect())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        let (total_jobs, remote_jobs): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE remote_friendly) FROM collected_jobs",
        )
        .fetch_one(&self.pool)
        .await?;

        let by_source: Vec<(String, i64)> =
            sqlx::query_as("SELECT source, COUNT(*) FROM collected_jobs GROUP BY source")
                .fetch_all(&self.pool)
                .await?;

        let by_level: Vec<(String, i64)> = sqlx::query_as(
            "SELECT COALESCE(job_level, 'unclassified'), COUNT(*) FROM collected_jobs GROUP BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(StoreStats {
            total_jobs,
            remote_jobs,
            by_source: by_source.into_iter().collect::<BTreeMap<_, _>>(),
            by_level: by_level.into_iter().collect::<BTreeMap<_, _>>(),
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
