//! PostgreSQL implementation of the job store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use veriframe_core::{
    BatchOptions, BatchVerificationJob, BatchVerificationResult, JobListPage, JobListParams,
    JobStatus, JobStore, JobSummary, StoreError,
};

/// PostgreSQL-backed job store.
///
/// Each job is a single row, so every update replaces the whole record atomically.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

/// Row type for full job reads.
#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    total_images: i32,
    completed_images: i32,
    progress: f64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    options: Json<BatchOptions>,
    image_ids: Json<Vec<String>>,
    results: Json<BTreeMap<String, BatchVerificationResult>>,
    error: Option<String>,
    owner_id: Option<String>,
    retry_of: Option<Uuid>,
}

/// Row type for listings.
#[derive(FromRow)]
struct SummaryRow {
    id: Uuid,
    status: String,
    total_images: i32,
    completed_images: i32,
    progress: f64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    raw.parse().map_err(StoreError::Serialization)
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl TryFrom<JobRow> for BatchVerificationJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            status: parse_status(&row.status)?,
            total_images: count(row.total_images),
            completed_images: count(row.completed_images),
            progress: row.progress,
            start_time: row.start_time,
            end_time: row.end_time,
            results: row.results.0,
            options: row.options.0,
            error: row.error,
            image_ids: row.image_ids.0,
            owner_id: row.owner_id,
            retry_of: row.retry_of,
        })
    }
}

impl TryFrom<SummaryRow> for JobSummary {
    type Error = StoreError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            status: parse_status(&row.status)?,
            progress: row.progress,
            start_time: row.start_time,
            end_time: row.end_time,
            total_images: count(row.total_images),
            completed_images: count(row.completed_images),
        })
    }
}

fn query_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

const JOB_COLUMNS: &str = "id, status, total_images, completed_images, progress, start_time, \
     end_time, options, image_ids, results, error, owner_id, retry_of";

impl PostgresJobStore {
    /// Create a new job store with the given database URL.
    ///
    /// Runs migrations automatically on connection.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("Job store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a job store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO batch_jobs
                (id, status, total_images, completed_images, progress, start_time, end_time,
                 options, image_ids, results, error, owner_id, retry_of)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_images as i32)
        .bind(job.completed_images as i32)
        .bind(job.progress)
        .bind(job.start_time)
        .bind(job.end_time)
        .bind(Json(&job.options))
        .bind(Json(&job.image_ids))
        .bind(Json(&job.results))
        .bind(&job.error)
        .bind(&job.owner_id)
        .bind(job.retry_of)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::debug!(job_id = %job.id, "Stored new job");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(job.id)),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn update(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE batch_jobs SET
                status = $2,
                total_images = $3,
                completed_images = $4,
                progress = $5,
                end_time = $6,
                results = $7,
                error = $8,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_images as i32)
        .bind(job.completed_images as i32)
        .bind(job.progress)
        .bind(job.end_time)
        .bind(Json(&job.results))
        .bind(&job.error)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Missing(job.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BatchVerificationJob>, StoreError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM batch_jobs WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, params: &JobListParams) -> Result<JobListPage, StoreError> {
        let (_, limit) = params.normalized();
        let status = params.status.map(JobStatus::as_str);

        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT id, status, total_images, completed_images, progress, start_time, end_time
            FROM batch_jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR owner_id = $2)
            ORDER BY start_time DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(&params.owner_id)
        .bind(i64::from(limit))
        .bind(params.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM batch_jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR owner_id = $2)
            "#,
        )
        .bind(status)
        .bind(&params.owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let jobs = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<JobSummary>, _>>()?;

        Ok(JobListPage::new(jobs, params, total.0.max(0) as u64))
    }

    async fn list_unfinished(&self) -> Result<Vec<BatchVerificationJob>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs \
             WHERE status IN ('pending', 'processing') ORDER BY start_time"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
